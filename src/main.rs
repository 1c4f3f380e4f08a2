mod auth;
mod collectors;
mod config;
mod db;
mod enrich;
mod error;
mod health;
mod models;
mod pipeline;
mod routes;
mod storage;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::auth::ApiToken;
use crate::collectors::SourceHandle;
use crate::collectors::hiringcafe::HiringCafe;
use crate::collectors::json_feed::JsonFeed;
use crate::collectors::registry::SourceRegistry;
use crate::collectors::runner::CollectionService;
use crate::config::{Command, Config};
use crate::enrich::KeywordEnricher;
use crate::storage::JobStore;
use crate::storage::fingerprint::{FingerprintCache, MemoryFingerprintCache, PgFingerprintCache};
use crate::storage::memory::MemoryJobStore;
use crate::storage::postgres::PgJobStore;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("jobcollector=info,tower_http=info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn build_registry(config: &Config) -> anyhow::Result<SourceRegistry> {
    let registry = SourceRegistry::new();

    let filters = match &config.hiringcafe_filters {
        Some(raw) => serde_json::from_str(raw).context("HIRINGCAFE_FILTERS is not valid JSON")?,
        None => serde_json::Value::Null,
    };
    registry
        .register(SourceHandle::scraper(HiringCafe::new(filters)), true)
        .await;

    for entry in &config.feeds {
        let feed = JsonFeed::parse(entry)?;
        tracing::info!("Configured JSON feed at {}", feed.url());
        registry.register(SourceHandle::pull(feed), true).await;
    }

    for name in &config.disabled_sources {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        if let Err(e) = registry.disable(name).await {
            tracing::warn!("Ignoring DISABLED_SOURCES entry: {e}");
        }
    }

    Ok(registry)
}

async fn build_service(config: &Config) -> anyhow::Result<CollectionService> {
    let (store, fingerprints): (Arc<dyn JobStore>, Arc<dyn FingerprintCache>) =
        match &config.database_url {
            Some(url) => {
                tracing::info!("Connecting to database...");
                let pool = db::create_pool(url).await?;
                if config.run_migrations {
                    tracing::info!("Running database migrations...");
                    db::run_migrations(&pool).await?;
                    tracing::info!("Migrations complete");
                }
                (
                    Arc::new(PgJobStore::new(pool.clone())),
                    Arc::new(PgFingerprintCache::new(pool)),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory storage");
                (
                    Arc::new(MemoryJobStore::new()),
                    Arc::new(MemoryFingerprintCache::new()),
                )
            }
        };

    let registry = build_registry(config).await?;
    Ok(CollectionService::new(
        Arc::new(registry),
        store,
        Arc::new(KeywordEnricher::default()),
        Some(fingerprints),
        config.collector_settings(),
    ))
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_json);

    let service = Arc::new(build_service(&config).await?);

    match config.resolved_command() {
        Command::Serve { listen_addr } => {
            let api_token = ApiToken::new(config.api_token.as_deref());
            if !api_token.is_enabled() {
                tracing::warn!("API_TOKEN not set, the API is unauthenticated");
            }
            let app = routes::api::router(service, api_token)
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive());

            let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
            tracing::info!("Listening on {listen_addr}");
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                    tracing::info!("Shutdown signal received, exiting gracefully");
                })
                .await?;
        }
        Command::Collect(args) => print_json(&service.collect(args.into_query()).await?)?,
        Command::Daily(args) => {
            print_json(&service.run_daily_aggregation(args.into_query()).await?)?
        }
        Command::Sources => print_json(&service.list_source_statuses().await)?,
        Command::Health => print_json(&service.health_check().await)?,
    }

    Ok(())
}
