use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::collectors::runner::CollectorSettings;
use crate::models::query::{DEFAULT_LOOKBACK_DAYS, DEFAULT_MAX_JOBS_PER_SOURCE, Query};

#[derive(Parser, Debug, Clone)]
#[command(name = "jobcollector", about = "Multi-source job posting collector")]
pub struct Config {
    /// Database connection URL. Without it jobs and fingerprints live in memory.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Run database migrations on startup
    #[arg(long, env = "RUN_MIGRATIONS", default_value_t = true, action = ArgAction::Set)]
    pub run_migrations: bool,

    /// Number of sources fetched in parallel
    #[arg(long, env = "MAX_CONCURRENT_SOURCES", default_value_t = 4, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_concurrent_sources: u32,

    /// Deadline for the fetch phase of one collection, in seconds
    #[arg(long, env = "COLLECTION_TIMEOUT_SECS", default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    pub collection_timeout_secs: u64,

    /// Number of postings enriched in parallel
    #[arg(long, env = "ENRICH_CONCURRENCY", default_value_t = 8, value_parser = clap::value_parser!(u32).range(1..))]
    pub enrich_concurrency: u32,

    /// Sources registered but disabled at startup (comma separated)
    #[arg(long, env = "DISABLED_SOURCES", value_delimiter = ',')]
    pub disabled_sources: Vec<String>,

    /// JSON feeds as name=url or name=url#records.path (comma separated)
    #[arg(long = "feed", env = "JSON_FEEDS", value_delimiter = ',')]
    pub feeds: Vec<String>,

    /// JSON object of HiringCafe search-state overrides
    #[arg(long, env = "HIRINGCAFE_FILTERS")]
    pub hiringcafe_filters: Option<String>,

    /// Bearer token required by the HTTP API
    #[arg(long, env = "API_TOKEN")]
    pub api_token: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value_t = false, action = ArgAction::Set)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the web server (default when no subcommand given)
    Serve {
        /// Listen address
        #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
        listen_addr: String,
    },
    /// Run one collection and print the result as JSON
    Collect(QueryArgs),
    /// Run the daily aggregation over all enabled sources
    Daily(QueryArgs),
    /// Print source statuses
    Sources,
    /// Print the service health report
    Health,
}

#[derive(clap::Args, Debug, Clone)]
pub struct QueryArgs {
    /// Search keywords (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub keywords: Vec<String>,

    #[arg(long)]
    pub location: Option<String>,

    /// Maximum records taken from each source
    #[arg(long, default_value_t = DEFAULT_MAX_JOBS_PER_SOURCE)]
    pub max_jobs: u32,

    /// Restrict to these sources (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub sources: Vec<String>,

    /// Exclude remote postings where the source supports it
    #[arg(long)]
    pub no_remote: bool,

    #[arg(long, default_value_t = DEFAULT_LOOKBACK_DAYS)]
    pub lookback_days: u32,

    /// Skip persistence (ignored by `daily`)
    #[arg(long)]
    pub dry_run: bool,
}

impl QueryArgs {
    pub fn into_query(self) -> Query {
        Query {
            keywords: self.keywords,
            location: self.location,
            max_jobs_per_source: self.max_jobs,
            sources: (!self.sources.is_empty()).then_some(self.sources),
            include_remote: !self.no_remote,
            lookback_days: self.lookback_days,
            persist: !self.dry_run,
        }
    }
}

impl Config {
    /// Resolve the command, defaulting to Serve if none specified.
    pub fn resolved_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve {
            listen_addr: std::env::var("LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        })
    }

    pub fn collector_settings(&self) -> CollectorSettings {
        CollectorSettings {
            max_concurrent_sources: self.max_concurrent_sources as usize,
            collection_timeout: Duration::from_secs(self.collection_timeout_secs),
            enrich_concurrency: self.enrich_concurrency as usize,
            ..CollectorSettings::default()
        }
    }
}
