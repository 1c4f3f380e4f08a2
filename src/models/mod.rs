pub mod collection;
pub mod job;
pub mod query;
pub mod source;
