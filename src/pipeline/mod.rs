// Pure stages between fetch and persistence.

pub mod dedup;
pub mod normalizer;
