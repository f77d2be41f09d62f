//! Lernia notification worker: configuration and stdin/stdout framing for
//! the `lernia-worker` binary.

pub mod config;
pub mod ingest;
