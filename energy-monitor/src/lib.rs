pub mod pipeline;
pub mod config;
pub mod sources;
pub mod sinks;
pub mod transform;
pub mod format;
pub mod ingest;
pub mod dashboard;
pub mod observability;
pub mod metrics_server;

pub use pipeline::{Pipeline, Envelope};
