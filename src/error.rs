//! Error types for tabletrack

use thiserror::Error;

/// Errors surfaced by the fallible parts of the engine.
///
/// The per-frame tracking path never fails; these cover configuration,
/// catalogs, replay input and the outer bindings.
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid token catalog: {0}")]
    InvalidCatalog(String),

    #[error("Unknown instance: {0}")]
    UnknownInstance(String),

    #[error("Content fetch failed: {0}")]
    FetchFailed(String),

    #[error("Frame scheduler has stopped")]
    SchedulerStopped,
}
