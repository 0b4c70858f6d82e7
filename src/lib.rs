//! tabletrack - identity tracking for physical tokens on a touch table
//!
//! Tokens ("coasters") are recognised by the number of simultaneous contacts
//! their base produces. Every frame runs a deterministic pipeline:
//! contact snapshot → spatial clustering → identity tracking with a ghost
//! grace window → pose smoothing → render list.
//!
//! ## Modules
//!
//! - **Tracking core**: `contacts`, `cluster`, `catalog`, `tracker`, `projector`
//! - **Frame driver**: `pipeline` (one processor per session) and `scheduler`
//!   (fixed-cadence frame thread)
//! - **Content**: `activation` (single external effect) and `content`
//!   (per-type panel copy fetched off the frame thread)
//! - **Replay**: `schema` (surface.contact_event.v1 recordings)

pub mod activation;
pub mod catalog;
pub mod cluster;
pub mod config;
pub mod contacts;
pub mod content;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod projector;
pub mod scheduler;
pub mod schema;
pub mod tracker;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use activation::{ActivationBridge, ActiveEffect, ContentKind};
pub use catalog::{Catalog, TokenType};
pub use config::TrackerConfig;
pub use contacts::{ContactId, ContactSurface, RawContact};
pub use error::TrackingError;
pub use pipeline::SurfaceProcessor;
pub use projector::{FrameSnapshot, RenderItem};
pub use scheduler::{EngineCommand, FrameScheduler};
pub use tracker::{InstanceId, ObjectStatus, TrackedObject};

// Schema exports
pub use schema::{ContactEvent, ContactRecord, ContactRecordAdapter, SCHEMA_VERSION};

/// Library version, reported by the CLI and the C ABI
pub const TABLETRACK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "tabletrack";
