// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod ingest;
pub mod model;
pub mod predict;
pub mod scheduler;
pub mod store;
pub mod universe;

// ---- Re-exports for stable public API ----
pub use crate::app::{IndexPulse, ServiceStatus};
pub use crate::config::AppConfig;
pub use crate::error::FetchError;
pub use crate::scheduler::{AdapterSet, JobHealth, Pipeline};
pub use crate::store::{EventFilter, SnapshotStore};
