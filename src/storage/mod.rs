//! Storage backends for metric persistence
//!
//! This module provides a trait-based abstraction over the places the hub
//! keeps its gauges and counters.
//!
//! ## Design
//!
//! - **Trait-based**: `MetricStore` trait allows swapping implementations
//! - **Async**: All operations are async and safe to share across handlers
//! - **Decorators**: snapshots and retries wrap other stores instead of
//!   being baked into each backend
//!
//! ## Backends
//!
//! - **In-Memory**: No persistence, always available
//! - **File**: In-memory store snapshotted to JSON on disk
//! - **SQLite** (`storage-sqlite` feature): Embedded database with atomic
//!   counter upserts
//!
//! ## Usage
//!
//! ```no_run
//! use metrics_relay::storage::{StorageConfig, build_store};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cancel = CancellationToken::new();
//!     let store = build_store(&StorageConfig::Memory, &cancel).await?;
//!     store.set_counter("PollCount", 1).await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod factory;
pub mod file;
pub mod memory;
pub mod retrying;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, MetricSnapshot, MetricStore};
pub use error::{ErrorClass, StorageError, StorageResult};
pub use factory::{StorageConfig, build_store};
