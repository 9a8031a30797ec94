//! pwa-cache - offline cache controller for the Breccia Mapper web app.
//!
//! Pre-populates a versioned cache generation with a fixed asset manifest,
//! evicts stale generations on activation, and answers requests
//! cache-first with an offline fallback page.
//!
//! # Example
//!
//! ```no_run
//! use pwa_cache::{
//!     AppConfig, DiskStorage, HttpFetcher, OfflineCacheController, Request, WorkerOptions,
//! };
//!
//! # async fn example() -> pwa_cache::Result<()> {
//! let config = AppConfig::load(None)?;
//! let storage = DiskStorage::new(config.paths.cache_dir.join("generations"));
//! let fetcher = HttpFetcher::from_config(&config.origin)?;
//! let controller = OfflineCacheController::new(config.cache, storage, fetcher)?;
//!
//! // Install then activate, one event at a time
//! let (worker, _join) = pwa_cache::worker::spawn(controller, WorkerOptions::default());
//! let (installed, _) = worker.start().await?;
//! println!("cached {} assets", installed.stats.entries_stored);
//!
//! let outcome = worker.fetch(Request::get("/offline")).await?;
//! println!("served from {}", outcome.served_from.as_str());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod controller;
pub mod error;
pub mod fetch;
pub mod generation;
pub mod graph;
pub mod manifest;
pub mod payload;
pub mod request;
pub mod state;
pub mod stats;
pub mod storage;
pub mod worker;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export main types for convenience
pub use config::{AppConfig, CacheConfig};
pub use controller::{
    ActivateReport, CleanupFailure, FetchOutcome, InstallReport, OfflineCacheController,
    WorkerState,
};
pub use error::{Error, Result};
pub use fetch::{Fetcher, HttpFetcher};
pub use generation::{GenerationName, VersionToken};
pub use manifest::AssetManifest;
pub use request::{CachedResponse, Method, Request};
pub use state::WorkerRecord;
pub use stats::{InstallStats, ServedFrom};
pub use storage::{CacheStorage, DiskStorage, MemoryStorage};
pub use worker::{WorkerHandle, WorkerOptions, WorkerStatus};
