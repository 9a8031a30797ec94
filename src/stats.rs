//! Install and serving statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::request::CachedResponse;

/// Statistics for one install run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStats {
    /// Number of manifest entries stored.
    pub entries_stored: usize,
    /// Total body bytes stored.
    pub total_bytes: u64,
    /// Time from first fetch to commit.
    pub elapsed: Duration,
}

impl InstallStats {
    /// Returns the average fetch throughput in bytes per second.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn average_speed(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.total_bytes as f64 / secs) as u64
        } else {
            0
        }
    }
}

/// Builder for accumulating install statistics while entries are fetched.
pub struct InstallStatsBuilder {
    entries_stored: usize,
    total_bytes: u64,
    start_time: Instant,
}

impl Default for InstallStatsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallStatsBuilder {
    /// Starts timing an install.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries_stored: 0,
            total_bytes: 0,
            start_time: Instant::now(),
        }
    }

    /// Records an entry that will be committed.
    pub fn add_entry(&mut self, entry: &CachedResponse) {
        self.entries_stored += 1;
        self.total_bytes += entry.len();
    }

    /// Builds the final statistics.
    #[must_use]
    pub fn build(self) -> InstallStats {
        InstallStats {
            entries_stored: self.entries_stored,
            total_bytes: self.total_bytes,
            elapsed: self.start_time.elapsed(),
        }
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServedFrom {
    /// Exact cache match.
    Cache,
    /// Live network fetch after a miss.
    Network,
    /// Offline fallback entry after a network failure.
    Offline,
}

impl ServedFrom {
    /// Short label used in response headers and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "hit",
            Self::Network => "network",
            Self::Offline => "offline",
        }
    }
}

/// Running counters of fetch outcomes; shared across tasks.
#[derive(Debug, Default)]
pub struct FetchCounters {
    hits: AtomicU64,
    network: AtomicU64,
    offline: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`FetchCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchSnapshot {
    pub hits: u64,
    pub network: u64,
    pub offline: u64,
    pub failed: u64,
}

impl FetchCounters {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a served response.
    pub fn record(&self, from: ServedFrom) {
        let counter = match from {
            ServedFrom::Cache => &self.hits,
            ServedFrom::Network => &self.network,
            ServedFrom::Offline => &self.offline,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a fetch that surfaced an error.
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads all counters.
    #[must_use]
    pub fn snapshot(&self) -> FetchSnapshot {
        FetchSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            network: self.network.load(Ordering::Relaxed),
            offline: self.offline.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
