//! The offline cache controller: install, activate and fetch handling.

use std::fmt;

use futures::future::join_all;
use futures::{FutureExt, StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::generation::{GenerationName, stale_generations};
use crate::request::{CachedResponse, Request, normalize_key};
use crate::stats::{InstallStats, InstallStatsBuilder, ServedFrom};
use crate::storage::{CacheStorage, DiskStorage};

/// Lifecycle state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Constructed, nothing installed yet.
    #[default]
    Parsed,
    /// Install in progress.
    Installing,
    /// Current generation fully populated, waiting to activate.
    Installed,
    /// Activation in progress.
    Activating,
    /// Stale generations purged; current generation in control.
    Activated,
    /// Install failed; this version never becomes current.
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        };
        f.write_str(label)
    }
}

/// Outcome of a successful install.
#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Generation that was populated.
    pub generation: GenerationName,
    /// Fetch and store statistics.
    pub stats: InstallStats,
    /// The new version asked to take control without waiting for a reload.
    pub skip_waiting: bool,
}

/// A stale generation that could not be deleted during activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    /// Generation that lingers.
    pub generation: GenerationName,
    /// Why deletion failed.
    pub reason: String,
}

/// Outcome of an activation. Cleanup failures never fail activation.
#[derive(Debug, Clone, Default)]
pub struct ActivateReport {
    /// Stale generations removed.
    pub deleted: Vec<GenerationName>,
    /// Stale generations that could not be removed.
    pub failed: Vec<CleanupFailure>,
}

impl ActivateReport {
    /// True if every stale generation was removed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A response handed back to the requesting page.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// The response body and metadata.
    pub response: CachedResponse,
    /// Which path produced it.
    pub served_from: ServedFrom,
}

/// Owns one versioned cache generation and serves requests cache-first.
pub struct OfflineCacheController<S: CacheStorage = DiskStorage, F: Fetcher = HttpFetcher> {
    config: CacheConfig,
    current: GenerationName,
    storage: S,
    fetcher: F,
    state: WorkerState,
    skip_waiting: bool,
    controls_clients: bool,
}

impl<S: CacheStorage, F: Fetcher> OfflineCacheController<S, F> {
    /// Creates a controller, resolving the version token exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(config: CacheConfig, storage: S, fetcher: F) -> Result<Self> {
        config.validate()?;
        let version = config.version.resolve();
        let current = GenerationName::new(&config.prefix, &version);
        log::debug!("controller created for generation {current}");
        Ok(Self {
            config,
            current,
            storage,
            fetcher,
            state: WorkerState::Parsed,
            skip_waiting: false,
            controls_clients: false,
        })
    }

    /// Name of the generation this controller populates and serves from.
    #[must_use]
    pub const fn current(&self) -> &GenerationName {
        &self.current
    }

    /// Returns the controller configuration.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> WorkerState {
        self.state
    }

    /// True once activation ran after an install that asked to skip waiting.
    #[must_use]
    pub const fn controls_clients(&self) -> bool {
        self.controls_clients
    }

    /// Returns the underlying storage.
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Picks up a generation installed by an earlier process: if the
    /// current generation already exists in storage, the controller moves
    /// from `Parsed` to `Installed`.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be queried.
    pub async fn restore(&mut self) -> Result<WorkerState> {
        if self.state == WorkerState::Parsed && self.storage.has(&self.current).await? {
            log::info!("found installed generation {}", self.current);
            self.state = WorkerState::Installed;
            self.skip_waiting = true;
        }
        Ok(self.state)
    }

    /// Populates the current generation with every manifest URL.
    ///
    /// All fetches must succeed with a 2xx status before anything is
    /// stored; otherwise the install fails and no entry is committed.
    /// Old generations are left untouched until activation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InstallFailed`] naming the first URL that failed,
    /// or a storage error if the commit fails.
    pub async fn install(&mut self) -> Result<InstallReport> {
        log::info!(
            "installing {} ({} assets)",
            self.current,
            self.config.manifest.len()
        );
        self.state = WorkerState::Installing;
        self.skip_waiting = true;

        match self.populate().await {
            Ok(stats) => {
                self.state = WorkerState::Installed;
                log::info!(
                    "installed {}: {} entries, {} bytes",
                    self.current,
                    stats.entries_stored,
                    stats.total_bytes
                );
                Ok(InstallReport {
                    generation: self.current.clone(),
                    stats,
                    skip_waiting: self.skip_waiting,
                })
            }
            Err(e) => {
                self.state = WorkerState::Redundant;
                log::error!("install of {} failed: {e}", self.current);
                Err(e)
            }
        }
    }

    async fn populate(&self) -> Result<InstallStats> {
        let mut builder = InstallStatsBuilder::new();

        let fetches: Vec<_> = self
            .config
            .manifest
            .urls()
            .iter()
            .map(|url| self.fetch_for_install(url.clone()).boxed())
            .collect();
        let entries: Vec<CachedResponse> = stream::iter(fetches)
            .buffer_unordered(self.config.concurrent_fetches)
            .try_collect()
            .await?;

        for entry in &entries {
            builder.add_entry(entry);
        }
        self.storage.put_all(&self.current, entries).await?;
        Ok(builder.build())
    }

    async fn fetch_for_install(&self, url: String) -> Result<CachedResponse> {
        let request = Request::get(url.as_str());
        let mut response = self
            .fetcher
            .fetch(&request)
            .await
            .map_err(|e| Error::InstallFailed {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        if !response.is_success() {
            return Err(Error::InstallFailed {
                url: url.clone(),
                reason: format!("HTTP status {}", response.status),
            });
        }
        response.url = request.url().to_string();
        log::debug!("fetched {url} ({} bytes)", response.len());
        Ok(response)
    }

    /// Deletes every generation sharing this controller's prefix except the
    /// current one. Deletions run concurrently; activation completes once
    /// all have settled, whether or not they succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if nothing has been installed, or a
    /// storage error if the generation list cannot be read.
    pub async fn activate(&mut self) -> Result<ActivateReport> {
        if !matches!(
            self.state,
            WorkerState::Installed | WorkerState::Activated
        ) {
            return Err(Error::InvalidState(format!(
                "cannot activate {} while {}",
                self.current, self.state
            )));
        }
        self.state = WorkerState::Activating;
        log::info!("activating {}", self.current);

        let names = match self.storage.keys().await {
            Ok(names) => names,
            Err(e) => {
                self.state = WorkerState::Installed;
                return Err(e);
            }
        };
        let stale = stale_generations(&names, &self.config.prefix, &self.current);

        let storage = &self.storage;
        let deletions: Vec<_> = stale
            .into_iter()
            .map(|name| async move { (name, storage.delete(name).await) }.boxed())
            .collect();
        let results = join_all(deletions).await;

        let mut report = ActivateReport::default();
        for (name, result) in results {
            match result {
                Ok(_) => {
                    log::info!("evicted stale generation {name}");
                    report.deleted.push(name.clone());
                }
                Err(e) => {
                    log::warn!("could not evict {name}: {e}");
                    report.failed.push(CleanupFailure {
                        generation: name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.state = WorkerState::Activated;
        self.controls_clients = self.skip_waiting;
        Ok(report)
    }

    /// Serves a request cache-first.
    ///
    /// An exact cache match is returned without touching the network. A
    /// miss is fetched live and returned without being stored. If the
    /// lookup or the network fails, the offline fallback entry is served.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Offline`] when the fallback entry is also absent.
    pub async fn fetch(&self, request: &Request) -> Result<FetchOutcome> {
        match self.cache_then_network(request).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                log::debug!("{} {} failed: {e}", request.method(), request.url());
                self.offline_fallback(request).await
            }
        }
    }

    async fn cache_then_network(&self, request: &Request) -> Result<FetchOutcome> {
        if let Some(key) = request.cache_key()
            && let Some(response) = self.storage.match_any(&self.current, key).await?
        {
            log::debug!("cache hit {key}");
            return Ok(FetchOutcome {
                response,
                served_from: ServedFrom::Cache,
            });
        }

        let response = self.fetcher.fetch(request).await?;
        log::debug!("network {} -> {}", request.url(), response.status);
        Ok(FetchOutcome {
            response,
            served_from: ServedFrom::Network,
        })
    }

    async fn offline_fallback(&self, request: &Request) -> Result<FetchOutcome> {
        let key = normalize_key(&self.config.offline_url);
        match self.storage.match_any(&self.current, &key).await {
            Ok(Some(response)) => {
                log::info!("serving offline page for {}", request.url());
                Ok(FetchOutcome {
                    response,
                    served_from: ServedFrom::Offline,
                })
            }
            Ok(None) => Err(Error::Offline {
                url: request.url().to_string(),
            }),
            Err(e) => {
                log::warn!("offline fallback lookup failed: {e}");
                Err(Error::Offline {
                    url: request.url().to_string(),
                })
            }
        }
    }
}
