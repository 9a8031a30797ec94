//! Error types for the pwa-cache library.

use thiserror::Error;

/// Errors that can occur during cache lifecycle operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A manifest URL could not be fetched and stored; nothing was committed.
    #[error("install failed for {url}: {reason}")]
    InstallFailed {
        /// Manifest URL that failed.
        url: String,
        /// Why the fetch was rejected.
        reason: String,
    },

    /// A request missed the cache, the network failed, and no offline
    /// fallback entry exists.
    #[error("offline and no fallback cached for {url}")]
    Offline {
        /// Request URL that could not be served.
        url: String,
    },

    /// Cache storage backend error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A URL or path could not be resolved against the origin.
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The offending URL or path.
        url: String,
        /// Parse failure.
        reason: String,
    },

    /// A lifecycle event arrived in a state that cannot handle it.
    #[error("invalid lifecycle state: {0}")]
    InvalidState(String),

    /// Configuration is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error during storage or state operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration or state file could not be parsed.
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// State could not be serialized.
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Page payload could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if this error came from the network layer.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

/// A specialized `Result` type for pwa-cache operations.
pub type Result<T> = std::result::Result<T, Error>;
