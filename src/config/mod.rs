//! Configuration types for the cache controller and its front ends.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::generation::{DEFAULT_PREFIX, GenerationName, VersionToken};
use crate::manifest::AssetManifest;

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "pwa-cache.toml";

/// Configuration injected into the controller at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Prefix every generation name starts with.
    pub prefix: String,
    /// How the generation version is chosen.
    pub version: VersionToken,
    /// Key of the page served when both cache and network fail.
    pub offline_url: String,
    /// Assets populated on install.
    pub manifest: AssetManifest,
    /// Number of manifest fetches in flight during install.
    pub concurrent_fetches: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            version: VersionToken::default(),
            offline_url: "/offline".to_string(),
            manifest: AssetManifest::default(),
            concurrent_fetches: 4,
        }
    }
}

impl CacheConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the generation name prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the version token strategy.
    #[must_use]
    pub fn with_version(mut self, version: VersionToken) -> Self {
        self.version = version;
        self
    }

    /// Sets the offline fallback key.
    #[must_use]
    pub fn with_offline_url(mut self, url: impl Into<String>) -> Self {
        self.offline_url = url.into();
        self
    }

    /// Sets the install manifest.
    #[must_use]
    pub fn with_manifest(mut self, manifest: AssetManifest) -> Self {
        self.manifest = manifest;
        self
    }

    /// Sets the number of concurrent install fetches.
    #[must_use]
    pub const fn with_concurrent_fetches(mut self, concurrent: usize) -> Self {
        self.concurrent_fetches = concurrent;
        self
    }

    /// Checks the values the controller relies on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty prefix, a zero concurrency, or
    /// a generation name that cannot be stored as a directory.
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(Error::Config("cache prefix must not be empty".into()));
        }
        if self.concurrent_fetches == 0 {
            return Err(Error::Config("concurrent_fetches must be at least 1".into()));
        }
        if matches!(&self.version, VersionToken::Fixed(t) if t.is_empty()) {
            return Err(Error::Config("fixed version token must not be empty".into()));
        }
        // Load-time tokens are digits; a placeholder stands in for them.
        let version = match &self.version {
            VersionToken::Fixed(token) => token.as_str(),
            VersionToken::LoadTime => "0",
        };
        let name = GenerationName::new(&self.prefix, version);
        if !name.is_path_safe() {
            return Err(Error::Config(format!(
                "generation name {name} is not usable as a directory name"
            )));
        }
        Ok(())
    }
}

/// Where assets are fetched from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Base URL of the Django site serving the assets.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/".to_string(),
            timeout_secs: 30,
        }
    }
}

impl OriginConfig {
    /// Request timeout as a duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Path configuration for cache storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Directory holding cache generations and the worker record.
    pub cache_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
        }
    }
}

/// Uses `STATE_DIRECTORY` (set by systemd when `StateDirectory=` is
/// configured), falling back to `$XDG_DATA_HOME/pwa-cache`.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    std::env::var("STATE_DIRECTORY").map_or_else(
        |_| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("pwa-cache")
        },
        PathBuf::from,
    )
}

/// HTTP front configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9724,
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Controller configuration.
    pub cache: CacheConfig,
    /// Asset origin.
    pub origin: OriginConfig,
    /// Storage paths.
    pub paths: PathConfig,
    /// HTTP front.
    pub server: ServerConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this schema or
    /// fails validation.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.cache.validate()?;
        Ok(config)
    }

    /// Loads configuration from `path`, or from [`DEFAULT_CONFIG_FILE`] if
    /// `path` is `None`. A missing default file yields the defaults; a
    /// missing explicit file is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = path.map_or_else(
            || (PathBuf::from(DEFAULT_CONFIG_FILE), false),
            |p| (p.to_path_buf(), true),
        );
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                log::debug!("loading configuration from {}", path.display());
                Self::from_toml(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                log::debug!("no {DEFAULT_CONFIG_FILE} found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cache_config() {
        let config = CacheConfig::default();
        assert_eq!(config.prefix, "django-pwa-v");
        assert_eq!(config.offline_url, "/offline");
        assert_eq!(config.concurrent_fetches, 4);
        assert!(config.manifest.contains("/offline"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = CacheConfig::new()
            .with_prefix("test-v")
            .with_version(VersionToken::Fixed("7".into()))
            .with_offline_url("/down")
            .with_manifest(AssetManifest::new(["/down"]))
            .with_concurrent_fetches(2);

        assert_eq!(config.prefix, "test-v");
        assert_eq!(config.version, VersionToken::Fixed("7".into()));
        assert_eq!(config.offline_url, "/down");
        assert_eq!(config.manifest.len(), 1);
        assert_eq!(config.concurrent_fetches, 2);
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(CacheConfig::new().with_prefix("").validate().is_err());
        assert!(CacheConfig::new().with_concurrent_fetches(0).validate().is_err());
        assert!(
            CacheConfig::new()
                .with_version(VersionToken::Fixed(String::new()))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn validate_rejects_unstorable_generation_names() {
        let fixed = |t: &str| CacheConfig::new().with_version(VersionToken::Fixed(t.into()));
        for token in ["1/2", "..\\x", "1.part"] {
            assert!(matches!(fixed(token).validate(), Err(Error::Config(_))), "{token}");
        }
        let hidden = CacheConfig::new().with_prefix(".cache-v");
        assert!(matches!(hidden.validate(), Err(Error::Config(_))));
        let load_time = CacheConfig::new()
            .with_prefix("app/v")
            .with_version(VersionToken::LoadTime);
        assert!(load_time.validate().is_err());
        assert!(fixed("1.2.0").validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [cache]
            version = { strategy = "fixed", token = "v1" }
            manifest = ["/offline", "/static/css/global.css"]

            [server]
            port = 8080
            "#,
        )
        .unwrap();
        assert_eq!(config.cache.version, VersionToken::Fixed("v1".into()));
        assert_eq!(config.cache.manifest.len(), 2);
        assert_eq!(config.cache.prefix, "django-pwa-v");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.origin.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn app_config_serializes_to_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let loaded = AppConfig::from_toml(&toml_str).unwrap();
        assert_eq!(loaded.cache.manifest, config.cache.manifest);
        assert_eq!(loaded.server.port, config.server.port);
    }

    #[test]
    fn load_missing_explicit_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(AppConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn load_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pwa-cache.toml");
        std::fs::write(&path, "[origin]\nbase_url = \"https://mapper.example/\"\n").unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.origin.base_url, "https://mapper.example/");
    }

    #[test]
    fn default_cache_dir_is_named_after_crate() {
        if std::env::var("STATE_DIRECTORY").is_err() {
            assert!(default_cache_dir().to_string_lossy().contains("pwa-cache"));
        }
    }
}
