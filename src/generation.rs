//! Cache generation naming and version tokens.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Name prefix shared by every generation this controller owns.
pub const DEFAULT_PREFIX: &str = "django-pwa-v";

/// Suffix of the directory a generation is staged in before it commits.
pub const STAGING_SUFFIX: &str = ".part";

/// How the version part of a generation name is chosen.
///
/// `LoadTime` reproduces the behavior of stamping the cache with the
/// wall-clock time whenever the worker starts. Every restart then yields a
/// new generation, so the whole manifest is refetched and the previous
/// generation evicted even when nothing was redeployed. Prefer `Fixed`
/// with a token taken from build metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "strategy", content = "token")]
pub enum VersionToken {
    /// An explicit token that only changes between deployments.
    Fixed(String),
    /// Milliseconds since the epoch at the moment of resolution.
    LoadTime,
}

impl VersionToken {
    /// Resolves the token to the concrete string used in a generation name.
    ///
    /// Called once per controller construction; never per request.
    #[must_use]
    pub fn resolve(&self) -> String {
        match self {
            Self::Fixed(token) => token.clone(),
            Self::LoadTime => {
                log::warn!(
                    "cache version derived from load time; every restart creates a new generation"
                );
                Utc::now().timestamp_millis().to_string()
            }
        }
    }
}

impl Default for VersionToken {
    fn default() -> Self {
        Self::Fixed(env!("CARGO_PKG_VERSION").to_string())
    }
}

/// The full name of one cache generation: prefix followed by version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationName(String);

impl GenerationName {
    /// Joins a prefix and a resolved version token.
    #[must_use]
    pub fn new(prefix: &str, version: &str) -> Self {
        Self(format!("{prefix}{version}"))
    }

    /// Wraps an existing storage name.
    #[must_use]
    pub fn from_raw(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as stored.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if this generation belongs to the controller with `prefix`.
    #[must_use]
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }

    /// True if the name can be used as a single directory name: not empty,
    /// no path separators, no leading dot and no staging suffix.
    #[must_use]
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && !self.0.starts_with('.')
            && !self.0.ends_with(STAGING_SUFFIX)
            && !self.0.contains(['/', '\\'])
    }

    /// The version part, if this name carries `prefix`.
    #[must_use]
    pub fn version<'a>(&'a self, prefix: &str) -> Option<&'a str> {
        self.0.strip_prefix(prefix)
    }
}

impl fmt::Display for GenerationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for GenerationName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Names among `names` that carry `prefix` but are not `current`: the set
/// activation evicts.
#[must_use]
pub fn stale_generations<'a>(
    names: &'a [GenerationName],
    prefix: &str,
    current: &GenerationName,
) -> Vec<&'a GenerationName> {
    names
        .iter()
        .filter(|name| name.has_prefix(prefix))
        .filter(|name| *name != current)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_joins_prefix_and_version() {
        let name = GenerationName::new(DEFAULT_PREFIX, "v1");
        assert_eq!(name.as_str(), "django-pwa-vv1");
        assert_eq!(name.version(DEFAULT_PREFIX), Some("v1"));
        assert!(name.has_prefix(DEFAULT_PREFIX));
    }

    #[test]
    fn path_safety() {
        assert!(GenerationName::new(DEFAULT_PREFIX, "1.2.0").is_path_safe());
        for bad in ["", ".hidden", "django-pwa-v1.part", "a/b", "a\\b", "../up"] {
            assert!(!GenerationName::from_raw(bad).is_path_safe(), "{bad}");
        }
    }

    #[test]
    fn fixed_token_resolves_verbatim() {
        assert_eq!(VersionToken::Fixed("42".into()).resolve(), "42");
    }

    #[test]
    fn load_time_token_is_numeric() {
        let token = VersionToken::LoadTime.resolve();
        assert!(token.parse::<i64>().is_ok());
    }

    #[test]
    fn stale_excludes_current_and_foreign_names() {
        let current = GenerationName::new(DEFAULT_PREFIX, "2");
        let names = vec![
            GenerationName::new(DEFAULT_PREFIX, "1"),
            current.clone(),
            GenerationName::from_raw("other-app-v1"),
            GenerationName::new(DEFAULT_PREFIX, "0"),
        ];
        let stale: Vec<_> = stale_generations(&names, DEFAULT_PREFIX, &current)
            .into_iter()
            .map(GenerationName::as_str)
            .collect();
        assert_eq!(stale, ["django-pwa-v1", "django-pwa-v0"]);
    }

    #[test]
    fn version_token_toml_shapes() {
        #[derive(Deserialize)]
        struct Wrapper {
            version: VersionToken,
        }
        let fixed: Wrapper =
            toml::from_str("version = { strategy = \"fixed\", token = \"abc\" }").unwrap();
        assert_eq!(fixed.version, VersionToken::Fixed("abc".into()));
        let load: Wrapper = toml::from_str("version = { strategy = \"load-time\" }").unwrap();
        assert_eq!(load.version, VersionToken::LoadTime);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn distinct_versions_give_distinct_names(a in "[0-9]{1,12}", b in "[0-9]{1,12}") {
                prop_assume!(a != b);
                prop_assert_ne!(
                    GenerationName::new(DEFAULT_PREFIX, &a),
                    GenerationName::new(DEFAULT_PREFIX, &b)
                );
            }
        }
    }
}
