//! The ordered list of assets pre-populated on install.

use serde::{Deserialize, Serialize};

use crate::request::normalize_key;

/// Assets the Breccia Mapper deployment pre-caches: offline page, app
/// stylesheet, launcher icons and splash screens.
pub const DEFAULT_ASSETS: &[&str] = &[
    "/offline",
    "/css/django-pwa-app.css",
    "/media/icon-72x72.png",
    "/media/icon-96x96.png",
    "/media/icon-128x128.png",
    "/media/icon-144x144.png",
    "/media/icon-152x152.png",
    "/media/icon-192x192.png",
    "/media/icon-384x384.png",
    "/media/icon-512x512.png",
    "/static/media/splash-640x1136.png",
    "/static/media/splash-750x1334.png",
    "/static/media/splash-1242x2208.png",
    "/static/media/splash-1125x2436.png",
    "/static/media/splash-828x1792.png",
    "/static/media/splash-1242x2688.png",
    "/static/media/splash-1536x2048.png",
    "/static/media/splash-1668x2224.png",
    "/static/media/splash-1668x2388.png",
    "/static/media/splash-2048x2732.png",
];

/// An ordered, duplicate-free list of asset URLs.
///
/// Immutable once built; a generation is populated from exactly one manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct AssetManifest {
    urls: Vec<String>,
}

impl AssetManifest {
    /// Builds a manifest, normalizing keys and dropping repeats while
    /// keeping first-occurrence order.
    #[must_use]
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for url in urls {
            let key = normalize_key(url.as_ref().trim());
            if !out.contains(&key) {
                out.push(key);
            }
        }
        Self { urls: out }
    }

    /// Returns the URLs in manifest order.
    #[must_use]
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Number of distinct assets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// True when nothing is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// True if the given URL is listed.
    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        let key = normalize_key(url);
        self.urls.iter().any(|u| *u == key)
    }
}

impl Default for AssetManifest {
    fn default() -> Self {
        Self::new(DEFAULT_ASSETS)
    }
}

impl From<Vec<String>> for AssetManifest {
    fn from(urls: Vec<String>) -> Self {
        Self::new(urls)
    }
}

impl From<AssetManifest> for Vec<String> {
    fn from(manifest: AssetManifest) -> Self {
        manifest.urls
    }
}
