//! Directory-backed cache storage.
//!
//! Layout under the root:
//!
//! ```text
//! <root>/<generation>/<entry-id>.toml   metadata (url, status, headers, time)
//! <root>/<generation>/<entry-id>.body   raw body
//! <root>/<generation>.part/            staging area for an in-flight put_all
//! ```
//!
//! `entry-id` is the URL-safe base64 of the SHA-256 of the request key.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::CacheStorage;
use crate::error::{Error, Result};
use crate::generation::{GenerationName, STAGING_SUFFIX};
use crate::request::CachedResponse;

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    url: String,
    status: u16,
    fetched_at: DateTime<Utc>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

/// Stores each generation as a directory of entry files.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    /// Creates storage rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of this storage.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generation_dir(&self, name: &GenerationName) -> Result<PathBuf> {
        if !name.is_path_safe() {
            return Err(Error::Storage(format!(
                "unusable generation name {:?}",
                name.as_str()
            )));
        }
        Ok(self.root.join(name.as_str()))
    }

    fn staging_dir(&self, name: &GenerationName) -> Result<PathBuf> {
        let dir = self.generation_dir(name)?;
        let mut staged = dir.into_os_string();
        staged.push(STAGING_SUFFIX);
        Ok(PathBuf::from(staged))
    }

    async fn write_entry(dir: &Path, entry: &CachedResponse) -> Result<()> {
        let id = entry_id(&entry.url);
        let meta = EntryMeta {
            url: entry.url.clone(),
            status: entry.status,
            fetched_at: entry.fetched_at,
            headers: entry.headers.clone(),
        };
        tokio::fs::write(dir.join(format!("{id}.body")), &entry.body).await?;
        tokio::fs::write(dir.join(format!("{id}.toml")), toml::to_string(&meta)?).await?;
        Ok(())
    }

    /// Moves every staged entry into an existing generation, body before
    /// metadata so a reader never sees metadata without its body.
    async fn merge_staged(staged: &Path, target: &Path) -> Result<()> {
        let mut read_dir = tokio::fs::read_dir(staged).await?;
        let mut metas = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "body") {
                tokio::fs::rename(&path, target.join(entry.file_name())).await?;
            } else {
                metas.push((path, entry.file_name()));
            }
        }
        for (path, file_name) in metas {
            tokio::fs::rename(&path, target.join(file_name)).await?;
        }
        tokio::fs::remove_dir_all(staged).await?;
        Ok(())
    }
}

/// File stem for a request key.
fn entry_id(key: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(key.as_bytes()))
}

async fn remove_dir_if_exists(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn keys(&self) -> Result<Vec<GenerationName>> {
        let mut read_dir = match tokio::fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(STAGING_SUFFIX) || name.starts_with('.') {
                continue;
            }
            names.push(GenerationName::from_raw(name));
        }
        names.sort();
        Ok(names)
    }

    async fn has(&self, name: &GenerationName) -> Result<bool> {
        Ok(tokio::fs::metadata(self.generation_dir(name)?)
            .await
            .is_ok_and(|m| m.is_dir()))
    }

    async fn put_all(&self, name: &GenerationName, entries: Vec<CachedResponse>) -> Result<()> {
        let target = self.generation_dir(name)?;
        let staged = self.staging_dir(name)?;

        // Leftover from an interrupted install.
        remove_dir_if_exists(&staged).await?;
        tokio::fs::create_dir_all(&staged).await?;

        for entry in &entries {
            if let Err(e) = Self::write_entry(&staged, entry).await {
                let _ = remove_dir_if_exists(&staged).await;
                return Err(e);
            }
        }

        if self.has(name).await? {
            Self::merge_staged(&staged, &target).await?;
        } else {
            tokio::fs::rename(&staged, &target).await?;
        }
        log::debug!("stored {} entries in {}", entries.len(), target.display());
        Ok(())
    }

    async fn match_in(
        &self,
        name: &GenerationName,
        key: &str,
    ) -> Result<Option<CachedResponse>> {
        let dir = self.generation_dir(name)?;
        let id = entry_id(key);
        let meta_text = match tokio::fs::read_to_string(dir.join(format!("{id}.toml"))).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let meta: EntryMeta = toml::from_str(&meta_text)?;
        if meta.url != key {
            return Err(Error::Storage(format!(
                "entry {id} in {name} holds {} instead of {key}",
                meta.url
            )));
        }
        let body = tokio::fs::read(dir.join(format!("{id}.body"))).await?;
        Ok(Some(CachedResponse {
            url: meta.url,
            status: meta.status,
            headers: meta.headers,
            body: Bytes::from(body),
            fetched_at: meta.fetched_at,
        }))
    }

    async fn entry_keys(&self, name: &GenerationName) -> Result<Vec<String>> {
        let dir = self.generation_dir(name)?;
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                let meta: EntryMeta = toml::from_str(&tokio::fs::read_to_string(&path).await?)?;
                keys.push(meta.url);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, name: &GenerationName) -> Result<bool> {
        Ok(remove_dir_if_exists(&self.generation_dir(name)?).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn gen_name(v: &str) -> GenerationName {
        GenerationName::new("django-pwa-v", v)
    }

    #[tokio::test]
    async fn disk_put_and_match() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path());
        let name = gen_name("1");

        let entry = CachedResponse::new("/static/css/global.css", 200, "body { }")
            .with_header("Content-Type", "text/css");
        storage.put_all(&name, vec![entry.clone()]).await.unwrap();

        let hit = storage
            .match_in(&name, "/static/css/global.css")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.body, entry.body);
        assert_eq!(hit.content_type(), Some("text/css"));
        assert_eq!(hit.status, 200);
        assert!(storage.match_in(&name, "/other").await.unwrap().is_none());
        assert!(!dir.path().join("django-pwa-v1.part").exists());
    }

    #[tokio::test]
    async fn disk_keys_skip_staging_and_files() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path());
        storage.put_all(&gen_name("2"), vec![]).await.unwrap();
        storage.put_all(&gen_name("1"), vec![]).await.unwrap();
        std::fs::create_dir(dir.path().join("django-pwa-v3.part")).unwrap();
        std::fs::write(dir.path().join("worker.toml"), "").unwrap();

        assert_eq!(storage.keys().await.unwrap(), [gen_name("1"), gen_name("2")]);
    }

    #[tokio::test]
    async fn disk_keys_on_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path().join("absent"));
        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn disk_put_twice_merges_without_duplicates() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path());
        let name = gen_name("1");
        let batch = || {
            vec![
                CachedResponse::new("/offline", 200, "offline"),
                CachedResponse::new("/a.css", 200, "a"),
            ]
        };
        storage.put_all(&name, batch()).await.unwrap();
        storage.put_all(&name, batch()).await.unwrap();

        assert_eq!(storage.entry_keys(&name).await.unwrap(), ["/a.css", "/offline"]);
        assert_eq!(std::fs::read_dir(dir.path().join("django-pwa-v1")).unwrap().count(), 4);
    }

    #[tokio::test]
    async fn disk_delete_generation() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path());
        let name = gen_name("1");
        storage.put_all(&name, vec![CachedResponse::new("/x", 200, "x")]).await.unwrap();

        assert!(storage.delete(&name).await.unwrap());
        assert!(!storage.delete(&name).await.unwrap());
        assert!(!storage.has(&name).await.unwrap());
    }

    #[tokio::test]
    async fn disk_rejects_path_like_names() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path());
        let bad = GenerationName::from_raw("../escape");
        assert!(storage.put_all(&bad, vec![]).await.is_err());
    }

    #[test]
    fn entry_ids_are_filename_safe() {
        let id = entry_id("/static/media/splash-640x1136.png?v=1");
        assert!(!id.contains('/'));
        assert!(!id.contains('+'));
        assert_eq!(id.len(), 43);
    }
}
