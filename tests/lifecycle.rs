//! End-to-end lifecycle over on-disk storage and a mock origin.

use std::path::Path;
use std::time::Duration;

use pwa_cache::fetch::build_http_client;
use pwa_cache::{
    AssetManifest, CacheConfig, CacheStorage, CachedResponse, DiskStorage, Error, GenerationName,
    HttpFetcher, OfflineCacheController, Request, ServedFrom, VersionToken, WorkerOptions,
    WorkerState,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ASSETS: &[&str] = &["/offline", "/css/django-pwa-app.css", "/images/icons/icon-72x72.png"];
const DEAD_ORIGIN: &str = "http://127.0.0.1:9/";

async fn origin() -> MockServer {
    let server = MockServer::start().await;
    for asset in ASSETS {
        Mock::given(method("GET"))
            .and(path(*asset))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("body of {asset}")))
            .mount(&server)
            .await;
    }
    server
}

fn config(version: &str, extra: &[&str]) -> CacheConfig {
    CacheConfig::new()
        .with_version(VersionToken::Fixed(version.into()))
        .with_manifest(AssetManifest::new(ASSETS.iter().chain(extra)))
}

fn controller(
    root: &Path,
    base_url: &str,
    config: CacheConfig,
) -> OfflineCacheController<DiskStorage, HttpFetcher> {
    let client = build_http_client(Duration::from_secs(5)).unwrap();
    let fetcher = HttpFetcher::new(client, base_url).unwrap();
    OfflineCacheController::new(config, DiskStorage::new(root), fetcher).unwrap()
}

async fn generations(root: &Path) -> Vec<String> {
    DiskStorage::new(root)
        .keys()
        .await
        .unwrap()
        .into_iter()
        .map(|name| name.as_str().to_string())
        .collect()
}

#[tokio::test]
async fn manifest_is_servable_without_network_after_install() {
    let dir = TempDir::new().unwrap();
    let server = origin().await;

    let mut online = controller(dir.path(), &server.uri(), config("1", &[]));
    online.install().await.unwrap();
    online.activate().await.unwrap();

    let mut offline = controller(dir.path(), DEAD_ORIGIN, config("1", &[]));
    assert_eq!(offline.restore().await.unwrap(), WorkerState::Installed);
    offline.activate().await.unwrap();

    for asset in ASSETS {
        let outcome = offline.fetch(&Request::get(*asset)).await.unwrap();
        assert_eq!(outcome.served_from, ServedFrom::Cache);
        assert_eq!(outcome.response.body, format!("body of {asset}"));
    }

    let outcome = offline.fetch(&Request::get("/people/4")).await.unwrap();
    assert_eq!(outcome.served_from, ServedFrom::Offline);
    assert_eq!(outcome.response.body, "body of /offline");
}

#[tokio::test]
async fn activating_new_version_evicts_old_and_keeps_foreign_caches() {
    let dir = TempDir::new().unwrap();
    let server = origin().await;

    let foreign = GenerationName::from_raw("other-app-cache");
    DiskStorage::new(dir.path())
        .put_all(&foreign, vec![CachedResponse::new("/x", 200, "x")])
        .await
        .unwrap();

    let mut v1 = controller(dir.path(), &server.uri(), config("1", &[]));
    v1.install().await.unwrap();
    v1.activate().await.unwrap();

    let mut v2 = controller(dir.path(), &server.uri(), config("2", &[]));
    v2.install().await.unwrap();
    assert_eq!(
        generations(dir.path()).await,
        ["django-pwa-v1", "django-pwa-v2", "other-app-cache"]
    );

    let report = v2.activate().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.deleted, [GenerationName::from_raw("django-pwa-v1")]);
    assert_eq!(
        generations(dir.path()).await,
        ["django-pwa-v2", "other-app-cache"]
    );
}

#[tokio::test]
async fn failed_install_commits_nothing_and_old_generation_keeps_serving() {
    let dir = TempDir::new().unwrap();
    let server = origin().await;

    let mut v1 = controller(dir.path(), &server.uri(), config("1", &[]));
    v1.install().await.unwrap();
    v1.activate().await.unwrap();

    let mut v2 = controller(dir.path(), &server.uri(), config("2", &["/missing.css"]));
    let err = v2.install().await.unwrap_err();
    assert!(matches!(err, Error::InstallFailed { ref url, .. } if url == "/missing.css"));
    assert_eq!(v2.state(), WorkerState::Redundant);
    assert_eq!(generations(dir.path()).await, ["django-pwa-v1"]);

    let outcome = v2.fetch(&Request::get("/css/django-pwa-app.css")).await.unwrap();
    assert_eq!(outcome.served_from, ServedFrom::Cache);
}

#[tokio::test]
async fn miss_is_fetched_live_and_not_stored() {
    let dir = TempDir::new().unwrap();
    let server = origin().await;
    Mock::given(method("GET"))
        .and(path("/people/4"))
        .respond_with(ResponseTemplate::new(200).set_body_string("person"))
        .expect(2)
        .mount(&server)
        .await;

    let mut ctl = controller(dir.path(), &server.uri(), config("1", &[]));
    ctl.install().await.unwrap();
    ctl.activate().await.unwrap();

    for _ in 0..2 {
        let outcome = ctl.fetch(&Request::get("/people/4")).await.unwrap();
        assert_eq!(outcome.served_from, ServedFrom::Network);
        assert_eq!(outcome.response.body, "person");
    }
    let storage = DiskStorage::new(dir.path());
    let current = GenerationName::from_raw("django-pwa-v1");
    assert!(storage.match_in(&current, "/people/4").await.unwrap().is_none());
}

#[tokio::test]
async fn no_fallback_surfaces_offline_error() {
    let dir = TempDir::new().unwrap();
    let ctl = controller(dir.path(), DEAD_ORIGIN, config("1", &[]));
    let err = ctl.fetch(&Request::get("/people/4")).await.unwrap_err();
    assert!(matches!(err, Error::Offline { .. }));
}

#[tokio::test]
async fn worker_persists_record_next_to_generations() {
    let dir = TempDir::new().unwrap();
    let server = origin().await;
    let ctl = controller(&dir.path().join("generations"), &server.uri(), config("1", &[]));

    let (worker, join) = pwa_cache::worker::spawn(
        ctl,
        WorkerOptions {
            record_dir: Some(dir.path().to_path_buf()),
        },
    );
    let (installed, _) = worker.start().await.unwrap();
    assert_eq!(installed.stats.entries_stored, ASSETS.len());
    worker.shutdown();
    join.await.unwrap();

    let record = pwa_cache::WorkerRecord::load(dir.path()).unwrap().unwrap();
    assert_eq!(record.generation.as_str(), "django-pwa-v1");
    assert_eq!(record.state, WorkerState::Activated);
    assert_eq!(record.entries, ASSETS.len());
}

#[tokio::test]
async fn scheme_relative_path_is_not_proxied_to_another_host() {
    let dir = TempDir::new().unwrap();
    let server = origin().await;
    let mut ctl = controller(dir.path(), &server.uri(), config("1", &[]));
    ctl.install().await.unwrap();

    let outcome = ctl.fetch(&Request::get("//evil.example/steal")).await.unwrap();
    assert_eq!(outcome.served_from, ServedFrom::Offline);
    assert_eq!(outcome.response.body, "body of /offline");
}
