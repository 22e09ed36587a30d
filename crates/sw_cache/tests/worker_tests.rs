use std::sync::Arc;
use sw_cache::{
    CacheConfig, CacheError, CacheStorage, CacheWorker, FetchRequest, Method, MockNetwork,
    RequestMode, Response, ResponseSource, WorkerHandle, WorkerState,
};

const ORIGIN: &str = "https://app.test";

fn config(tag: &str) -> CacheConfig {
    CacheConfig::new(ORIGIN, tag)
        .with_storage_origin("https://storage.test")
        .with_manifest(vec!["/index.html".into(), "/offline.html".into()])
}

async fn shell_network() -> Arc<MockNetwork> {
    let network = Arc::new(MockNetwork::new());
    network
        .route("https://app.test/index.html", Response::ok("<html>app</html>"))
        .await;
    network
        .route("https://app.test/offline.html", Response::ok("<html>offline</html>"))
        .await;
    network
}

async fn activated_worker(network: Arc<MockNetwork>) -> WorkerHandle {
    let worker = CacheWorker::spawn(config("v2"), network);
    worker.install().await.unwrap();
    worker.activate().await.unwrap();
    worker
}

#[tokio::test]
async fn test_install_then_activate_prunes_old_build() {
    let network = shell_network().await;
    let mut storage = CacheStorage::new();
    storage
        .open("static-v1")
        .put("https://app.test/index.html", Response::ok("old"));
    storage.open("dynamic-v1");

    let worker = CacheWorker::spawn_with_storage(config("v2"), network, storage);
    assert_eq!(worker.state().await.unwrap(), WorkerState::Parsed);

    assert_eq!(worker.install().await.unwrap(), 2);
    assert_eq!(worker.state().await.unwrap(), WorkerState::Installed);
    // Old caches stay until activation
    assert_eq!(worker.cache_names().await.unwrap().len(), 3);

    let report = worker.activate().await.unwrap();
    assert_eq!(
        report.deleted_caches,
        vec!["dynamic-v1".to_string(), "static-v1".to_string()]
    );
    assert!(report.clients_claimed);
    assert_eq!(worker.state().await.unwrap(), WorkerState::Activated);
    assert_eq!(
        worker.cache_names().await.unwrap(),
        vec!["static-v2".to_string()]
    );
}

#[tokio::test]
async fn test_failed_install_is_redundant() {
    let network = Arc::new(MockNetwork::new());
    network
        .route("https://app.test/index.html", Response::ok("<html>"))
        .await;
    network.fail("https://app.test/offline.html", "connection reset").await;

    let worker = CacheWorker::spawn(config("v2"), network);
    let err = worker.install().await.unwrap_err();
    assert!(matches!(err, CacheError::InstallFailed { .. }));
    assert_eq!(worker.state().await.unwrap(), WorkerState::Redundant);
    assert!(worker.cache_names().await.unwrap().is_empty());

    assert!(matches!(
        worker.activate().await,
        Err(CacheError::NotInstalled(WorkerState::Redundant))
    ));
    assert_eq!(
        worker.fetch(FetchRequest::get("https://app.test/app.js")).await,
        Err(CacheError::NotIntercepted)
    );
}

#[tokio::test]
async fn test_activate_before_install_is_rejected() {
    let worker = CacheWorker::spawn(config("v2"), shell_network().await);
    let err = worker.activate().await.unwrap_err();
    assert_eq!(err, CacheError::NotInstalled(WorkerState::Parsed));
    assert_eq!(err.to_string(), "Cache worker is not installed (state: Parsed)");
    assert_eq!(worker.state().await.unwrap(), WorkerState::Parsed);

    worker.install().await.unwrap();
    assert!(worker.activate().await.is_ok());
}

#[tokio::test]
async fn test_fetch_before_activation_not_intercepted() {
    let network = shell_network().await;
    let worker = CacheWorker::spawn(config("v2"), network);
    worker.install().await.unwrap();

    let result = worker.fetch(FetchRequest::navigate("https://app.test/")).await;
    assert_eq!(result, Err(CacheError::NotIntercepted));
}

#[tokio::test]
async fn test_passthrough_requests() {
    let network = shell_network().await;
    let worker = activated_worker(network.clone()).await;
    let before = network.requests().await.len();

    let post = FetchRequest::get("https://app.test/api/tasks").with_method(Method::Post);
    assert_eq!(worker.fetch(post).await, Err(CacheError::NotIntercepted));

    let foreign = FetchRequest::get("https://cdn.other.test/lib.js").with_mode(RequestMode::NoCors);
    assert_eq!(worker.fetch(foreign).await, Err(CacheError::NotIntercepted));

    assert_eq!(network.requests().await.len(), before);
}

#[tokio::test]
async fn test_navigation_served_from_cache_then_offline_page() {
    let network = shell_network().await;
    let worker = activated_worker(network.clone()).await;

    let out = worker
        .fetch(FetchRequest::navigate("https://app.test/index.html"))
        .await
        .unwrap();
    assert_eq!(out.source, ResponseSource::Cache);
    assert_eq!(out.response.body, b"<html>app</html>");

    network.set_offline(true).await;
    let out = worker
        .fetch(FetchRequest::navigate("https://app.test/chat/c1"))
        .await
        .unwrap();
    assert_eq!(out.source, ResponseSource::OfflinePage);
    assert_eq!(out.response.body, b"<html>offline</html>");
}

#[tokio::test]
async fn test_static_asset_offline_miss_is_network_error() {
    let network = shell_network().await;
    let worker = activated_worker(network.clone()).await;
    network.set_offline(true).await;

    let result = worker
        .fetch(FetchRequest::get("https://app.test/assets/app.js"))
        .await;
    assert!(matches!(result, Err(CacheError::Network(_))));
}

#[tokio::test]
async fn test_api_network_first_falls_back_to_cache() {
    let network = shell_network().await;
    network
        .route("https://app.test/api/tasks", Response::ok("[1]"))
        .await;
    let worker = activated_worker(network.clone()).await;

    let out = worker
        .fetch(FetchRequest::get("https://app.test/api/tasks"))
        .await
        .unwrap();
    assert_eq!(out.source, ResponseSource::Network);

    network
        .route("https://app.test/api/tasks", Response::ok("[1,2]"))
        .await;
    let out = worker
        .fetch(FetchRequest::get("https://app.test/api/tasks"))
        .await
        .unwrap();
    assert_eq!(out.source, ResponseSource::Network);
    assert_eq!(out.response.body, b"[1,2]");

    network.set_offline(true).await;
    let out = worker
        .fetch(FetchRequest::get("https://app.test/api/tasks"))
        .await
        .unwrap();
    assert_eq!(out.source, ResponseSource::Cache);
    assert_eq!(out.response.body, b"[1,2]");
}

#[tokio::test]
async fn test_storage_origin_cached_network_first() {
    let network = shell_network().await;
    network
        .route("https://storage.test/avatars/u1.png", Response::ok("png"))
        .await;
    let worker = activated_worker(network.clone()).await;

    let avatar = FetchRequest::get("https://storage.test/avatars/u1.png").with_mode(RequestMode::Cors);
    let out = worker.fetch(avatar.clone()).await.unwrap();
    assert_eq!(out.source, ResponseSource::Network);

    network.set_offline(true).await;
    let out = worker.fetch(avatar).await.unwrap();
    assert_eq!(out.source, ResponseSource::Cache);
    assert_eq!(out.response.body, b"png");
}

#[tokio::test]
async fn test_error_status_not_cached() {
    let network = shell_network().await;
    network
        .route("https://app.test/api/me", Response::new(500, "boom"))
        .await;
    let worker = activated_worker(network.clone()).await;

    let out = worker
        .fetch(FetchRequest::get("https://app.test/api/me"))
        .await
        .unwrap();
    assert_eq!(out.response.status, 500);

    network.set_offline(true).await;
    let result = worker.fetch(FetchRequest::get("https://app.test/api/me")).await;
    assert!(matches!(result, Err(CacheError::Network(_))));
}

#[tokio::test]
async fn test_shutdown_stops_clones() {
    let network = shell_network().await;
    let worker = CacheWorker::spawn(config("v2"), network);
    let other = worker.clone();

    worker.shutdown().await;
    assert_eq!(other.state().await, Err(CacheError::WorkerStopped));
    assert_eq!(other.install().await, Err(CacheError::WorkerStopped));
}
