//! Cache-first and network-first fetch policies.

use crate::classify::RequestClass;
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::network::Network;
use crate::request::{FetchRequest, Response};
use crate::storage::CacheStorage;

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// The offline page stood in for a failed navigation
    OfflinePage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub response: Response,
    pub source: ResponseSource,
}

impl FetchOutcome {
    fn new(response: Response, source: ResponseSource) -> Self {
        Self { response, source }
    }
}

/// Serve from cache when present, otherwise from the network.
///
/// Network responses with status 200 are stored in the dynamic cache. A
/// failed navigation falls back to the pre-cached offline page.
pub async fn cache_first<N: Network>(
    config: &CacheConfig,
    storage: &mut CacheStorage,
    network: &N,
    class: RequestClass,
    request: &FetchRequest,
) -> CacheResult<FetchOutcome> {
    let static_name = config.static_cache_name();
    let dynamic_name = config.dynamic_cache_name();

    let cached = storage.match_in(&[static_name.as_str(), dynamic_name.as_str()], &request.url);
    if let Some(hit) = cached {
        return Ok(FetchOutcome::new(hit.clone(), ResponseSource::Cache));
    }

    match network.fetch(request).await {
        Ok(response) => {
            if response.is_cacheable() {
                storage.open(&dynamic_name).put(&request.url, response.clone());
            }
            Ok(FetchOutcome::new(response, ResponseSource::Network))
        }
        Err(err) if class == RequestClass::Navigation => {
            let offline_url = config.offline_page_url();
            match storage.match_in(&[static_name.as_str()], &offline_url) {
                Some(page) => {
                    tracing::debug!("Serving offline page for {}", request.url);
                    Ok(FetchOutcome::new(page.clone(), ResponseSource::OfflinePage))
                }
                None => Err(err),
            }
        }
        Err(err) => Err(err),
    }
}

/// Try the network first, falling back to the last cached response.
pub async fn network_first<N: Network>(
    config: &CacheConfig,
    storage: &mut CacheStorage,
    network: &N,
    request: &FetchRequest,
) -> CacheResult<FetchOutcome> {
    let dynamic_name = config.dynamic_cache_name();

    match network.fetch(request).await {
        Ok(response) => {
            if response.is_cacheable() {
                storage.open(&dynamic_name).put(&request.url, response.clone());
            }
            Ok(FetchOutcome::new(response, ResponseSource::Network))
        }
        Err(err) => {
            let static_name = config.static_cache_name();
            let names = [dynamic_name.as_str(), static_name.as_str()];
            match storage.match_in(&names, &request.url) {
                Some(cached) => {
                    tracing::debug!("Network failed for {}, serving cached copy", request.url);
                    Ok(FetchOutcome::new(cached.clone(), ResponseSource::Cache))
                }
                None => Err(err),
            }
        }
    }
}

/// Fetch every manifest URL into a fresh static cache.
///
/// All or nothing: the cache is only stored when every asset fetched with
/// status 200.
pub async fn precache<N: Network>(
    config: &CacheConfig,
    storage: &mut CacheStorage,
    network: &N,
) -> CacheResult<usize> {
    let mut fetched = Vec::new();
    for url in config.manifest_urls() {
        let response = network
            .fetch(&FetchRequest::get(url.clone()))
            .await
            .map_err(|e| CacheError::InstallFailed {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        if !response.is_cacheable() {
            return Err(CacheError::InstallFailed {
                url,
                reason: format!("status {}", response.status),
            });
        }
        fetched.push((url, response));
    }

    let count = fetched.len();
    let cache = storage.open(&config.static_cache_name());
    for (url, response) in fetched {
        cache.put(&url, response);
    }
    Ok(count)
}

/// Delete every cache that is not one of the current two
pub fn prune_stale(config: &CacheConfig, storage: &mut CacheStorage) -> Vec<String> {
    let current = [config.static_cache_name(), config.dynamic_cache_name()];
    let stale: Vec<String> = storage
        .keys()
        .into_iter()
        .filter(|name| !current.contains(name))
        .collect();

    for name in &stale {
        storage.delete(name);
        tracing::info!("Deleted stale cache {}", name);
    }
    stale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::MockNetwork;

    fn config() -> CacheConfig {
        CacheConfig::new("https://app.test", "v2")
            .with_manifest(vec!["/index.html".into(), "/offline.html".into()])
    }

    #[tokio::test]
    async fn test_cache_first_caches_200_only() {
        let config = config();
        let mut storage = CacheStorage::new();
        let network = MockNetwork::new();
        network
            .route("https://app.test/app.js", Response::ok("js"))
            .await;
        let missing = FetchRequest::get("https://app.test/missing.js");
        let asset = FetchRequest::get("https://app.test/app.js");

        let out = cache_first(&config, &mut storage, &network, RequestClass::StaticAsset, &missing)
            .await
            .unwrap();
        assert_eq!(out.response.status, 404);

        let out = cache_first(&config, &mut storage, &network, RequestClass::StaticAsset, &asset)
            .await
            .unwrap();
        assert_eq!(out.source, ResponseSource::Network);

        let out = cache_first(&config, &mut storage, &network, RequestClass::StaticAsset, &asset)
            .await
            .unwrap();
        assert_eq!(out.source, ResponseSource::Cache);

        let dynamic = storage.get("dynamic-v2").unwrap();
        assert_eq!(dynamic.len(), 1);
        assert_eq!(network.requests().await.len(), 2);
    }

    #[tokio::test]
    async fn test_precache_is_all_or_nothing() {
        let config = config();
        let mut storage = CacheStorage::new();
        let network = MockNetwork::new();
        network
            .route("https://app.test/index.html", Response::ok("<html>"))
            .await;

        let err = precache(&config, &mut storage, &network).await.unwrap_err();
        assert_eq!(
            err,
            CacheError::InstallFailed {
                url: "https://app.test/offline.html".into(),
                reason: "status 404".into()
            }
        );
        assert!(!storage.has("static-v2"));

        network
            .route("https://app.test/offline.html", Response::ok("offline"))
            .await;
        assert_eq!(precache(&config, &mut storage, &network).await.unwrap(), 2);
        assert_eq!(storage.get("static-v2").unwrap().len(), 2);
    }

    #[test]
    fn test_prune_stale() {
        let config = config();
        let mut storage = CacheStorage::new();
        storage.open("static-v1");
        storage.open("dynamic-v1");
        storage.open("static-v2");

        let mut deleted = prune_stale(&config, &mut storage);
        deleted.sort();
        assert_eq!(deleted, vec!["dynamic-v1".to_string(), "static-v1".to_string()]);
        assert_eq!(storage.keys(), vec!["static-v2".to_string()]);
    }
}
