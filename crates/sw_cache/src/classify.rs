//! Request classification.
//!
//! Decides which policy, if any, handles a request:
//!
//! | class         | policy        |
//! |---------------|---------------|
//! | `Navigation`  | cache-first, offline page fallback |
//! | `StaticAsset` | cache-first   |
//! | `Api`         | network-first |
//! | `Storage`     | network-first |
//! | `Passthrough` | not intercepted |

use crate::config::CacheConfig;
use crate::request::{FetchRequest, Method, RequestMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    Navigation,
    StaticAsset,
    Api,
    Storage,
    Passthrough,
}

impl RequestClass {
    pub fn is_cache_first(&self) -> bool {
        matches!(self, RequestClass::Navigation | RequestClass::StaticAsset)
    }

    pub fn is_network_first(&self) -> bool {
        matches!(self, RequestClass::Api | RequestClass::Storage)
    }
}

/// Classify a request
pub fn classify(config: &CacheConfig, request: &FetchRequest) -> RequestClass {
    if request.method != Method::Get {
        return RequestClass::Passthrough;
    }

    let origin = request.origin();
    if origin != config.origin.trim_end_matches('/') {
        return match &config.storage_origin {
            Some(storage) if origin == storage.trim_end_matches('/') => RequestClass::Storage,
            _ => RequestClass::Passthrough,
        };
    }

    if request.mode == RequestMode::Navigate {
        return RequestClass::Navigation;
    }

    let path = request.path();
    if config
        .api_prefixes
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
    {
        RequestClass::Api
    } else {
        RequestClass::StaticAsset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CacheConfig {
        CacheConfig::new("https://app.example.com", "v1")
            .with_storage_origin("https://storage.example.com")
    }

    #[test]
    fn test_navigation() {
        let req = FetchRequest::navigate("https://app.example.com/chat/c1");
        assert_eq!(classify(&config(), &req), RequestClass::Navigation);
    }

    #[test]
    fn test_static_and_api() {
        let config = config();
        assert_eq!(
            classify(&config, &FetchRequest::get("https://app.example.com/assets/app.js")),
            RequestClass::StaticAsset
        );
        assert_eq!(
            classify(&config, &FetchRequest::get("https://app.example.com/api/tasks")),
            RequestClass::Api
        );
    }

    #[test]
    fn test_storage_origin() {
        let req = FetchRequest::get("https://storage.example.com/avatars/u1.png")
            .with_mode(RequestMode::Cors);
        assert_eq!(classify(&config(), &req), RequestClass::Storage);
    }

    #[test]
    fn test_passthrough() {
        let config = config();
        let post = FetchRequest::get("https://app.example.com/api/tasks").with_method(Method::Post);
        assert_eq!(classify(&config, &post), RequestClass::Passthrough);

        let foreign = FetchRequest::get("https://fonts.example.net/a.woff2");
        assert_eq!(classify(&config, &foreign), RequestClass::Passthrough);

        let no_storage = CacheConfig::new("https://app.example.com", "v1");
        let upload = FetchRequest::get("https://storage.example.com/a.png");
        assert_eq!(classify(&no_storage, &upload), RequestClass::Passthrough);
    }
}
