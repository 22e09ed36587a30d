//! Cache layer configuration.

use serde::{Deserialize, Serialize};

/// Cache worker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Build identifier; versions both cache names
    pub build_tag: String,
    /// Origin the app is served from, e.g. `https://app.example.com`
    pub origin: String,
    /// Object storage origin whose responses are cached network-first
    pub storage_origin: Option<String>,
    /// Same-origin paths pre-cached on install
    pub static_manifest: Vec<String>,
    /// Path of the page served when a navigation fails offline
    pub offline_page: String,
    /// Path prefixes of API requests
    pub api_prefixes: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            build_tag: "v1".to_string(),
            origin: "http://localhost".to_string(),
            storage_origin: None,
            static_manifest: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/offline.html".to_string(),
                "/manifest.json".to_string(),
            ],
            offline_page: "/offline.html".to_string(),
            api_prefixes: vec!["/api/".to_string()],
        }
    }
}

impl CacheConfig {
    pub fn new(origin: impl Into<String>, build_tag: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            build_tag: build_tag.into(),
            ..Default::default()
        }
    }

    pub fn with_storage_origin(mut self, origin: impl Into<String>) -> Self {
        self.storage_origin = Some(origin.into());
        self
    }

    pub fn with_manifest(mut self, paths: Vec<String>) -> Self {
        self.static_manifest = paths;
        self
    }

    pub fn with_offline_page(mut self, path: impl Into<String>) -> Self {
        self.offline_page = path.into();
        self
    }

    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefixes.push(prefix.into());
        self
    }

    /// Name of the pre-cached asset cache
    pub fn static_cache_name(&self) -> String {
        format!("static-{}", self.build_tag)
    }

    /// Name of the opportunistic response cache
    pub fn dynamic_cache_name(&self) -> String {
        format!("dynamic-{}", self.build_tag)
    }

    /// Absolute URL of a same-origin path
    pub fn absolute(&self, path: &str) -> String {
        if path.contains("://") {
            path.to_string()
        } else {
            format!("{}{}", self.origin.trim_end_matches('/'), path)
        }
    }

    /// Absolute URLs of the install manifest
    pub fn manifest_urls(&self) -> Vec<String> {
        self.static_manifest.iter().map(|p| self.absolute(p)).collect()
    }

    pub fn offline_page_url(&self) -> String {
        self.absolute(&self.offline_page)
    }
}
