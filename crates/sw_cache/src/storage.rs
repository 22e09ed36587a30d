//! Named response caches.

use crate::request::Response;
use std::collections::{BTreeMap, HashMap};

/// All caches of the origin, by name
#[derive(Debug, Default, Clone)]
pub struct CacheStorage {
    caches: BTreeMap<String, Cache>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open or create a cache
    pub fn open(&mut self, name: &str) -> &mut Cache {
        self.caches.entry(name.to_string()).or_default()
    }

    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Delete a cache
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Cache names in sorted order
    pub fn keys(&self) -> Vec<String> {
        self.caches.keys().cloned().collect()
    }

    /// First match for `url` among the named caches, in the given order
    pub fn match_in(&self, names: &[&str], url: &str) -> Option<&Response> {
        names
            .iter()
            .filter_map(|name| self.caches.get(*name))
            .find_map(|cache| cache.match_url(url))
    }
}

/// URL-keyed responses
#[derive(Debug, Default, Clone)]
pub struct Cache {
    entries: HashMap<String, Response>,
}

impl Cache {
    pub fn put(&mut self, url: &str, response: Response) {
        self.entries.insert(url.to_string(), response);
    }

    pub fn match_url(&self, url: &str) -> Option<&Response> {
        self.entries.get(url)
    }

    pub fn delete(&mut self, url: &str) -> bool {
        self.entries.remove(url).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_put_match() {
        let mut storage = CacheStorage::new();
        storage
            .open("static-v1")
            .put("https://a.test/app.js", Response::ok("js"));

        assert!(storage.has("static-v1"));
        assert_eq!(
            storage.match_in(&["dynamic-v1", "static-v1"], "https://a.test/app.js"),
            Some(&Response::ok("js"))
        );
        assert_eq!(storage.match_in(&["dynamic-v1"], "https://a.test/app.js"), None);
    }

    #[test]
    fn test_match_order() {
        let mut storage = CacheStorage::new();
        storage.open("a").put("u", Response::ok("from a"));
        storage.open("b").put("u", Response::ok("from b"));

        assert_eq!(storage.match_in(&["b", "a"], "u").unwrap().body, b"from b");
    }

    #[test]
    fn test_delete() {
        let mut storage = CacheStorage::new();
        storage.open("old");
        assert!(storage.delete("old"));
        assert!(!storage.delete("old"));
        assert!(storage.keys().is_empty());
    }
}
