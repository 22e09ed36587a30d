//! Requests and responses seen by the cache worker.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn parse(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Some(Method::Get),
            "HEAD" => Some(Method::Head),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "PATCH" => Some(Method::Patch),
            "DELETE" => Some(Method::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Top-level page load
    Navigate,
    SameOrigin,
    Cors,
    NoCors,
}

/// Fetch request for interception
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub mode: RequestMode,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            mode: RequestMode::SameOrigin,
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            mode: RequestMode::Navigate,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// `scheme://host[:port]` of the URL
    pub fn origin(&self) -> &str {
        split_url(&self.url).0
    }

    /// Path of the URL, without query or fragment
    pub fn path(&self) -> &str {
        let rest = split_url(&self.url).1;
        let end = rest.find(['?', '#']).unwrap_or(rest.len());
        match &rest[..end] {
            "" => "/",
            path => path,
        }
    }
}

/// Split a URL into origin and the remainder starting at the path
fn split_url(url: &str) -> (&str, &str) {
    let after_scheme = match url.find("://") {
        Some(idx) => idx + 3,
        None => return ("", url),
    };
    match url[after_scheme..].find(['/', '?', '#']) {
        Some(idx) => url.split_at(after_scheme + idx),
        None => (url, ""),
    }
}

/// An HTTP response, cached or from the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Only complete 200 responses are stored
    pub fn is_cacheable(&self) -> bool {
        self.status == 200
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_and_path() {
        let req = FetchRequest::get("https://app.example.com/api/chats?limit=20");
        assert_eq!(req.origin(), "https://app.example.com");
        assert_eq!(req.path(), "/api/chats");

        let root = FetchRequest::navigate("https://app.example.com");
        assert_eq!(root.origin(), "https://app.example.com");
        assert_eq!(root.path(), "/");

        let port = FetchRequest::get("http://localhost:5173/#/chat");
        assert_eq!(port.origin(), "http://localhost:5173");
        assert_eq!(port.path(), "/");
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(Method::parse("get"), Some(Method::Get));
        assert_eq!(Method::parse("OPTIONS"), None);
    }

    #[test]
    fn test_cacheable() {
        assert!(Response::ok("x").is_cacheable());
        assert!(!Response::new(206, "x").is_cacheable());
        assert!(!Response::new(404, "").is_cacheable());
    }
}
