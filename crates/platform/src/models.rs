//! Request and response models shared by every platform contract.
//!
//! Responses are buffered by value: the body is a plain `Vec<u8>` rather
//! than a stream, so the same response can be written to a cache and served
//! to a client without worrying about stream consumption state.

use url::Url;

/// How the client intends to use the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Top-level document navigation.
    Navigate,
    /// Speculative document fetch ahead of a navigation.
    Prefetch,
    /// Subresource fetch (scripts, styles, images, data).
    Fetch,
}

/// An incoming same-origin GET request.
///
/// Only GETs flow through the engine; other methods never reach it, so the
/// model carries no method field.
#[derive(Debug, Clone)]
pub struct Request {
    /// Full request URL, query and fragment included.
    pub url: Url,
    pub mode: RequestMode,
    headers: Vec<(String, String)>,
}

impl Request {
    pub fn new(url: Url, mode: RequestMode) -> Self {
        Self { url, mode, headers: Vec::new() }
    }

    /// Append a header. Duplicate names are allowed, matching the wire.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First header value for `name`, matched ASCII case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_lookup(&self.headers, name)
    }

    /// Whether this request expects an HTML document. Covers explicit
    /// navigations, prefetch-mode requests, and legacy `purpose: prefetch`
    /// hints from speculative loaders.
    pub fn is_document(&self) -> bool {
        matches!(self.mode, RequestMode::Navigate | RequestMode::Prefetch)
            || self.header("purpose").is_some_and(|v| v.eq_ignore_ascii_case("prefetch"))
    }
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    /// Final URL after any redirects. May differ from the requested URL.
    pub url: Url,
    pub status: u16,
    headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(url: Url, status: u16) -> Self {
        Self { url, status, headers: Vec::new(), body: Vec::new() }
    }

    /// An HTML response with a `content-type` header already set.
    pub fn html(url: Url, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self::new(url, status).with_header("content-type", "text/html; charset=utf-8").with_body(body)
    }

    /// A bodyless response, used as the last-resort fallback tier.
    pub fn empty(url: Url, status: u16) -> Self {
        Self::new(url, status)
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set a header, replacing any existing value for the same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    /// First header value for `name`, matched ASCII case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_lookup(&self.headers, name)
    }

    /// Whether the status is in the successful 2xx range.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn header_lookup<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = Response::new(url("https://site.example/a"), 200).with_header("Content-Type", "text/css");
        assert_eq!(response.header("content-type"), Some("text/css"));
        assert_eq!(response.header("CONTENT-TYPE"), Some("text/css"));
        assert_eq!(response.header("etag"), None);
    }

    #[test]
    fn test_with_header_replaces_existing_value() {
        let response = Response::new(url("https://site.example/a"), 200)
            .with_header("x-tag", "one")
            .with_header("X-Tag", "two");
        assert_eq!(response.header("x-tag"), Some("two"));
    }

    #[test]
    fn test_is_ok_bounds() {
        let base = url("https://site.example/a");
        assert!(Response::new(base.clone(), 200).is_ok());
        assert!(Response::new(base.clone(), 299).is_ok());
        assert!(!Response::new(base.clone(), 304).is_ok());
        assert!(!Response::new(base, 404).is_ok());
    }

    #[test]
    fn test_document_classification() {
        let base = url("https://site.example/docs");
        assert!(Request::new(base.clone(), RequestMode::Navigate).is_document());
        assert!(Request::new(base.clone(), RequestMode::Prefetch).is_document());
        assert!(!Request::new(base.clone(), RequestMode::Fetch).is_document());
        // Speculation hints arrive as plain fetches with a purpose header.
        let hinted = Request::new(base, RequestMode::Fetch).with_header("Purpose", "prefetch");
        assert!(hinted.is_document());
    }
}
