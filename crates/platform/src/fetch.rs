//! Network fetch contract and test double.

use crate::error::Result;
use crate::models::{Request, Response};
use async_trait::async_trait;

/// Unified interface for performing network fetches.
///
/// The engine never talks to a socket itself; the host environment supplies
/// an implementation of this trait. Two rules every implementation must
/// follow:
///
/// - HTTP error statuses (404, 500, …) are **successful** fetches and come
///   back as `Ok(Response)`. Only transport-level failures (DNS, refused
///   connection, aborted stream) are `Err`.
/// - The returned [`Response`] is fully buffered and carries the *final*
///   URL after redirects, which may differ from the requested one.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

#[cfg(feature = "mock")]
pub use self::mock::MockFetcher;

#[cfg(feature = "mock")]
mod mock {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::HashMap;
    use tokio::sync::RwLock;
    use url::Url;

    #[derive(Default)]
    struct Route {
        fails_remaining: u32,
        response: Option<Response>,
        hits: usize,
    }

    /// Scriptable in-process [`Fetcher`] for tests.
    ///
    /// Routes are keyed by URL with query and fragment stripped, so
    /// cache-busting query parameters added by the engine still hit the
    /// scripted route. Every fetch attempt (including scripted failures)
    /// increments the route's hit counter, which lets tests assert that a
    /// resumed run did *not* re-fetch already-cached resources.
    #[derive(Default)]
    pub struct MockFetcher {
        routes: RwLock<HashMap<String, Route>>,
    }

    impl MockFetcher {
        /// Create a mock pre-populated with responses.
        ///
        /// Panics if any route URL fails to parse. If test setup is wrong,
        /// then the test should not pass.
        pub fn with_responses(routes: impl IntoIterator<Item = (impl AsRef<str>, Response)>) -> Self {
            let mut map = HashMap::new();
            for (route, response) in routes {
                map.insert(Self::route_key(route.as_ref()), Route { response: Some(response), ..Route::default() });
            }
            Self { routes: RwLock::new(map) }
        }

        /// Set (or replace) the response served for a URL.
        pub async fn respond(&self, route: &str, response: Response) {
            let mut routes = self.routes.write().await;
            routes.entry(Self::route_key(route)).or_default().response = Some(response);
        }

        /// Make the next `times` fetches of a URL fail at the transport
        /// level before any scripted response is served again.
        pub async fn fail(&self, route: &str, times: u32) {
            let mut routes = self.routes.write().await;
            routes.entry(Self::route_key(route)).or_default().fails_remaining = times;
        }

        /// Make every fetch of a URL fail at the transport level.
        pub async fn fail_always(&self, route: &str) {
            self.fail(route, u32::MAX).await;
        }

        /// Number of fetch attempts observed for a URL, failures included.
        pub async fn hits(&self, route: &str) -> usize {
            self.routes.read().await.get(&Self::route_key(route)).map(|r| r.hits).unwrap_or(0)
        }

        fn route_key(route: &str) -> String {
            let Ok(mut url) = Url::parse(route) else {
                panic!("MockFetcher: invalid route URL {route}");
            };
            url.set_query(None);
            url.set_fragment(None);
            url.into()
        }
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        async fn fetch(&self, request: &Request) -> Result<Response> {
            let key = Self::route_key(request.url.as_str());
            let mut routes = self.routes.write().await;
            let Some(route) = routes.get_mut(&key) else {
                exn::bail!(ErrorKind::Network(format!("no route for {key}")));
            };
            route.hits += 1;
            if route.fails_remaining > 0 {
                route.fails_remaining = route.fails_remaining.saturating_sub(1);
                exn::bail!(ErrorKind::Network(format!("scripted failure for {key}")));
            }
            match &route.response {
                Some(response) => Ok(response.clone()),
                None => exn::bail!(ErrorKind::Network(format!("no response scripted for {key}"))),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::models::RequestMode;

        fn request(url: &str) -> Request {
            Request::new(Url::parse(url).unwrap(), RequestMode::Fetch)
        }

        #[tokio::test]
        async fn test_scripted_response() {
            let url = Url::parse("https://site.example/a.html").unwrap();
            let fetcher = MockFetcher::with_responses([("https://site.example/a.html", Response::html(url, 200, "<p>a</p>"))]);
            let response = fetcher.fetch(&request("https://site.example/a.html")).await.unwrap();
            assert_eq!(response.status, 200);
            assert_eq!(response.body, b"<p>a</p>");
        }

        #[tokio::test]
        async fn test_route_ignores_query_and_fragment() {
            let url = Url::parse("https://site.example/a.html").unwrap();
            let fetcher = MockFetcher::with_responses([("https://site.example/a.html", Response::html(url, 200, "a"))]);
            let response = fetcher.fetch(&request("https://site.example/a.html?v=123#frag")).await.unwrap();
            assert_eq!(response.status, 200);
            assert_eq!(fetcher.hits("https://site.example/a.html").await, 1);
        }

        #[tokio::test]
        async fn test_unknown_route_is_a_network_error() {
            let fetcher = MockFetcher::default();
            let err = fetcher.fetch(&request("https://site.example/missing")).await.unwrap_err();
            assert!(matches!(&*err, ErrorKind::Network(_)));
        }

        #[tokio::test]
        async fn test_failures_then_recovery() {
            let url = Url::parse("https://site.example/flaky.js").unwrap();
            let fetcher =
                MockFetcher::with_responses([("https://site.example/flaky.js", Response::new(url, 200).with_body("js"))]);
            fetcher.fail("https://site.example/flaky.js", 2).await;
            assert!(fetcher.fetch(&request("https://site.example/flaky.js")).await.is_err());
            assert!(fetcher.fetch(&request("https://site.example/flaky.js")).await.is_err());
            assert!(fetcher.fetch(&request("https://site.example/flaky.js")).await.is_ok());
            assert_eq!(fetcher.hits("https://site.example/flaky.js").await, 3);
        }
    }
}
