//! Manifest key and clean-URL rules.
//!
//! Resource identity throughout the engine is the URL with query and
//! fragment stripped ("manifest key"). Clean URLs, meaning extension-less
//! paths and trailing slashes, map deterministically to the HTML file the
//! build wrote for them.

use url::Url;

/// Strip query and fragment, yielding the cache identity of a URL.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use stash_manifest::manifest_key;
///
/// let url = Url::parse("https://site.example/app.js?v=3#top").unwrap();
/// assert_eq!(manifest_key(&url), "https://site.example/app.js");
/// ```
pub fn manifest_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.into()
}

/// Map a document URL to the HTML file backing it.
///
/// - a path ending in `/` gains `index.html`,
/// - a path whose last segment has no extension gains `.html`,
/// - anything else is only stripped of query and fragment.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use stash_manifest::clean_url_key;
///
/// let url = Url::parse("https://site.example/docs/guide").unwrap();
/// assert_eq!(clean_url_key(&url), "https://site.example/docs/guide.html");
/// ```
pub fn clean_url_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    let path = url.path().to_string();
    if path.ends_with('/') {
        url.set_path(&format!("{path}index.html"));
    } else if !path.rsplit('/').next().unwrap_or_default().contains('.') {
        url.set_path(&format!("{path}.html"));
    }
    url.into()
}

/// Whether a manifest key belongs in the `pages` cache rather than `assets`.
pub fn is_page(key: &str) -> bool {
    key.ends_with(".html")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[rstest]
    #[case("https://site.example/app.js", "https://site.example/app.js")]
    #[case("https://site.example/app.js?v=3", "https://site.example/app.js")]
    #[case("https://site.example/app.js#main", "https://site.example/app.js")]
    #[case("https://site.example/app.js?v=3#main", "https://site.example/app.js")]
    fn test_manifest_key_strips_query_and_fragment(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(manifest_key(&url(input)), expected);
    }

    #[rstest]
    #[case("https://site.example/docs/", "https://site.example/docs/index.html")]
    #[case("https://site.example/", "https://site.example/index.html")]
    #[case("https://site.example/docs/guide", "https://site.example/docs/guide.html")]
    #[case("https://site.example/docs/guide?tab=2", "https://site.example/docs/guide.html")]
    #[case("https://site.example/file.html", "https://site.example/file.html")]
    #[case("https://site.example/v1.2/notes", "https://site.example/v1.2/notes.html")]
    #[case("https://site.example/v1.2/", "https://site.example/v1.2/index.html")]
    fn test_clean_url_mapping(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(clean_url_key(&url(input)), expected);
    }

    #[test]
    fn test_page_split() {
        assert!(is_page("https://site.example/docs/index.html"));
        assert!(!is_page("https://site.example/app.js"));
        assert!(!is_page("https://site.example/logo.svg"));
    }
}
