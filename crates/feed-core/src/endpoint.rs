// Feed endpoint URL construction

use url::Url;

use crate::error::{FeedError, Result};

/// Fixed path of the activity feed below the configured base address
pub const FEED_PATH: &str = "/api/admin/feed";

/// Base address used when nothing is configured
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000";

/// Build `<base>/api/admin/feed?token=<credential>`
///
/// `http`/`https` bases are mapped to `ws`/`wss` so the same base URL can be
/// shared with the HTTP API. The credential is URL-encoded.
pub fn feed_url(base: &str, token: &str) -> Result<Url> {
    let mut url = Url::parse(base.trim())?;

    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => return Err(FeedError::UnsupportedScheme(other.to_string())),
    };
    if url.scheme() != scheme && url.set_scheme(scheme).is_err() {
        return Err(FeedError::UnsupportedScheme(url.scheme().to_string()));
    }

    let path = format!("{}{}", url.path().trim_end_matches('/'), FEED_PATH);
    url.set_path(&path);
    url.set_fragment(None);
    url.query_pairs_mut().clear().append_pair("token", token);

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint() {
        let url = feed_url(DEFAULT_ENDPOINT, "abc").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8000/api/admin/feed?token=abc");
    }

    #[test]
    fn test_token_is_url_encoded() {
        let url = feed_url("ws://feed.local", "a+b/c=").unwrap();
        assert_eq!(
            url.as_str(),
            "ws://feed.local/api/admin/feed?token=a%2Bb%2Fc%3D"
        );
    }

    #[test]
    fn test_http_bases_map_to_websocket_schemes() {
        let url = feed_url("https://api.example.com/", "t").unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/api/admin/feed");

        let url = feed_url("http://localhost:8000", "t").unwrap();
        assert_eq!(url.scheme(), "ws");
    }

    #[test]
    fn test_base_path_is_kept() {
        let url = feed_url("wss://example.com/backend/", "t").unwrap();
        assert_eq!(url.path(), "/backend/api/admin/feed");
    }

    #[test]
    fn test_rejects_bad_endpoints() {
        assert!(matches!(
            feed_url("not a url", "t"),
            Err(FeedError::Endpoint(_))
        ));
        assert!(matches!(
            feed_url("ftp://example.com", "t"),
            Err(FeedError::UnsupportedScheme(s)) if s == "ftp"
        ));
    }
}
