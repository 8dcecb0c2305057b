use crate::{UrlError, UrlResult};
use url::Url;

/// Query parameters that only carry tracking data
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "msclkid", "_ga"];

/// Normalizes a URL into its dedup form
///
/// # Normalization Steps
///
/// 1. Parse; reject non-HTTP(S) schemes and URLs without a host
/// 2. Host is lowercased (by the parser)
/// 3. Collapse empty and dot path segments, drop a trailing slash (except root)
/// 4. Drop the fragment
/// 5. Drop tracking parameters (`utm_*` and a fixed list), sort the rest by key
///
/// Scheme, host and port are kept as-is, so the normalized URL is still the
/// one that gets fetched.
///
/// # Examples
///
/// ```
/// use sumi_tide::url::normalize_url;
///
/// let url = normalize_url("https://EXAMPLE.com//docs/?b=2&a=1&utm_source=x#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/docs?a=1&b=2");
/// ```
pub fn normalize_url(raw: &str) -> UrlResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_parsed(url)
}

/// Resolves a possibly relative link against `base` and normalizes it
pub fn resolve_link(base: &Url, raw: &str) -> UrlResult<Url> {
    let url = base
        .join(raw.trim())
        .map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_parsed(url)
}

fn normalize_parsed(mut url: Url) -> UrlResult<Url> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }
    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(UrlError::MissingDomain);
    }

    let path = normalize_path(url.path());
    url.set_path(&path);
    url.set_fragment(None);

    if url.query().is_some() {
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        params.sort();

        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_scheme_and_host() {
        let url = normalize_url("http://www.example.com/page").unwrap();
        assert_eq!(url.as_str(), "http://www.example.com/page");
    }

    #[test]
    fn test_keeps_port() {
        let url = normalize_url("http://127.0.0.1:8080/a/").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/a");
    }

    #[test]
    fn test_trailing_slash_and_root() {
        assert_eq!(
            normalize_url("https://example.com/page/").unwrap().as_str(),
            "https://example.com/page"
        );
        assert_eq!(
            normalize_url("https://example.com").unwrap().as_str(),
            "https://example.com/"
        );
    }

    #[test]
    fn test_collapse_segments() {
        let url = normalize_url("https://example.com///a/../b/./c//d").unwrap();
        assert_eq!(url.as_str(), "https://example.com/b/c/d");
    }

    #[test]
    fn test_fragment_removed() {
        let url = normalize_url("https://example.com/page#section").unwrap();
        assert_eq!(url.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_query_filtered_and_sorted() {
        let url = normalize_url(
            "https://example.com/page?keep=yes&utm_medium=email&another=value&fbclid=123",
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://example.com/page?another=value&keep=yes");

        let url = normalize_url("https://example.com/page?utm_source=a&gclid=c").unwrap();
        assert_eq!(url.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_query_values_stay_encoded() {
        let url = normalize_url("https://example.com/search?q=a%26b").unwrap();
        assert_eq!(url.query_pairs().next().unwrap().1, "a&b");
    }

    #[test]
    fn test_invalid_scheme() {
        assert!(matches!(
            normalize_url("ftp://example.com/page"),
            Err(UrlError::InvalidScheme(_))
        ));
        assert!(matches!(
            normalize_url("mailto:someone@example.com"),
            Err(UrlError::InvalidScheme(_))
        ));
    }

    #[test]
    fn test_malformed_url() {
        assert!(matches!(normalize_url("not a url"), Err(UrlError::Parse(_))));
    }

    #[test]
    fn test_resolve_relative_link() {
        let base = Url::parse("https://example.com/docs/intro").unwrap();
        assert_eq!(
            resolve_link(&base, "../about/#team").unwrap().as_str(),
            "https://example.com/about"
        );
        assert_eq!(
            resolve_link(&base, "guide?b=1&a=2").unwrap().as_str(),
            "https://example.com/docs/guide?a=2&b=1"
        );
        assert!(resolve_link(&base, "javascript:void(0)").is_err());
    }
}
