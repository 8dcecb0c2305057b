use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_tide::url::extract_domain;
///
/// let url = Url::parse("https://Sub.Example.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("sub.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Key identifying one politeness target: host plus explicit port
///
/// Two servers on the same host but different ports are different targets.
pub fn host_key(url: &Url) -> String {
    let host = extract_domain(url).unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    }
}
