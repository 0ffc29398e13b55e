/// Checks if a host is the base host or one of its subdomains
///
/// The comparison respects label boundaries:
/// - "example.com" contains "example.com" and "blog.example.com"
/// - "example.com" does not contain "myexample.com"
///
/// # Examples
///
/// ```
/// use trawler::url::host_within;
///
/// assert!(host_within("example.com", "example.com"));
/// assert!(host_within("example.com", "api.v2.example.com"));
/// assert!(!host_within("example.com", "evilexample.com"));
/// ```
pub fn host_within(base: &str, candidate: &str) -> bool {
    match candidate.strip_suffix(base) {
        Some("") => true,
        Some(rest) => rest.ends_with('.'),
        None => false,
    }
}

/// Same containment test as [`host_within`], on reversed hosts
///
/// `bucket` is a reversed domain, `host` a reversed request host. The host is
/// contained when it equals the bucket or continues it past a `.`.
pub fn reversed_within(bucket: &str, host: &str) -> bool {
    match host.strip_prefix(bucket) {
        Some("") => true,
        Some(rest) => rest.starts_with('.'),
        None => false,
    }
}
