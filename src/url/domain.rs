/// Reverses a host string character by character
///
/// Reversed hosts turn domain containment into a prefix test: every subdomain of
/// `example.com` reverses to a string starting with `moc.elpmaxe`.
///
/// # Examples
///
/// ```
/// use trawler::url::reverse_host;
///
/// assert_eq!(reverse_host("example.com"), "moc.elpmaxe");
/// assert_eq!(reverse_host("a.example.com"), "moc.elpmaxe.a");
/// ```
pub fn reverse_host(host: &str) -> String {
    host.chars().rev().collect()
}
