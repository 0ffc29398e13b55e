use crate::config::SeedCookie;
use crate::url::{reverse_host, reversed_within, CanonicalUrl};
use serde::Serialize;
use std::collections::BTreeMap;

/// Name prefixes that browsers reserve for cookies set over TLS
const SECURE_PREFIXES: [&str; 2] = ["__secure-", "__host-"];

/// One stored cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,

    /// `Domain` attribute, lower-cased and without a leading dot
    pub domain: Option<String>,

    /// `Path` attribute
    pub path: Option<String>,

    /// `Secure` attribute
    pub secure: bool,

    /// Reversed `domain`, when one was given
    pub host_reverse: Option<String>,
}

impl Cookie {
    /// Parses one `Set-Cookie` header value
    ///
    /// The first `name=value` pair is the cookie itself; the remaining
    /// `;`-separated pairs are attributes. Only `Domain`, `Path` and `Secure` are
    /// kept; expiry and the rest are ignored.
    pub fn parse(header: &str) -> Option<Self> {
        let mut parts = header.split(';');
        let pair = parts.next()?.trim();
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie {
            name: name.to_string(),
            value: value.trim().to_string(),
            domain: None,
            path: None,
            secure: false,
            host_reverse: None,
        };

        for attribute in parts {
            let (key, value) = attribute.split_once('=').unwrap_or((attribute, ""));
            match key.trim().to_ascii_lowercase().as_str() {
                "domain" => {
                    let domain = value.trim().trim_start_matches('.').to_ascii_lowercase();
                    if !domain.is_empty() {
                        cookie.host_reverse = Some(reverse_host(&domain));
                        cookie.domain = Some(domain);
                    }
                }
                "path" => {
                    let path = value.trim();
                    if !path.is_empty() {
                        cookie.path = Some(path.to_string());
                    }
                }
                "secure" => cookie.secure = true,
                _ => {}
            }
        }

        Some(cookie)
    }

    /// Whether the name starts with `__Secure-` or `__Host-` (case-insensitive)
    pub fn has_secure_prefix(&self) -> bool {
        let name = self.name.to_ascii_lowercase();
        SECURE_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
    }

    /// Whether this cookie may cross a connection with the given security
    ///
    /// Over TLS every cookie is admitted. Over plain http a cookie is refused when
    /// it is marked secure, carries a secure prefix, declares a `Domain`, or is
    /// scoped to a non-root `Path`.
    pub fn admissible(&self, secure_connection: bool) -> bool {
        if secure_connection {
            return true;
        }

        if self.secure || self.has_secure_prefix() {
            return false;
        }

        if self.domain.is_some() {
            return false;
        }

        !matches!(self.path.as_deref(), Some(path) if path != "/")
    }
}

/// Session cookie store, bucketed by reversed domain
///
/// A bucket is visible to every request whose host is the bucket's domain or one
/// of its subdomains. Within a bucket cookies are unique by name; setting a cookie
/// again replaces it.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    domains: BTreeMap<String, BTreeMap<String, Cookie>>,
}

impl CookieJar {
    /// Creates an empty jar
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a jar pre-loaded with configured seed cookies
    pub fn with_seeds(seeds: &[SeedCookie]) -> Self {
        let mut jar = Self::new();
        jar.load(seeds);
        jar
    }

    /// Stores configured seed cookies
    ///
    /// Seeds are filed under their configured domain and stored without a
    /// `Domain` attribute, so they are sent over plain http unless marked secure.
    pub fn load(&mut self, seeds: &[SeedCookie]) {
        for seed in seeds {
            let domain = seed.domain.trim_start_matches('.').to_ascii_lowercase();
            let cookie = Cookie {
                name: seed.name.clone(),
                value: seed.value.clone(),
                domain: None,
                path: seed.path.clone(),
                secure: seed.secure,
                host_reverse: None,
            };
            self.insert(reverse_host(&domain), cookie);
        }
    }

    /// Stores the `Set-Cookie` values of a response from `referrer` and returns
    /// how many were kept
    pub fn set(&mut self, referrer: &CanonicalUrl, headers: &[String]) -> usize {
        let secure = referrer.is_secure();
        let mut stored = 0;

        for header in headers {
            let Some(cookie) = Cookie::parse(header) else {
                tracing::trace!("Ignoring unparsable Set-Cookie from {}", referrer);
                continue;
            };

            if !cookie.admissible(secure) {
                tracing::trace!("Rejecting cookie {} from {}", cookie.name, referrer);
                continue;
            }

            let bucket = match &cookie.host_reverse {
                Some(domain) if reversed_within(domain, &referrer.host_reverse) => domain.clone(),
                Some(_) => {
                    tracing::trace!(
                        "Rejecting cookie {} for foreign domain from {}",
                        cookie.name,
                        referrer
                    );
                    continue;
                }
                None => referrer.host_reverse.clone(),
            };

            self.insert(bucket, cookie);
            stored += 1;
        }

        stored
    }

    /// Builds the `Cookie` request header for a request to `referrer`
    ///
    /// Returns an empty string when no cookie applies.
    pub fn get(&self, referrer: &CanonicalUrl) -> String {
        let secure = referrer.is_secure();

        self.domains
            .iter()
            .filter(|(bucket, _)| reversed_within(bucket, &referrer.host_reverse))
            .flat_map(|(_, cookies)| cookies.values())
            .filter(|cookie| cookie.admissible(secure))
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Number of stored cookies across all buckets
    pub fn len(&self) -> usize {
        self.domains.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&mut self, bucket: String, cookie: Cookie) {
        self.domains
            .entry(bucket)
            .or_default()
            .insert(cookie.name.clone(), cookie);
    }
}
