use crate::url::domain::reverse_host;
use serde::Serialize;
use std::fmt;
use url::Url;

/// Knobs that change how a URL is turned into its canonical dedup key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UrlOptions {
    /// Keep the path's original case instead of lower-casing it
    pub case_sensitive: bool,

    /// Append the query string to the canonical path
    pub query_strings: bool,
}

/// A normalized, comparable link target
///
/// `fullpath` (origin + canonical path) is the crawl's unique key: two links with
/// the same `fullpath` are the same page as far as the frontier is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalUrl {
    /// The parsed URL this canonical form was derived from (fragment removed)
    #[serde(skip)]
    url: Url,

    /// `http` or `https`
    pub scheme: String,

    /// Scheme, host and non-default port, e.g. `https://example.com:8443`
    pub origin: String,

    /// Host including any non-default port
    pub host: String,

    /// Canonical path, with the query appended when configured
    pub path: String,

    /// Raw query string without the leading `?`, if any
    pub query: Option<String>,

    /// `origin + path`, the dedup key
    pub fullpath: String,

    /// Hostname (without port) reversed character by character
    pub host_reverse: String,
}

impl CanonicalUrl {
    /// Canonicalizes a raw link, resolving it against an optional referrer
    ///
    /// # Normalization Steps
    ///
    /// 1. Resolve relative and protocol-relative links against the referrer
    /// 2. Reject anything that is not an absolute `http`/`https` URL with a host
    /// 3. Default the path to `/`
    /// 4. Append `?query` to the path when `query_strings` is set
    /// 5. Lower-case the path unless `case_sensitive` is set
    /// 6. `fullpath = origin + path`
    ///
    /// # Examples
    ///
    /// ```
    /// use trawler::url::{CanonicalUrl, UrlOptions};
    ///
    /// let url = CanonicalUrl::parse("http://EX.com/Foo?x=1", None, UrlOptions::default()).unwrap();
    /// assert_eq!(url.fullpath, "http://ex.com/foo");
    /// ```
    pub fn parse(raw: &str, referrer: Option<&CanonicalUrl>, options: UrlOptions) -> Option<Self> {
        let raw = raw.trim();
        let url = match referrer {
            Some(base) => base.url.join(raw).ok()?,
            None => Url::parse(raw).ok()?,
        };
        Self::from_url(url, options)
    }

    /// Canonicalizes an already parsed URL
    pub fn from_url(mut url: Url, options: UrlOptions) -> Option<Self> {
        if url.scheme() != "http" && url.scheme() != "https" {
            return None;
        }

        let hostname = url.host_str()?.to_string();
        url.set_fragment(None);

        let host = match url.port() {
            Some(port) => format!("{}:{}", hostname, port),
            None => hostname.clone(),
        };
        let origin = url.origin().ascii_serialization();
        let query = url
            .query()
            .filter(|q| !q.is_empty())
            .map(|q| q.to_string());

        let mut path = url.path().trim().to_string();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        if options.query_strings {
            if let Some(query) = &query {
                path.push('?');
                path.push_str(query);
            }
        }
        if !options.case_sensitive {
            path = path.to_lowercase();
        }

        let fullpath = format!("{}{}", origin, path);

        Some(Self {
            scheme: url.scheme().to_string(),
            host_reverse: reverse_host(&hostname),
            url,
            origin,
            host,
            path,
            query,
            fullpath,
        })
    }

    /// The URL actually requested for this page: the canonical `fullpath`
    pub fn target(&self) -> Url {
        Url::parse(&self.fullpath).unwrap_or_else(|_| self.url.clone())
    }

    /// Whether the page is served over TLS
    pub fn is_secure(&self) -> bool {
        self.scheme == "https"
    }

    /// Whether the scheme is one the crawler can fetch
    pub fn is_http(&self) -> bool {
        self.scheme == "http" || self.scheme == "https"
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fullpath)
    }
}
