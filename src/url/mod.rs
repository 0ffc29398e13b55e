//! URL handling module for Trawler
//!
//! This module provides URL canonicalization, reversed-host computation, host
//! containment matching, and the domain-scope admission rule for discovered links.

mod domain;
mod matcher;
mod normalize;

// Re-export main types and functions
pub use domain::reverse_host;
pub use matcher::{host_within, reversed_within};
pub use normalize::{CanonicalUrl, UrlOptions};

/// The set of hosts a crawl may follow links into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    /// Host of the configured base URL (including any explicit port)
    pub base_host: String,

    /// Follow links into subdomains of the base host
    pub follow_subdomain: bool,

    /// Follow links out of the base host entirely
    pub follow_external: bool,
}

impl Scope {
    /// Decides whether a discovered link falls inside this scope
    ///
    /// # Rules
    ///
    /// 1. Only `http` and `https` links are admitted
    /// 2. Without `follow_subdomain`, the host must equal the base host exactly
    /// 3. Without `follow_external`, the host must be the base host or one of its
    ///    subdomains (compared on label boundaries, so `evilexample.com` is not
    ///    inside `example.com`)
    ///
    /// # Examples
    ///
    /// ```
    /// use trawler::url::{CanonicalUrl, Scope, UrlOptions};
    ///
    /// let scope = Scope {
    ///     base_host: "example.com".to_string(),
    ///     follow_subdomain: true,
    ///     follow_external: false,
    /// };
    /// let sub = CanonicalUrl::parse("https://blog.example.com/", None, UrlOptions::default()).unwrap();
    /// let other = CanonicalUrl::parse("https://other.org/", None, UrlOptions::default()).unwrap();
    /// assert!(scope.admits(&sub));
    /// assert!(!scope.admits(&other));
    /// ```
    pub fn admits(&self, url: &CanonicalUrl) -> bool {
        if !url.is_http() {
            return false;
        }

        if !self.follow_subdomain && url.host != self.base_host {
            return false;
        }

        if !self.follow_external && !host_within(&self.base_host, &url.host) {
            return false;
        }

        true
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self {
            base_host: "localhost".to_string(),
            follow_subdomain: false,
            follow_external: false,
        }
    }
}
