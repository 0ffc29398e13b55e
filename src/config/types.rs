use crate::url::{Scope, UrlOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default number of distinct URLs a crawl may discover
pub const DEFAULT_URL_LIMIT: usize = 1000;

/// Default admission rate (requests started per second)
pub const DEFAULT_MAX_PER_SECOND: u32 = 50;

/// Default number of requests allowed in flight at once
pub const DEFAULT_CONCURRENT: usize = 50;

/// Default request timeout in milliseconds
pub const DEFAULT_REQUEST_WAIT_MS: u64 = 30_000;

/// A partial set of crawl options
///
/// Every field is optional: absent fields leave the current configuration
/// untouched. This is both the TOML file format and the argument to
/// `Crawler::configure`.
///
/// # Example
///
/// ```toml
/// base-url = "https://example.com/"
/// url-limit = 200
/// request-maxpersecond = 10
/// follow-subdomain = true
///
/// [headers]
/// Accept-Language = "en"
///
/// [[cookies]]
/// name = "session"
/// value = "abc"
/// domain = "example.com"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CrawlOptions {
    /// Maximum distinct URLs discovered per session (0 = unlimited)
    pub url_limit: Option<usize>,

    /// Admission ticks per second
    pub request_maxpersecond: Option<u32>,

    /// Maximum requests in flight
    pub request_concurrent: Option<usize>,

    /// Per-request timeout (milliseconds)
    pub request_wait: Option<u64>,

    /// Running-time budget (milliseconds, 0 = unlimited)
    pub duration: Option<u64>,

    pub follow_external: Option<bool>,
    pub follow_subdomain: Option<bool>,
    pub auto_queue: Option<bool>,
    pub log_stats: Option<bool>,
    pub case_sensitive: Option<bool>,
    pub query_strings: Option<bool>,

    /// Extra request headers sent with every fetch
    pub headers: Option<BTreeMap<String, String>>,

    /// Cookies loaded into the cookie store before the first request
    pub cookies: Option<Vec<SeedCookie>>,

    /// Seed URL; also sets the scope host
    pub base_url: Option<String>,

    /// Name of a registered link extraction strategy
    pub parser_method: Option<String>,

    /// Number of parse worker threads (0 = parse in-process)
    pub parser_threads: Option<usize>,
}

impl CrawlOptions {
    /// Merges `other` on top of `self`; fields set in `other` win
    pub fn overlay(self, other: CrawlOptions) -> CrawlOptions {
        CrawlOptions {
            url_limit: other.url_limit.or(self.url_limit),
            request_maxpersecond: other.request_maxpersecond.or(self.request_maxpersecond),
            request_concurrent: other.request_concurrent.or(self.request_concurrent),
            request_wait: other.request_wait.or(self.request_wait),
            duration: other.duration.or(self.duration),
            follow_external: other.follow_external.or(self.follow_external),
            follow_subdomain: other.follow_subdomain.or(self.follow_subdomain),
            auto_queue: other.auto_queue.or(self.auto_queue),
            log_stats: other.log_stats.or(self.log_stats),
            case_sensitive: other.case_sensitive.or(self.case_sensitive),
            query_strings: other.query_strings.or(self.query_strings),
            headers: other.headers.or(self.headers),
            cookies: other.cookies.or(self.cookies),
            base_url: other.base_url.or(self.base_url),
            parser_method: other.parser_method.or(self.parser_method),
            parser_threads: other.parser_threads.or(self.parser_threads),
        }
    }
}

/// A cookie supplied through configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SeedCookie {
    pub name: String,

    #[serde(default)]
    pub value: String,

    /// Domain the cookie is sent to (including its subdomains)
    pub domain: String,

    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub secure: bool,
}

/// Fully resolved crawl configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlConfig {
    pub url_limit: usize,
    pub request_maxpersecond: u32,
    pub request_concurrent: usize,
    pub request_wait: Duration,

    /// Running-time budget, `Duration::ZERO` for unlimited
    pub duration: Duration,

    pub follow_external: bool,
    pub follow_subdomain: bool,
    pub auto_queue: bool,
    pub log_stats: bool,
    pub case_sensitive: bool,
    pub query_strings: bool,
    pub headers: BTreeMap<String, String>,
    pub cookies: Vec<SeedCookie>,

    /// Scope host, taken from the base URL
    pub host: String,

    pub base_url: Option<String>,
    pub parser_method: String,
    pub parser_threads: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            url_limit: DEFAULT_URL_LIMIT,
            request_maxpersecond: DEFAULT_MAX_PER_SECOND,
            request_concurrent: DEFAULT_CONCURRENT,
            request_wait: Duration::from_millis(DEFAULT_REQUEST_WAIT_MS),
            duration: Duration::ZERO,
            follow_external: false,
            follow_subdomain: false,
            auto_queue: true,
            log_stats: true,
            case_sensitive: false,
            query_strings: false,
            headers: BTreeMap::new(),
            cookies: Vec::new(),
            host: "localhost".to_string(),
            base_url: None,
            parser_method: "regex".to_string(),
            parser_threads: 0,
        }
    }
}

impl CrawlConfig {
    /// Copies every set field of `options` into this configuration
    ///
    /// Options are expected to be validated already. `host` is left to the caller,
    /// which canonicalizes `base_url` first.
    pub fn apply(&mut self, options: &CrawlOptions) {
        macro_rules! copy_set {
            ($($field:ident),*) => {
                $(if let Some(value) = &options.$field {
                    self.$field = value.clone();
                })*
            };
        }

        copy_set!(
            url_limit,
            request_maxpersecond,
            request_concurrent,
            follow_external,
            follow_subdomain,
            auto_queue,
            log_stats,
            case_sensitive,
            query_strings,
            headers,
            cookies,
            parser_method,
            parser_threads
        );

        if let Some(wait) = options.request_wait {
            self.request_wait = Duration::from_millis(wait);
        }
        if let Some(duration) = options.duration {
            self.duration = Duration::from_millis(duration);
        }
        if options.base_url.is_some() {
            self.base_url = options.base_url.clone();
        }
    }

    /// Canonicalization settings derived from this configuration
    pub fn url_options(&self) -> UrlOptions {
        UrlOptions {
            case_sensitive: self.case_sensitive,
            query_strings: self.query_strings,
        }
    }

    /// Link admission scope derived from this configuration
    pub fn scope(&self) -> Scope {
        Scope {
            base_host: self.host.clone(),
            follow_subdomain: self.follow_subdomain,
            follow_external: self.follow_external,
        }
    }

    /// Whether the discovered-URL limit is in force
    pub fn has_url_limit(&self) -> bool {
        self.url_limit > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CrawlConfig::default();
        assert_eq!(config.url_limit, 1000);
        assert_eq!(config.request_maxpersecond, 50);
        assert_eq!(config.request_concurrent, 50);
        assert_eq!(config.request_wait, Duration::from_secs(30));
        assert_eq!(config.duration, Duration::ZERO);
        assert!(config.auto_queue);
        assert!(config.log_stats);
        assert!(!config.follow_external);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.parser_threads, 0);
    }

    #[test]
    fn test_apply_only_touches_set_fields() {
        let mut config = CrawlConfig::default();
        config.apply(&CrawlOptions {
            request_concurrent: Some(4),
            request_wait: Some(500),
            ..CrawlOptions::default()
        });

        assert_eq!(config.request_concurrent, 4);
        assert_eq!(config.request_wait, Duration::from_millis(500));
        assert_eq!(config.request_maxpersecond, 50);
        assert_eq!(config.url_limit, 1000);
    }

    #[test]
    fn test_overlay_prefers_other() {
        let file = CrawlOptions {
            url_limit: Some(10),
            request_maxpersecond: Some(5),
            ..CrawlOptions::default()
        };
        let cli = CrawlOptions {
            url_limit: Some(20),
            ..CrawlOptions::default()
        };

        let merged = file.overlay(cli);
        assert_eq!(merged.url_limit, Some(20));
        assert_eq!(merged.request_maxpersecond, Some(5));
    }

    #[test]
    fn test_deserialize_kebab_case() {
        let options: CrawlOptions = toml::from_str(
            r#"
url-limit = 5
request-maxpersecond = 2
follow-subdomain = true
parser-method = "html"

[[cookies]]
name = "a"
value = "1"
domain = "example.com"
"#,
        )
        .unwrap();

        assert_eq!(options.url_limit, Some(5));
        assert_eq!(options.request_maxpersecond, Some(2));
        assert_eq!(options.follow_subdomain, Some(true));
        assert_eq!(options.parser_method.as_deref(), Some("html"));
        assert_eq!(options.cookies.unwrap()[0].domain, "example.com");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<CrawlOptions, _> = toml::from_str("max-depth = 3");
        assert!(result.is_err());
    }

    #[test]
    fn test_scope_and_url_options() {
        let mut config = CrawlConfig::default();
        config.host = "example.com".to_string();
        config.follow_subdomain = true;
        config.query_strings = true;

        let scope = config.scope();
        assert_eq!(scope.base_host, "example.com");
        assert!(scope.follow_subdomain);
        assert!(config.url_options().query_strings);
        assert!(!config.url_options().case_sensitive);
    }
}
