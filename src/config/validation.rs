use crate::config::types::{CrawlOptions, SeedCookie};
use crate::crawler::extractor_by_name;
use crate::ConfigError;
use std::collections::BTreeMap;
use url::Url;

/// Validates a set of crawl options
///
/// Only fields that are present are checked.
pub fn validate(options: &CrawlOptions) -> Result<(), ConfigError> {
    validate_limits(options)?;

    if let Some(base_url) = &options.base_url {
        validate_base_url(base_url)?;
    }
    if let Some(headers) = &options.headers {
        validate_headers(headers)?;
    }
    if let Some(cookies) = &options.cookies {
        validate_seed_cookies(cookies)?;
    }
    if let Some(method) = &options.parser_method {
        if extractor_by_name(method).is_none() {
            return Err(ConfigError::UnknownParser(method.clone()));
        }
    }

    Ok(())
}

/// Validates the rate and timeout settings
fn validate_limits(options: &CrawlOptions) -> Result<(), ConfigError> {
    if let Some(rate) = options.request_maxpersecond {
        if !(1..=1000).contains(&rate) {
            return Err(ConfigError::Validation(format!(
                "request-maxpersecond must be between 1 and 1000, got {}",
                rate
            )));
        }
    }

    if let Some(wait) = options.request_wait {
        if wait < 1 {
            return Err(ConfigError::Validation(format!(
                "request-wait must be >= 1ms, got {}ms",
                wait
            )));
        }
    }

    Ok(())
}

/// Validates the seed URL
fn validate_base_url(base_url: &str) -> Result<(), ConfigError> {
    let url = Url::parse(base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url '{}': {}", base_url, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            base_url
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' has no host",
            base_url
        )));
    }

    Ok(())
}

/// Validates custom header names
fn validate_headers(headers: &BTreeMap<String, String>) -> Result<(), ConfigError> {
    for name in headers.keys() {
        if name.is_empty() {
            return Err(ConfigError::Validation(
                "Header names cannot be empty".to_string(),
            ));
        }

        // RFC 7230 token characters
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c))
        {
            return Err(ConfigError::Validation(format!(
                "Header name '{}' contains invalid characters",
                name
            )));
        }
    }

    Ok(())
}

/// Validates configured cookies
fn validate_seed_cookies(cookies: &[SeedCookie]) -> Result<(), ConfigError> {
    for cookie in cookies {
        if cookie.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Seed cookie name cannot be empty".to_string(),
            ));
        }
        validate_cookie_domain(&cookie.domain)?;
    }
    Ok(())
}

/// Validates a cookie domain (a leading dot is allowed)
fn validate_cookie_domain(domain: &str) -> Result<(), ConfigError> {
    let domain = domain.strip_prefix('.').unwrap_or(domain);

    if domain.is_empty() {
        return Err(ConfigError::Validation(
            "Seed cookie domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "Cookie domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.ends_with('.') || domain.contains("..") {
        return Err(ConfigError::Validation(format!(
            "Cookie domain '{}' has an empty label",
            domain
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(name: &str, domain: &str) -> SeedCookie {
        SeedCookie {
            name: name.to_string(),
            value: "v".to_string(),
            domain: domain.to_string(),
            path: None,
            secure: false,
        }
    }

    #[test]
    fn test_empty_options_are_valid() {
        assert!(validate(&CrawlOptions::default()).is_ok());
    }

    #[test]
    fn test_rate_bounds() {
        let mut options = CrawlOptions::default();

        options.request_maxpersecond = Some(0);
        assert!(matches!(validate(&options), Err(ConfigError::Validation(_))));

        options.request_maxpersecond = Some(1001);
        assert!(validate(&options).is_err());

        options.request_maxpersecond = Some(1000);
        assert!(validate(&options).is_ok());
    }

    #[test]
    fn test_request_wait_must_be_positive() {
        let options = CrawlOptions {
            request_wait: Some(0),
            ..CrawlOptions::default()
        };
        assert!(validate(&options).is_err());
    }

    #[test]
    fn test_validate_base_url() {
        assert!(validate_base_url("https://example.com/").is_ok());
        assert!(validate_base_url("http://127.0.0.1:8080").is_ok());

        assert!(matches!(
            validate_base_url("ftp://example.com/"),
            Err(ConfigError::InvalidUrl(_))
        ));
        assert!(validate_base_url("not a url").is_err());
    }

    #[test]
    fn test_validate_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("X-Trace-Id".to_string(), "1".to_string());
        assert!(validate_headers(&headers).is_ok());

        headers.insert("Bad Header".to_string(), "1".to_string());
        assert!(validate_headers(&headers).is_err());
    }

    #[test]
    fn test_validate_seed_cookies() {
        assert!(validate_seed_cookies(&[seed("a", "example.com")]).is_ok());
        assert!(validate_seed_cookies(&[seed("a", ".example.com")]).is_ok());
        assert!(validate_seed_cookies(&[seed("a", "localhost")]).is_ok());

        assert!(validate_seed_cookies(&[seed("", "example.com")]).is_err());
        assert!(validate_seed_cookies(&[seed("a", "")]).is_err());
        assert!(validate_seed_cookies(&[seed("a", "exa mple.com")]).is_err());
        assert!(validate_seed_cookies(&[seed("a", "example..com")]).is_err());
    }

    #[test]
    fn test_unknown_parser_method() {
        let options = CrawlOptions {
            parser_method: Some("eval".to_string()),
            ..CrawlOptions::default()
        };
        assert!(matches!(
            validate(&options),
            Err(ConfigError::UnknownParser(name)) if name == "eval"
        ));
    }

    #[test]
    fn test_known_parser_methods() {
        for name in ["regex", "html"] {
            let options = CrawlOptions {
                parser_method: Some(name.to_string()),
                ..CrawlOptions::default()
            };
            assert!(validate(&options).is_ok());
        }
    }
}
