use crate::config::types::CrawlOptions;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a crawl options file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML options file
///
/// # Returns
///
/// * `Ok(CrawlOptions)` - Successfully loaded and validated options
/// * `Err(ConfigError)` - Failed to load, parse, or validate the file
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use trawler::config::load_options;
///
/// let options = load_options(Path::new("trawler.toml")).unwrap();
/// println!("URL limit: {:?}", options.url_limit);
/// ```
pub fn load_options(path: &Path) -> Result<CrawlOptions, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let options: CrawlOptions = toml::from_str(&content)?;
    validate(&options)?;
    Ok(options)
}

/// Computes a SHA-256 hash of the options file content
///
/// Logged at startup so two runs can be matched to the exact same file.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads an options file and returns both the options and the file's hash
pub fn load_options_with_hash(path: &Path) -> Result<(CrawlOptions, String), ConfigError> {
    let options = load_options(path)?;
    let hash = compute_config_hash(path)?;
    Ok((options, hash))
}
