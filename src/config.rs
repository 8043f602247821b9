//! Pipeline configuration module.
//!
//! Handles loading, validating, and merging the `pixlift.toml` file found at
//! the source root. User values are merged over stock defaults at the TOML
//! table level, so config files are sparse: override just the keys you want.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [upload]
//! endpoint = "https://api.pixelhost.io/v1/media/images"
//! timeout_secs = 30            # Per-request HTTP timeout
//!
//! [retry]
//! max_attempts = 3             # Attempts per analyze/optimize/upload call
//! base_delay_ms = 5000         # First wait; doubles on each further retry
//!
//! [discovery]
//! extensions = ["jpg", "jpeg", "png", "webp", "tif", "tiff"]
//! exclude_dirs = []            # Directory names skipped during the walk
//!
//! [[profiles]]                 # Declaring any profile replaces the stock set
//! name = "small"
//! max_width = 640
//! quality = 70
//! suffix = "-small"
//! ```
//!
//! Scalar values and tables merge key-by-key; arrays replace wholesale, so a
//! config that declares one `[[profiles]]` entry gets exactly that one
//! profile, not the stock three plus one.
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryPolicy;

/// Name of the config file looked up in the source root.
pub const CONFIG_FILE_NAME: &str = "pixlift.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Pipeline configuration loaded from `pixlift.toml`.
///
/// All fields have sensible defaults. A user config file need only specify
/// the values it wants to override. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Media host endpoint and HTTP settings.
    pub upload: UploadConfig,
    /// Retry budget applied to every analyze/optimize/upload call.
    pub retry: RetryConfig,
    /// Which files the source walk picks up.
    pub discovery: DiscoveryConfig,
    /// Optimization profiles, processed in declaration order.
    pub profiles: Vec<Profile>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            upload: UploadConfig::default(),
            retry: RetryConfig::default(),
            discovery: DiscoveryConfig::default(),
            profiles: stock_profiles(),
        }
    }
}

impl PipelineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upload.endpoint.is_empty() {
            return Err(ConfigError::Validation(
                "upload.endpoint must not be empty".into(),
            ));
        }
        if !self.upload.endpoint.starts_with("http://")
            && !self.upload.endpoint.starts_with("https://")
        {
            return Err(ConfigError::Validation(format!(
                "upload.endpoint must be an http(s) URL, got {:?}",
                self.upload.endpoint
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.discovery.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "discovery.extensions must not be empty".into(),
            ));
        }
        for ext in &self.discovery.extensions {
            // The walk compares lowercased file extensions, so an entry like
            // ".JPG" would silently never match. Reject it up front.
            if ext.is_empty()
                || ext.starts_with('.')
                || ext.chars().any(|c| c.is_ascii_uppercase())
            {
                return Err(ConfigError::Validation(format!(
                    "discovery.extensions entries must be lowercase without a leading dot, got {ext:?}"
                )));
            }
        }
        if self.profiles.is_empty() {
            return Err(ConfigError::Validation(
                "at least one [[profiles]] entry is required".into(),
            ));
        }
        let mut names = HashSet::new();
        let mut suffixes = HashSet::new();
        for profile in &self.profiles {
            if profile.name.is_empty() {
                return Err(ConfigError::Validation(
                    "profile name must not be empty".into(),
                ));
            }
            if !profile.suffix.starts_with('-') {
                return Err(ConfigError::Validation(format!(
                    "profile {:?}: suffix must start with '-', got {:?}",
                    profile.name, profile.suffix
                )));
            }
            if profile.max_width == 0 {
                return Err(ConfigError::Validation(format!(
                    "profile {:?}: max_width must be at least 1",
                    profile.name
                )));
            }
            if profile.quality == 0 || profile.quality > 100 {
                return Err(ConfigError::Validation(format!(
                    "profile {:?}: quality must be 1-100",
                    profile.name
                )));
            }
            if !names.insert(profile.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate profile name {:?}",
                    profile.name
                )));
            }
            if !suffixes.insert(profile.suffix.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate profile suffix {:?}",
                    profile.suffix
                )));
            }
        }
        Ok(())
    }
}

/// Media host endpoint and HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    /// URL the pipeline POSTs optimized variants to.
    pub endpoint: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.pixelhost.io/v1/media/images".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Retry budget applied to every analyze/optimize/upload call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts per operation (1 = no retries).
    pub max_attempts: u32,
    /// Wait before the first retry; doubles on each further one.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 5000,
        }
    }
}

/// Build the runtime retry policy from config.
pub fn retry_policy(config: &RetryConfig) -> RetryPolicy {
    RetryPolicy::new(
        config.max_attempts,
        Duration::from_millis(config.base_delay_ms),
    )
}

/// Which files the source walk picks up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Lowercase file extensions (no dots) treated as source images.
    pub extensions: Vec<String>,
    /// Directory names skipped entirely during the walk.
    pub exclude_dirs: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            extensions: ["jpg", "jpeg", "png", "webp", "tif", "tiff"]
                .map(String::from)
                .to_vec(),
            exclude_dirs: Vec::new(),
        }
    }
}

/// One optimization profile: a target width, an encode quality, and the
/// filename suffix its variants carry (`photo.jpg` + `-small` →
/// `photo-small.avif`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    /// Profile name, used in events and as the key in the mapping store.
    pub name: String,
    /// Maximum output width in pixels. Narrower sources are never upscaled.
    pub max_width: u32,
    /// AVIF encode quality (1 = worst, 100 = best).
    pub quality: u32,
    /// Filename suffix appended to the source stem, must start with `-`.
    pub suffix: String,
}

/// The stock small/medium/large profile set.
pub fn stock_profiles() -> Vec<Profile> {
    vec![
        Profile {
            name: "small".to_string(),
            max_width: 640,
            quality: 70,
            suffix: "-small".to_string(),
        },
        Profile {
            name: "medium".to_string(),
            max_width: 1280,
            quality: 75,
            suffix: "-medium".to_string(),
        },
        Profile {
            name: "large".to_string(),
            max_width: 1920,
            quality: 80,
            suffix: "-large".to_string(),
        },
    ]
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(PipelineConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay (including arrays) replace base values
///   entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a `pixlift.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no config file exists in the directory.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = path.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<PipelineConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: PipelineConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `pixlift.toml` in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. A missing file yields the stock defaults.
pub fn load_config(root: &Path) -> Result<PipelineConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `pixlift.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Pixlift Configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Scalars and tables merge over the defaults key-by-key; arrays replace
# them wholesale. In particular, declaring any [[profiles]] entry replaces
# the stock small/medium/large set with exactly the profiles you list.
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Upload
# ---------------------------------------------------------------------------
[upload]
# Media host endpoint that optimized variants are POSTed to.
endpoint = "https://api.pixelhost.io/v1/media/images"

# Per-request HTTP timeout in seconds.
timeout_secs = 30

# ---------------------------------------------------------------------------
# Retry
# ---------------------------------------------------------------------------
[retry]
# Attempts per analyze/optimize/upload call (1 = no retries).
max_attempts = 3

# Wait in milliseconds before the first retry; doubles on each further one.
base_delay_ms = 5000

# ---------------------------------------------------------------------------
# Discovery
# ---------------------------------------------------------------------------
[discovery]
# Lowercase file extensions (no dots) treated as source images.
extensions = ["jpg", "jpeg", "png", "webp", "tif", "tiff"]

# Directory names skipped entirely during the walk. Hidden directories
# (leading dot) are always skipped.
exclude_dirs = []

# ---------------------------------------------------------------------------
# Profiles - processed in declaration order
# ---------------------------------------------------------------------------
[[profiles]]
name = "small"
max_width = 640      # Never upscaled: narrower sources keep their width
quality = 70         # AVIF encode quality (1 = worst, 100 = best)
suffix = "-small"    # photo.jpg -> photo-small.avif

[[profiles]]
name = "medium"
max_width = 1280
quality = 75
suffix = "-medium"

[[profiles]]
name = "large"
max_width = 1920
quality = 80
suffix = "-large"
"##
}
