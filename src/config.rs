use std::{collections::HashMap, path::PathBuf, time::Duration};

use config::{Config as ConfigLib, ConfigError, Environment, File};
use serde::Deserialize;

use crate::lint::Severity;

/// CCADB report listing every intermediate certificate trusted by Mozilla.
pub const CCADB_INTERMEDIATES_URL: &str =
    "https://ccadb.my.salesforce-sites.com/mozilla/MozillaIntermediateCertsCSVReport";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub feed: FeedConfig,
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub url: String,
}

/// Settings consumed by the fetch, validate and lint pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// PEM bundle (or directory of bundles) with the trusted intermediates.
    pub trust_store_path: PathBuf,
    /// Root of the on-disk CRL cache.
    pub cache_root: PathBuf,
    pub fetch_timeout_secs: u64,
    /// Upper bound on concurrent downloads.
    pub fetch_concurrency: usize,
    /// Largest CRL body accepted, in bytes.
    pub max_crl_size: u64,
    pub lint_severity_threshold: Severity,
    /// TOML rule filter; the built-in filter is used when unset.
    #[serde(default)]
    pub lint_rule_filter: Option<PathBuf>,
}

impl MonitorConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None, None)
    }

    /// Load the configuration from `config_file` (or `config/settings` when
    /// absent) layered over the built-in defaults.
    ///
    /// When `env_vars` is provided it replaces the process environment, which
    /// keeps tests independent of each other.
    pub fn load_with_sources(
        config_file: Option<PathBuf>,
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder()
            .set_default("feed.url", CCADB_INTERMEDIATES_URL)?
            .set_default("monitor.trust_store_path", "intermediates.pem")?
            .set_default("monitor.cache_root", "crls")?
            .set_default("monitor.fetch_timeout_secs", 30)?
            .set_default("monitor.fetch_concurrency", 32)?
            .set_default("monitor.max_crl_size", 256 * 1024 * 1024)?
            .set_default("monitor.lint_severity_threshold", "warn")?;

        builder = match config_file {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name("config/settings").required(false)),
        };

        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // APP_MONITOR__CACHE_ROOT, APP_FEED__URL, ...
            builder = builder.add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        builder.build()?.try_deserialize()
    }
}
