//! Configuration management using the prefer crate.
//!
//! Settings come from three layers, later layers winning:
//! built-in defaults, a config file (TOML or JSON, found by `prefer` or given
//! with `--config`), then `AMBIENTMIX_*` environment variables.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::crawler::CrawlerConfig;
use crate::scrapers::ambient_mixer::{DEFAULT_BASE_URL, DEFAULT_MANIFEST_URL, DEFAULT_START_PATH};
use crate::scrapers::RateLimitConfig;

/// Name used for config discovery and environment prefixes.
pub const APP_NAME: &str = "ambientmix";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "AMBIENTMIX_";

/// Application settings.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    /// Site root the listing path is resolved against.
    pub base_url: String,
    /// Manifest endpoint; the template id is appended as a query.
    pub manifest_url: String,
    /// First listing page, relative to `base_url`.
    pub start_path: String,
    /// User agent override (None = the default WebView agent).
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    pub concurrent_requests: usize,
    pub concurrent_requests_per_domain: usize,
    pub retry_times: u32,
    /// Stop after this many fetched pages (0 = no limit).
    pub max_pages: u64,
    pub autothrottle: bool,
    /// Initial per-domain delay in seconds.
    pub autothrottle_start_delay: f64,
    /// Upper bound for the per-domain delay in seconds.
    pub autothrottle_max_delay: f64,
    /// Requests the throttle aims to keep in flight per domain.
    pub autothrottle_target_concurrency: f64,
    /// Directory holding the resumable crawl state.
    pub job_dir: PathBuf,
    /// Scraped mixes, a JSON array.
    pub output: PathBuf,
    /// Log file, truncated at the start of each run.
    pub log_file: Option<PathBuf>,
    pub download_concurrency: usize,
    /// Per-file download timeout in seconds.
    pub download_timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            manifest_url: DEFAULT_MANIFEST_URL.to_string(),
            start_path: DEFAULT_START_PATH.to_string(),
            user_agent: None,
            request_timeout: 180,
            concurrent_requests: 24,
            concurrent_requests_per_domain: 24,
            retry_times: 2,
            max_pages: 0,
            autothrottle: true,
            autothrottle_start_delay: 0.2,
            autothrottle_max_delay: 30.0,
            autothrottle_target_concurrency: 24.0,
            job_dir: PathBuf::from("persistency"),
            output: PathBuf::from("mixes.json"),
            log_file: Some(PathBuf::from("ambient_mixer_scraper.log")),
            download_concurrency: 10,
            download_timeout: 10,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout)
    }

    /// Per-domain throttle built from the autothrottle settings.
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        let start = secs(self.autothrottle_start_delay);
        RateLimitConfig {
            autothrottle: self.autothrottle,
            start_delay: start,
            min_delay: if self.autothrottle { Duration::ZERO } else { start },
            max_delay: secs(self.autothrottle_max_delay).max(start),
            target_concurrency: self.autothrottle_target_concurrency.max(1.0),
            max_concurrency: self.concurrent_requests_per_domain.max(1),
            ..RateLimitConfig::default()
        }
    }

    pub fn crawler_config(&self) -> CrawlerConfig {
        CrawlerConfig {
            concurrent_requests: self.concurrent_requests.max(1),
            retry_times: self.retry_times,
            max_pages: self.max_pages,
        }
    }

    /// Apply `AMBIENTMIX_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(format!("{}{}", ENV_PREFIX, name)).ok());
    }

    /// Apply overrides from `lookup`, which maps an unprefixed variable name
    /// (e.g. `OUTPUT`) to its value. Unparseable values are ignored with a
    /// warning.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let text = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = text("BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = text("MANIFEST_URL") {
            self.manifest_url = v;
        }
        if let Some(v) = text("START_PATH") {
            self.start_path = v;
        }
        if let Some(v) = text("USER_AGENT") {
            self.user_agent = Some(v);
        }
        if let Some(v) = text("JOB_DIR") {
            self.job_dir = PathBuf::from(v);
        }
        if let Some(v) = text("OUTPUT") {
            self.output = PathBuf::from(v);
        }
        if let Some(v) = text("LOG_FILE") {
            self.log_file = Some(PathBuf::from(v));
        }
        override_parsed(&mut self.request_timeout, "REQUEST_TIMEOUT", text("REQUEST_TIMEOUT"));
        override_parsed(
            &mut self.concurrent_requests,
            "CONCURRENT_REQUESTS",
            text("CONCURRENT_REQUESTS"),
        );
        override_parsed(
            &mut self.concurrent_requests_per_domain,
            "CONCURRENT_REQUESTS_PER_DOMAIN",
            text("CONCURRENT_REQUESTS_PER_DOMAIN"),
        );
        override_parsed(&mut self.retry_times, "RETRY_TIMES", text("RETRY_TIMES"));
        override_parsed(&mut self.max_pages, "MAX_PAGES", text("MAX_PAGES"));
        override_parsed(&mut self.autothrottle, "AUTOTHROTTLE", text("AUTOTHROTTLE"));
        override_parsed(
            &mut self.download_concurrency,
            "DOWNLOAD_CONCURRENCY",
            text("DOWNLOAD_CONCURRENCY"),
        );
        override_parsed(
            &mut self.download_timeout,
            "DOWNLOAD_TIMEOUT",
            text("DOWNLOAD_TIMEOUT"),
        );
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

fn override_parsed<T: FromStr>(target: &mut T, name: &str, value: Option<String>) {
    let Some(raw) = value else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => *target = v,
        Err(_) => warn!("Ignoring {}{}={:?}: not a valid value", ENV_PREFIX, name, raw),
    }
}

/// Configuration file contents. Every field is optional; unset fields keep
/// their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrent_requests: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrent_requests_per_domain: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_times: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autothrottle: Option<AutothrottleConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download: Option<DownloadSection>,
    /// Path of the file this config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

/// `[autothrottle]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutothrottleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_delay: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_concurrency: Option<f64>,
}

/// `[download]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Config {
    /// Load configuration from a discovered config file.
    ///
    /// No config file is not an error; an unreadable or invalid one is.
    pub async fn load() -> Result<Self, String> {
        // Use prefer for file discovery, then parse with serde
        match prefer::load(APP_NAME).await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => Self::load_from_path(path).await,
                None => Ok(Self::default()),
            },
            Err(_) => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file path.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Directory containing the config file.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path relative to `base_dir`, expanding `~`.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply this config's values over `settings`.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref url) = self.base_url {
            settings.base_url = url.clone();
        }
        if let Some(ref url) = self.manifest_url {
            settings.manifest_url = url.clone();
        }
        if let Some(ref path) = self.start_path {
            settings.start_path = path.clone();
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(n) = self.concurrent_requests {
            settings.concurrent_requests = n;
        }
        if let Some(n) = self.concurrent_requests_per_domain {
            settings.concurrent_requests_per_domain = n;
        }
        if let Some(n) = self.retry_times {
            settings.retry_times = n;
        }
        if let Some(n) = self.max_pages {
            settings.max_pages = n;
        }
        if let Some(ref throttle) = self.autothrottle {
            if let Some(enabled) = throttle.enabled {
                settings.autothrottle = enabled;
            }
            if let Some(delay) = throttle.start_delay {
                settings.autothrottle_start_delay = delay;
            }
            if let Some(delay) = throttle.max_delay {
                settings.autothrottle_max_delay = delay;
            }
            if let Some(target) = throttle.target_concurrency {
                settings.autothrottle_target_concurrency = target;
            }
        }
        if let Some(ref dir) = self.job_dir {
            settings.job_dir = self.resolve_path(dir, base_dir);
        }
        if let Some(ref output) = self.output {
            settings.output = self.resolve_path(output, base_dir);
        }
        if let Some(ref log_file) = self.log_file {
            settings.log_file = if log_file.is_empty() {
                None
            } else {
                Some(self.resolve_path(log_file, base_dir))
            };
        }
        if let Some(ref download) = self.download {
            if let Some(n) = download.concurrency {
                settings.download_concurrency = n;
            }
            if let Some(timeout) = download.timeout {
                settings.download_timeout = timeout;
            }
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (--config flag).
    pub config_path: Option<PathBuf>,
    /// Resolve relative paths from CWD instead of the config file location.
    pub use_cwd: bool,
}

/// Load settings with explicit options.
pub async fn load_settings_with_options(options: LoadOptions) -> anyhow::Result<(Settings, Config)> {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await,
        None => Config::load().await,
    }
    .map_err(anyhow::Error::msg)?;

    let mut settings = Settings::default();

    // Determine base directory for resolving relative paths
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let base_dir = if options.use_cwd {
        cwd
    } else {
        config.base_dir().unwrap_or(cwd)
    };

    config.apply_to_settings(&mut settings, &base_dir);
    settings.apply_env_overrides();

    Ok((settings, config))
}
