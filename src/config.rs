//! Configuration loading for pricegated.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag, must exist)
//! 2. `~/.pricegate/config.toml` (user)
//! 3. `/etc/pricegate/config.toml` (system)
//! 4. built-in defaults
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.pricegate/secrets.toml` (user, must be 0600)
//! 2. `/etc/pricegate/secrets.toml` (system, must be 0600)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::CacheTtls;
use crate::scheduler::SchedulerConfig;
use crate::service::{CMC_META_FILE, COIN_META_FILE, MAPPING_FILE};
use crate::upstream::{RetryConfig, coingecko, coinmarketcap, ecb};
use crate::{PriceGateError, Result};

/// Daemon configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub providers: ProvidersConfig,
    pub retry: RetrySettings,
    pub scheduler: SchedulerSettings,
}

/// Where persisted records live.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for persisted files (default: `<data dir>/pricegate`).
    pub data_dir: PathBuf,
    pub coin_meta_file: String,
    pub cmc_meta_file: String,
    pub mapping_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            coin_meta_file: COIN_META_FILE.to_string(),
            cmc_meta_file: CMC_META_FILE.to_string(),
            mapping_file: MAPPING_FILE.to_string(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("pricegate")
}

/// Cache TTLs, in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub snapshot: u64,
    pub latest: u64,
    pub history: u64,
    pub history_max_range: u64,
    pub fx: u64,
    pub meta_max_age: u64,
    /// Period of the stale-entry sweep.
    pub sweep_interval: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            snapshot: 7200,
            latest: 300,
            history: 86_400,
            history_max_range: 172_800,
            fx: 86_400,
            meta_max_age: 604_800,
            sweep_interval: 600,
        }
    }
}

impl CacheConfig {
    pub fn ttls(&self) -> CacheTtls {
        CacheTtls::new()
            .snapshot(Duration::from_secs(self.snapshot))
            .latest(Duration::from_secs(self.latest))
            .history(Duration::from_secs(self.history))
            .history_max_range(Duration::from_secs(self.history_max_range))
            .fx(Duration::from_secs(self.fx))
            .meta_max_age(Duration::from_secs(self.meta_max_age))
    }
}

/// Upstream provider settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub coingecko: CoinGeckoConfig,
    pub coinmarketcap: CoinMarketCapConfig,
    pub fx: FxConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoinGeckoConfig {
    pub base_url: String,
    /// Listing page size (max 250).
    pub markets_per_page: u32,
    /// Listing pages that make up the metadata catalog.
    pub meta_pages: u32,
    pub timeout_secs: u64,
}

impl Default for CoinGeckoConfig {
    fn default() -> Self {
        Self {
            base_url: coingecko::DEFAULT_BASE_URL.to_string(),
            markets_per_page: coingecko::MAX_PER_PAGE,
            meta_pages: 1,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoinMarketCapConfig {
    pub base_url: String,
    pub listing_limit: u32,
    pub timeout_secs: u64,
}

impl Default for CoinMarketCapConfig {
    fn default() -> Self {
        Self {
            base_url: coinmarketcap::DEFAULT_BASE_URL.to_string(),
            listing_limit: 100,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FxConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            base_url: ecb::DEFAULT_BASE_URL.to_string(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

/// Retry policy shared by every upstream client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 750,
            max_delay_ms: 10_000,
        }
    }
}

impl RetrySettings {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_attempts(self.max_attempts)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .max_delay(Duration::from_millis(self.max_delay_ms))
    }
}

/// Background job periods, in seconds. `0` disables a job.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub snapshot_interval: u64,
    pub latest_interval: u64,
    pub cmc_latest_interval: u64,
    pub fx_interval: u64,
    pub mapping_interval: u64,
    pub prewarm_initial_delay: u64,
    pub prewarm_interval: u64,
    pub prewarm_workers: usize,
    pub prewarm_rate_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            snapshot_interval: 7200,
            latest_interval: 300,
            cmc_latest_interval: 300,
            fx_interval: 86_400,
            mapping_interval: 86_400,
            prewarm_initial_delay: 30,
            prewarm_interval: 86_400,
            prewarm_workers: 5,
            prewarm_rate_ms: 2000,
        }
    }
}

impl SchedulerSettings {
    /// Job configuration; the sweep period comes from the cache section.
    pub fn scheduler_config(&self, cache: &CacheConfig) -> SchedulerConfig {
        SchedulerConfig {
            snapshot_interval: Duration::from_secs(self.snapshot_interval),
            latest_interval: Duration::from_secs(self.latest_interval),
            cmc_latest_interval: Duration::from_secs(self.cmc_latest_interval),
            fx_interval: Duration::from_secs(self.fx_interval),
            mapping_interval: Duration::from_secs(self.mapping_interval),
            sweep_interval: Duration::from_secs(cache.sweep_interval),
            prewarm_initial_delay: Duration::from_secs(self.prewarm_initial_delay),
            prewarm_interval: Duration::from_secs(self.prewarm_interval),
            prewarm_workers: self.prewarm_workers,
            prewarm_rate: Duration::from_millis(self.prewarm_rate_ms),
        }
    }
}

/// Secrets configuration (API keys).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub coinmarketcap: Option<ApiKeySecret>,
    #[serde(default)]
    pub coingecko: Option<ApiKeySecret>,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

/// Provider name → environment variable name mapping.
const PROVIDER_ENV_VARS: &[(&str, &str)] = &[
    ("coinmarketcap", "CMC_API_KEY"),
    ("coingecko", "COINGECKO_API_KEY"),
];

impl Config {
    /// Load configuration from the standard locations, falling back to
    /// defaults when no file exists.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PriceGateError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            PriceGateError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(PriceGateError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".pricegate").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/pricegate/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Returns empty secrets if no file exists (keys may come from env vars).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".pricegate").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from_file(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/pricegate/secrets.toml");
        if system_secrets.exists() {
            return Self::load_from_file(&system_secrets);
        }

        Ok(Secrets::default())
    }

    /// Load a secrets file after checking its permissions.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            PriceGateError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            PriceGateError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            PriceGateError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(PriceGateError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// API key for a provider, falling back to its environment variable.
    pub fn api_key(&self, provider: &str) -> Option<String> {
        let from_file = match provider {
            "coinmarketcap" => self.coinmarketcap.as_ref(),
            "coingecko" => self.coingecko.as_ref(),
            _ => None,
        }
        .map(|s| s.api_key.clone());

        from_file
            .or_else(|| {
                PROVIDER_ENV_VARS
                    .iter()
                    .find(|(name, _)| *name == provider)
                    .and_then(|(_, env_var)| std::env::var(env_var).ok())
            })
            .filter(|key| !key.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.cache.snapshot, 7200);
        assert_eq!(config.cache.meta_max_age, 604_800);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.scheduler.prewarm_workers, 5);
        assert_eq!(config.providers.coingecko.markets_per_page, 250);
        assert_eq!(config.providers.coinmarketcap.listing_limit, 100);
        assert_eq!(config.storage.mapping_file, "cmc_mapping.json");
        assert!(config.scheduler.enabled);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
            [storage]
            data_dir = "/var/lib/pricegate"

            [cache]
            latest = 60

            [providers.coingecko]
            base_url = "http://localhost:8080"
            meta_pages = 2

            [scheduler]
            prewarm_rate_ms = 500
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/pricegate"));
        assert_eq!(config.storage.coin_meta_file, "coins_meta.json");
        assert_eq!(config.cache.latest, 60);
        assert_eq!(config.cache.snapshot, 7200);
        assert_eq!(config.providers.coingecko.base_url, "http://localhost:8080");
        assert_eq!(config.providers.coingecko.meta_pages, 2);
        assert_eq!(config.providers.coingecko.timeout_secs, 10);

        let scheduler = config.scheduler.scheduler_config(&config.cache);
        assert_eq!(scheduler.prewarm_rate, Duration::from_millis(500));
        assert_eq!(scheduler.sweep_interval, Duration::from_secs(600));
    }

    #[test]
    fn cache_section_converts_to_ttls() {
        let ttls = CacheConfig::default().ttls();
        assert_eq!(ttls.history_max_range, Duration::from_secs(172_800));
        assert_eq!(ttls.fx, Duration::from_secs(86_400));
    }

    #[test]
    fn retry_section_converts() {
        let retry = RetrySettings::default().retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_delay, Duration::from_millis(750));
    }

    #[test]
    fn parse_secrets() {
        let toml = r#"
            [coinmarketcap]
            api_key = "cmc-test-key"
        "#;
        let secrets: Secrets = toml::from_str(toml).unwrap();
        assert_eq!(secrets.api_key("coinmarketcap"), Some("cmc-test-key".to_string()));
        assert_eq!(secrets.api_key("nonexistent"), None);
    }

    #[test]
    fn config_not_found_returns_error() {
        let result = Config::load(Some(Path::new("/nonexistent/config.toml")));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Config file not found"));
    }

    #[cfg(unix)]
    #[test]
    fn insecure_secrets_file_is_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        fs::write(&path, "[coinmarketcap]\napi_key = \"k\"\n").unwrap();

        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        assert!(matches!(
            Secrets::load_from_file(&path),
            Err(PriceGateError::Configuration(_))
        ));

        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();
        let secrets = Secrets::load_from_file(&path).unwrap();
        assert_eq!(secrets.api_key("coinmarketcap"), Some("k".to_string()));
    }
}
