//! Configuration file handling.
//!
//! This module handles loading `.socfeed.toml`, merging CLI overrides,
//! and the [`ConfigGateway`] read interface the aggregation core consumes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = ".socfeed.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Outbound HTTP settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Per-provider connection settings.
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Maximum alerts returned per provider per cycle.
    #[serde(default = "default_limit")]
    pub limit_per_provider: usize,

    /// Seconds between cycles in watch mode.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            limit_per_provider: default_limit(),
            poll_interval_seconds: default_poll_interval(),
        }
    }
}

fn default_limit() -> usize {
    10
}

fn default_poll_interval() -> u64 {
    30
}

/// Outbound HTTP settings shared by all adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout applied by the HTTP client.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Upper bound on a whole adapter fetch (token exchange included).
    #[serde(default = "default_adapter_timeout")]
    pub adapter_timeout_seconds: u64,

    /// Per-feed timeout for news feeds.
    #[serde(default = "default_feed_timeout")]
    pub feed_timeout_seconds: u64,

    /// User-Agent header sent to providers.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout(),
            adapter_timeout_seconds: default_adapter_timeout(),
            feed_timeout_seconds: default_feed_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_adapter_timeout() -> u64 {
    45
}

fn default_feed_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("socfeed/{}", env!("CARGO_PKG_VERSION"))
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_seconds)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_seconds)
    }
}

/// All provider sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub elastic: ElasticConfig,
    #[serde(default)]
    pub defender: DefenderConfig,
    #[serde(default)]
    pub opencti: OpenCtiConfig,
    #[serde(default)]
    pub tenable: TenableConfig,
    #[serde(default)]
    pub rss: RssConfig,
}

impl ProvidersConfig {
    /// Snapshot of the sections currently marked enabled.
    pub fn active(&self) -> ActiveConfig {
        ActiveConfig {
            elastic: self.elastic.enabled.then(|| self.elastic.clone()),
            defender: self.defender.enabled.then(|| self.defender.clone()),
            opencti: self.opencti.enabled.then(|| self.opencti.clone()),
            tenable: self.tenable.enabled.then(|| self.tenable.clone()),
            rss: self.rss.enabled.then(|| self.rss.clone()),
        }
    }
}

/// Lookup of named credential fields, used by the eligibility table.
pub trait FieldLookup {
    /// True when the named field is present and non-blank.
    fn has_field(&self, name: &str) -> bool;
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// SIEM (Elasticsearch) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Cluster endpoint, e.g. `https://es.internal:9200`.
    #[serde(default)]
    pub url: Option<String>,
    /// Index pattern to search.
    #[serde(default = "default_elastic_index")]
    pub index: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Date-math lower bound for `@timestamp`.
    #[serde(default = "default_elastic_lookback")]
    pub lookback: String,
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            index: default_elastic_index(),
            api_key: None,
            username: None,
            password: None,
            lookback: default_elastic_lookback(),
        }
    }
}

fn default_elastic_index() -> String {
    "logs-*".to_string()
}

fn default_elastic_lookback() -> String {
    "now-7d".to_string()
}

impl FieldLookup for ElasticConfig {
    fn has_field(&self, name: &str) -> bool {
        match name {
            "url" => present(&self.url),
            "api_key" => present(&self.api_key),
            "username" => present(&self.username),
            "password" => present(&self.password),
            _ => false,
        }
    }
}

/// EDR (Microsoft Defender) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefenderConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_defender_api_url")]
    pub api_url: String,
    #[serde(default = "default_defender_login_url")]
    pub login_url: String,
    /// Only alerts created within this many days are requested.
    #[serde(default = "default_defender_lookback_days")]
    pub lookback_days: i64,
}

impl Default for DefenderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tenant_id: None,
            client_id: None,
            client_secret: None,
            api_url: default_defender_api_url(),
            login_url: default_defender_login_url(),
            lookback_days: default_defender_lookback_days(),
        }
    }
}

fn default_defender_api_url() -> String {
    "https://api.securitycenter.microsoft.com/api".to_string()
}

fn default_defender_login_url() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_defender_lookback_days() -> i64 {
    7
}

impl FieldLookup for DefenderConfig {
    fn has_field(&self, name: &str) -> bool {
        match name {
            "tenant_id" => present(&self.tenant_id),
            "client_id" => present(&self.client_id),
            "client_secret" => present(&self.client_secret),
            _ => false,
        }
    }
}

/// Threat-intel (OpenCTI) connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenCtiConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Legacy name for `api_key`.
    #[serde(default)]
    pub token: Option<String>,
}

impl OpenCtiConfig {
    /// The bearer credential, preferring `api_key` over the legacy `token`.
    pub fn credential(&self) -> Option<&str> {
        [&self.api_key, &self.token]
            .into_iter()
            .find(|v| present(v))
            .and_then(|v| v.as_deref())
    }
}

impl FieldLookup for OpenCtiConfig {
    fn has_field(&self, name: &str) -> bool {
        match name {
            "url" => present(&self.url),
            "api_key" => present(&self.api_key),
            "token" => present(&self.token),
            _ => false,
        }
    }
}

/// Vulnerability scanner (Tenable) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenableConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default = "default_tenable_base_url")]
    pub base_url: String,
}

impl Default for TenableConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            access_key: None,
            secret_key: None,
            base_url: default_tenable_base_url(),
        }
    }
}

fn default_tenable_base_url() -> String {
    "https://cloud.tenable.com".to_string()
}

impl FieldLookup for TenableConfig {
    fn has_field(&self, name: &str) -> bool {
        match name {
            "access_key" => present(&self.access_key),
            "secret_key" => present(&self.secret_key),
            _ => false,
        }
    }
}

/// News feed settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RssConfig {
    #[serde(default)]
    pub enabled: bool,
    /// RSS or Atom feed URLs.
    #[serde(default)]
    pub feeds: Vec<String>,
}

impl RssConfig {
    /// Feed URLs with blanks removed.
    pub fn feed_urls(&self) -> impl Iterator<Item = &str> {
        self.feeds.iter().map(|f| f.trim()).filter(|f| !f.is_empty())
    }
}

impl FieldLookup for RssConfig {
    fn has_field(&self, name: &str) -> bool {
        match name {
            "feeds" => self.feed_urls().next().is_some(),
            _ => false,
        }
    }
}

/// Provider configuration active for one aggregation cycle.
///
/// A `None` slot means the category is absent or disabled.
#[derive(Debug, Clone, Default)]
pub struct ActiveConfig {
    pub elastic: Option<ElasticConfig>,
    pub defender: Option<DefenderConfig>,
    pub opencti: Option<OpenCtiConfig>,
    pub tenable: Option<TenableConfig>,
    pub rss: Option<RssConfig>,
}

/// Read interface to the source of provider configuration.
///
/// Called once per aggregation cycle; implementations must return a
/// consistent snapshot.
#[async_trait]
pub trait ConfigGateway: Send + Sync {
    /// Currently active per-provider configuration.
    async fn active_config(&self) -> Result<ActiveConfig>;
}

/// Gateway backed by a TOML file, re-read on every call.
#[derive(Debug, Clone)]
pub struct FileConfigGateway {
    path: PathBuf,
}

impl FileConfigGateway {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigGateway for FileConfigGateway {
    async fn active_config(&self) -> Result<ActiveConfig> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read config file: {}", self.path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", self.path.display()))?;

        Ok(config.providers.active())
    }
}

/// Gateway holding a fixed in-memory snapshot.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct StaticConfigGateway {
    config: ActiveConfig,
}

#[cfg(test)]
impl StaticConfigGateway {
    pub fn new(config: ActiveConfig) -> Self {
        Self { config }
    }
}

#[cfg(test)]
#[async_trait]
impl ConfigGateway for StaticConfigGateway {
    async fn active_config(&self) -> Result<ActiveConfig> {
        Ok(self.config.clone())
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings when given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(limit) = args.limit {
            self.general.limit_per_provider = limit;
        }
        if let Some(interval) = args.interval {
            self.general.poll_interval_seconds = interval;
        }
        if let Some(timeout) = args.adapter_timeout {
            self.http.adapter_timeout_seconds = timeout;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
