// menu-render-service/src/config.rs

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub pubsub: PubSubConfig,
    pub browser: BrowserConfig,
    pub render: RenderConfig,
    pub assets: AssetConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PubSubConfig {
    pub project_id: String,
    pub request_subscription: String,
    pub response_topic: String,
    pub max_concurrent_messages: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    /// Chrome/Chromium binary; auto-detected when unset.
    #[serde(default)]
    pub executable: Option<String>,
    pub launch_attempts: u32,
    pub launch_timeout_ms: u64,
    pub launch_retry_delay_ms: u64,
    pub health_check_timeout_ms: u64,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub navigation_timeout_ms: u64,
    pub font_timeout_ms: u64,
    pub network_idle_timeout_ms: u64,
    pub export_timeout_ms: u64,
    /// Bound on context/page creation, interception setup, reuse probes and closes.
    pub page_op_timeout_ms: u64,
    pub min_pdf_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetConfig {
    pub root: PathBuf,
    pub origin: String,
    pub blocked_domains: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub enabled: bool,
    pub bucket: String,
}

pub const DEFAULT_BLOCKED_DOMAINS: &[&str] = &[
    "google-analytics.com",
    "googletagmanager.com",
    "doubleclick.net",
    "facebook.com",
    "facebook.net",
    "connect.facebook.net",
    "hotjar.com",
    "segment.io",
    "segment.com",
    "mixpanel.com",
    "clarity.ms",
    "analytics.tiktok.com",
    "twitter.com",
    "platform.twitter.com",
];

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?
            // Load from config file if it exists
            .add_source(File::with_name("config").required(false))
            // Override with environment variables (e.g., SERVICE__BROWSER__EXECUTABLE)
            .add_source(Environment::with_prefix("SERVICE").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Built-in defaults only, no file or environment overrides.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let blocked: Vec<String> = DEFAULT_BLOCKED_DOMAINS
            .iter()
            .map(|domain| domain.to_string())
            .collect();

        ConfigLoader::builder()
            .set_default("service.name", "menu-render-service")?
            .set_default("service.log_level", "info")?
            .set_default("pubsub.project_id", "menu-render")?
            .set_default("pubsub.request_subscription", "menu-render-requests-sub")?
            .set_default("pubsub.response_topic", "menu-render-results")?
            .set_default("pubsub.max_concurrent_messages", "10")?
            .set_default("browser.launch_attempts", "3")?
            .set_default("browser.launch_timeout_ms", "20000")?
            .set_default("browser.launch_retry_delay_ms", "1000")?
            .set_default("browser.health_check_timeout_ms", "2000")?
            .set_default("render.max_attempts", "3")?
            .set_default("render.backoff_base_ms", "500")?
            .set_default("render.backoff_max_ms", "5000")?
            .set_default("render.navigation_timeout_ms", "30000")?
            .set_default("render.font_timeout_ms", "5000")?
            .set_default("render.network_idle_timeout_ms", "3000")?
            .set_default("render.export_timeout_ms", "30000")?
            .set_default("render.page_op_timeout_ms", "10000")?
            .set_default("render.min_pdf_bytes", "1000")?
            .set_default("assets.root", "./public")?
            .set_default("assets.origin", "https://assets.menu-render.local")?
            .set_default("assets.blocked_domains", blocked)?
            .set_default("storage.enabled", "false")?
            .set_default("storage.bucket", "menu-render-pdfs")
    }
}

impl BrowserConfig {
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }

    pub fn launch_retry_delay(&self) -> Duration {
        Duration::from_millis(self.launch_retry_delay_ms)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }
}
