//! Shape of a config snapshot (§3 "Live config snapshot", §4.10).
//!
//! `ConfigFile` is what's deserialized from disk; `ConfigSnapshot` is the
//! immutable, process-wide view handed to every request. The split exists
//! so the file format can gain `#[serde(default)]` fields over time without
//! touching the hot-path type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct KeyConfig {
    pub secret: String,
    #[serde(default)]
    pub rpm: Option<u32>,
    #[serde(default)]
    pub input_tpm: Option<u32>,
    #[serde(default)]
    pub output_tpm: Option<u32>,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKindConfig {
    Anthropic,
    Zai,
    Ollama,
    Cloud,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKindConfig,
    pub base_url: String,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub keys: Vec<KeyConfig>,
    #[serde(default)]
    pub supports_transparent_auth: bool,
    /// Router candidate weighting (§3 "Provider info (router candidate)"),
    /// distinct from the per-key weight/priority in [`KeyConfig`].
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub priority: u32,
    /// Prepended to every outbound model id for `kind = "cloud"` providers,
    /// e.g. a Bedrock cross-region inference prefix like `"us."`. Ignored by
    /// every other provider kind.
    #[serde(default)]
    pub model_prefix: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RoutingConfig {
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default)]
    pub debug: bool,
    /// `prefix -> provider name`, matched longest-prefix-first (§4.4).
    #[serde(default)]
    pub model_prefixes: BTreeMap<String, String>,
    #[serde(default)]
    pub default_provider: String,
    /// `from -> to` model name rewrite (§4.3).
    #[serde(default)]
    pub model_rewrite: BTreeMap<String, String>,
}

fn default_strategy() -> String {
    "round_robin".to_string()
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            debug: false,
            model_prefixes: BTreeMap::new(),
            default_provider: String::new(),
            model_rewrite: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub allow_bearer: bool,
    #[serde(default)]
    pub allow_subscription: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            allow_bearer: false,
            allow_subscription: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_request_timeout_secs() -> u64 {
    600
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
            request_timeout_secs: default_request_timeout_secs(),
            max_concurrency: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    3 * 60 * 60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// Enables the debug/metrics sink (§2 "Debug/metrics sink").
    #[serde(default)]
    pub debug: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            debug: false,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// The immutable, atomically-swapped bundle every request reads (§3, §4.10).
pub type ConfigSnapshot = ConfigFile;
