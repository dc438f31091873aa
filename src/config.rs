use bigdecimal::BigDecimal;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ============================================================
// Source (object store) Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Only events from this container are processed.
    #[serde(default)]
    pub container: String,
    /// Root directory of the filesystem object store.
    #[serde(default = "default_source_root")]
    pub root: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            container: String::new(),
            root: default_source_root(),
        }
    }
}

fn default_source_root() -> String {
    "data".to_string()
}

// ============================================================
// Anomaly Store Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_write_retries")]
    pub write_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            table: default_table(),
            max_connections: default_max_connections(),
            write_retries: default_write_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

fn default_table() -> String {
    "anomalies".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_write_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    200
}

// ============================================================
// Model Endpoint Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// Absent endpoint disables model scoring (rule-only decisions).
    pub endpoint: Option<String>,
    #[serde(default = "default_model_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_model_timeout_ms(),
        }
    }
}

fn default_model_timeout_ms() -> u64 {
    2000
}

// ============================================================
// Rules Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct RulesConfig {
    #[serde(default = "default_amount_threshold")]
    pub amount_threshold: BigDecimal,
    #[serde(default = "default_home_country")]
    pub home_country: String,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            amount_threshold: default_amount_threshold(),
            home_country: default_home_country(),
        }
    }
}

fn default_amount_threshold() -> BigDecimal {
    BigDecimal::from(10_000)
}

fn default_home_country() -> String {
    "GB".to_string()
}

// ============================================================
// Pipeline Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,
    /// Records scored in flight per batch. 1 keeps strict input order.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_timeout_secs: default_batch_timeout_secs(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_batch_timeout_secs() -> u64 {
    300
}

fn default_concurrency() -> usize {
    1
}

// ============================================================
// API Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default = "default_api_host")]
    pub host: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_api_port() -> u16 {
    3000
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

// ============================================================
// Logging Config
// ============================================================

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

impl Config {
    /// Load the config file, apply environment overrides, then validate.
    ///
    /// An explicit path must exist. Without one, `config.toml` is read when present and
    /// defaults plus environment are used otherwise.
    pub fn load(explicit_path: Option<&str>) -> eyre::Result<Self> {
        let path = explicit_path.unwrap_or(DEFAULT_CONFIG_PATH);
        let exists = std::path::Path::new(path).exists();
        if explicit_path.is_some() && !exists {
            return Err(eyre::eyre!("Config file '{}' does not exist", path));
        }

        let mut config = if exists {
            let content = std::fs::read_to_string(path)
                .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
            toml::from_str(&content)
                .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?
        } else {
            Config::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(container) = lookup("RAW_BUCKET") {
            self.source.container = container;
        }
        if let Some(table) = lookup("ANOMALIES_TABLE_NAME") {
            self.store.table = table;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.store.url = url;
        }
        if let Some(endpoint) = lookup("MODEL_ENDPOINT") {
            self.model.endpoint = Some(endpoint);
        }
        if self
            .model
            .endpoint
            .as_deref()
            .is_some_and(|e| e.trim().is_empty())
        {
            self.model.endpoint = None;
        }
    }

    pub fn validate(&self) -> eyre::Result<()> {
        if self.source.container.trim().is_empty() {
            return Err(eyre::eyre!(
                "Source container must be configured (source.container or RAW_BUCKET)"
            ));
        }
        if self.store.url.trim().is_empty() {
            return Err(eyre::eyre!(
                "Anomaly store URL must be configured (store.url or DATABASE_URL)"
            ));
        }
        if !is_sql_identifier(&self.store.table) {
            return Err(eyre::eyre!(
                "Invalid anomaly table name '{}' (letters, digits and '_' only)",
                self.store.table
            ));
        }
        if self.model.timeout_ms == 0 {
            return Err(eyre::eyre!("model.timeout_ms must be greater than zero"));
        }
        if self.pipeline.batch_timeout_secs == 0 {
            return Err(eyre::eyre!("pipeline.batch_timeout_secs must be greater than zero"));
        }
        if self.pipeline.concurrency == 0 {
            return Err(eyre::eyre!("pipeline.concurrency must be at least 1"));
        }
        if self.rules.amount_threshold < BigDecimal::from(0) {
            return Err(eyre::eyre!("rules.amount_threshold must not be negative"));
        }
        Ok(())
    }
}

/// Table names are interpolated into SQL, so only plain identifiers are accepted.
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
