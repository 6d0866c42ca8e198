//! `config.toml` loading and construction of the configured services.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::brochure::{BrochureRenderer, OpenRouterClient, PdfEngine, PdfGenerator, RenderError};
use crate::core::{CatalogStore, ChangeDetector, DataProcessor};
use crate::polling::{Notifier, PollingService};
use crate::sheets::file::CsvDirectorySource;
use crate::sheets::google::GoogleSheetsClient;
use crate::sheets::retry::RetryingSource;
use crate::sheets::{SpreadsheetSource, extract_spreadsheet_id};

pub const GOOGLE_API_KEY_ENV: &str = "GOOGLE_SHEETS_API_KEY";
pub const OPENROUTER_API_KEY_ENV: &str = "OPENROUTER_API_KEY";

#[derive(Debug)]
pub enum ConfigError {
    MissingConfig(PathBuf),
    InvalidConfig(String),
    MissingApiKey(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingConfig(path) => {
                write!(f, "config file {} not found", path.display())
            }
            ConfigError::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            ConfigError::MissingApiKey(var) => {
                write!(f, "api key missing: set it in the config file or {var}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<RenderError> for ConfigError {
    fn from(e: RenderError) -> Self {
        ConfigError::InvalidConfig(e.to_string())
    }
}

fn default_sheet_name() -> String {
    "All Products".to_string()
}

fn default_csv_spreadsheet() -> String {
    "products".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    GoogleSheets {
        /// Spreadsheet URL or bare id.
        spreadsheet: String,
        #[serde(default = "default_sheet_name")]
        sheet_name: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        base_url: Option<String>,
    },
    Csv {
        dir: PathBuf,
        /// File stem of `<dir>/<spreadsheet>.csv`.
        #[serde(default = "default_csv_spreadsheet")]
        spreadsheet: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub catalog_path: PathBuf,
    pub state_path: PathBuf,
    pub backup_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("data/products.json"),
            state_path: PathBuf::from("data/polling_metadata.json"),
            backup_dir: PathBuf::from("data/backups"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    pub error_cooldown_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            error_cooldown_secs: 60,
            max_retries: 3,
            retry_base_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrochureConfig {
    pub theme: String,
    pub company_name: String,
    pub output_dir: PathBuf,
    pub pdf_engine: PdfEngine,
}

impl Default for BrochureConfig {
    fn default() -> Self {
        Self {
            theme: "luxury-dark".to_string(),
            company_name: "HeyZack".to_string(),
            output_dir: PathBuf::from("out"),
            pdf_engine: PdfEngine::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenRouterConfig {
    pub api_key: Option<String>,
    pub model_id: String,
    pub base_url: String,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model_id: crate::brochure::enhance::DEFAULT_MODEL.to_string(),
            base_url: crate::brochure::enhance::DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub brochure: BrochureConfig,
    #[serde(default)]
    pub openrouter: OpenRouterConfig,
}

/// Parses config text without consulting the environment or validating.
pub fn parse_config(input: &str) -> Result<Config, ConfigError> {
    toml::from_str(input).map_err(|e| ConfigError::InvalidConfig(e.to_string()))
}

/// Reads `path` and fills missing API keys from the environment.
pub fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let data =
        std::fs::read_to_string(path).map_err(|_| ConfigError::MissingConfig(path.to_path_buf()))?;
    let mut cfg = parse_config(&data)?;
    cfg.apply_env(|name| std::env::var(name).ok());
    debug!(path = %path.display(), "Loaded configuration");
    Ok(cfg)
}

/// [`read_config`] followed by [`Config::validate`].
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let cfg = read_config(path)?;
    cfg.validate()?;
    Ok(cfg)
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl Config {
    /// Fills API keys that the file leaves unset from `lookup`.
    pub fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let SourceConfig::GoogleSheets { api_key, .. } = &mut self.source {
            if !non_empty(api_key) {
                *api_key = lookup(GOOGLE_API_KEY_ENV);
            }
        }
        if !non_empty(&self.openrouter.api_key) {
            self.openrouter.api_key = lookup(OPENROUTER_API_KEY_ENV);
        }
    }

    /// Checks everything needed to start polling. The OpenRouter key is
    /// checked only when enhancement is requested.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.spreadsheet_id()?;
        if let SourceConfig::GoogleSheets { api_key, sheet_name, .. } = &self.source {
            if !non_empty(api_key) {
                return Err(ConfigError::MissingApiKey(GOOGLE_API_KEY_ENV));
            }
            if sheet_name.trim().is_empty() {
                return Err(ConfigError::InvalidConfig("source.sheet_name is empty".into()));
            }
        }
        if self.polling.interval_secs == 0 {
            return Err(ConfigError::InvalidConfig("polling.interval_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn spreadsheet_id(&self) -> Result<String, ConfigError> {
        match &self.source {
            SourceConfig::GoogleSheets { spreadsheet, .. } => extract_spreadsheet_id(spreadsheet)
                .map_err(|e| ConfigError::InvalidConfig(format!("source.spreadsheet: {e}"))),
            SourceConfig::Csv { spreadsheet, .. } if spreadsheet.trim().is_empty() => Err(
                ConfigError::InvalidConfig("source.spreadsheet is empty".into()),
            ),
            SourceConfig::Csv { spreadsheet, .. } => Ok(spreadsheet.trim().to_string()),
        }
    }

    pub fn source_label(&self) -> &'static str {
        match self.source {
            SourceConfig::GoogleSheets { .. } => "google_sheets",
            SourceConfig::Csv { .. } => "csv",
        }
    }

    /// The Sheets client, when the source is Google Sheets.
    pub fn google_client(&self) -> Result<Option<GoogleSheetsClient>, ConfigError> {
        let SourceConfig::GoogleSheets {
            sheet_name,
            api_key,
            base_url,
            ..
        } = &self.source
        else {
            return Ok(None);
        };
        let key = api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey(GOOGLE_API_KEY_ENV))?;
        let client = match base_url {
            Some(url) => GoogleSheetsClient::with_base_url(key, sheet_name.clone(), url.clone()),
            None => GoogleSheetsClient::new(key, sheet_name.clone()),
        }
        .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        Ok(Some(client))
    }

    /// The configured source wrapped with retry and back-off.
    pub fn build_source(&self) -> Result<Arc<dyn SpreadsheetSource>, ConfigError> {
        let retries = self.polling.max_retries;
        let delay = Duration::from_millis(self.polling.retry_base_delay_ms);
        let source: Arc<dyn SpreadsheetSource> = match &self.source {
            SourceConfig::Csv { dir, .. } => Arc::new(RetryingSource::new(
                CsvDirectorySource::new(dir.clone()),
                retries,
                delay,
            )),
            SourceConfig::GoogleSheets { .. } => {
                let client = self
                    .google_client()?
                    .ok_or_else(|| ConfigError::InvalidConfig("no google sheets source".into()))?;
                Arc::new(RetryingSource::new(client, retries, delay))
            }
        };
        Ok(source)
    }

    pub fn catalog_store(&self) -> CatalogStore {
        CatalogStore::new(self.data.catalog_path.clone(), self.data.backup_dir.clone())
    }

    pub fn processor(&self) -> DataProcessor {
        DataProcessor::new(self.catalog_store(), self.source_label())
    }

    pub fn build_service(
        &self,
        notifier: Arc<dyn Notifier>,
    ) -> Result<PollingService, ConfigError> {
        let service = PollingService::new(
            self.build_source()?,
            self.spreadsheet_id()?,
            ChangeDetector::new(self.data.state_path.clone()),
            self.processor(),
            notifier,
        )
        .with_intervals(
            Duration::from_secs(self.polling.interval_secs),
            Duration::from_secs(self.polling.error_cooldown_secs),
        );
        Ok(service)
    }

    pub fn renderer(&self, theme: Option<&str>) -> Result<BrochureRenderer, ConfigError> {
        let theme = theme.unwrap_or(&self.brochure.theme);
        Ok(BrochureRenderer::new(theme, self.brochure.company_name.clone())?)
    }

    pub fn pdf_generator(&self) -> PdfGenerator {
        PdfGenerator::new(self.brochure.pdf_engine)
    }

    pub fn openrouter_client(&self) -> Result<OpenRouterClient, ConfigError> {
        let key = self
            .openrouter
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey(OPENROUTER_API_KEY_ENV))?;
        OpenRouterClient::new(
            key,
            self.openrouter.model_id.clone(),
            self.openrouter.base_url.clone(),
        )
        .map_err(|e| ConfigError::InvalidConfig(e.to_string()))
    }
}
