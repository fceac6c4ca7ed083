use crate::adapters::anthropic::{ClientSettings, DEFAULT_BASE_URL};
use crate::config::file_config::FileConfig;
use crate::core::stages::StageSettings;
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{AnalyzerError, Result};
use crate::utils::validation::{self, Validate};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_SECRETS_PATHS: [&str; 2] = [".streamlit/secrets.toml", "secrets.toml"];

/// API key that never shows up in debug output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Markdown,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Result<Self> {
        validation::validate_one_of("output.output_formats", value, &["json", "markdown", "md"])?;
        Ok(match value {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Markdown,
        })
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Markdown => "md",
        }
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub api_base_url: String,
    pub api_key: Option<ApiKey>,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub web_search: bool,
    pub max_searches: Option<u32>,
    pub max_document_bytes: u64,
    pub output_path: String,
    pub output_formats: Vec<OutputFormat>,
    pub monitoring: bool,
    pub metrics_file: Option<String>,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_seconds: 600,
            retry_attempts: 2,
            retry_delay_ms: 500,
            web_search: true,
            max_searches: None,
            max_document_bytes: 32 * 1024 * 1024,
            output_path: "./output".to_string(),
            output_formats: vec![OutputFormat::Json, OutputFormat::Markdown],
            monitoring: false,
            metrics_file: None,
        }
    }
}

fn is_unresolved(value: &str) -> bool {
    value.trim().is_empty() || value.contains("${")
}

impl AnalyzerSettings {
    /// Overlays the values present in a config file.
    pub fn merge_file(&mut self, file: &FileConfig) -> Result<()> {
        if let Some(api) = &file.api {
            if let Some(base_url) = &api.base_url {
                self.api_base_url = base_url.clone();
            }
            if let Some(key) = api.api_key.as_deref().filter(|k| !is_unresolved(k)) {
                self.api_key = Some(ApiKey::new(key));
            }
            if let Some(model) = &api.model {
                self.model = model.clone();
            }
            if let Some(max_tokens) = api.max_tokens {
                self.max_tokens = max_tokens;
            }
            if let Some(timeout) = api.timeout_seconds {
                self.timeout_seconds = timeout;
            }
            if let Some(retries) = api.retry_attempts {
                self.retry_attempts = retries;
            }
            if let Some(delay) = api.retry_delay_ms {
                self.retry_delay_ms = delay;
            }
        }

        if let Some(research) = &file.research {
            if let Some(web_search) = research.web_search {
                self.web_search = web_search;
            }
            self.max_searches = research.max_searches.or(self.max_searches);
        }

        if let Some(max_mb) = file.document.as_ref().and_then(|d| d.max_size_mb) {
            self.max_document_bytes = validation::document_limit_bytes("document.max_size_mb", max_mb)?;
        }

        if let Some(output) = &file.output {
            if let Some(path) = &output.output_path {
                self.output_path = path.clone();
            }
            if let Some(formats) = &output.output_formats {
                self.output_formats = formats
                    .iter()
                    .map(|f| OutputFormat::parse(f))
                    .collect::<Result<Vec<_>>>()?;
            }
        }

        if let Some(monitoring) = &file.monitoring {
            self.monitoring = monitoring.enabled;
            if monitoring.export_metrics.unwrap_or(false) {
                self.metrics_file = Some(
                    monitoring
                        .metrics_file
                        .clone()
                        .unwrap_or_else(|| "analysis_metrics.json".to_string()),
                );
            }
        }

        Ok(())
    }

    /// Fills in the API key when the config file did not set one: first
    /// from a secrets file, then from the environment.
    pub fn resolve_api_key(&mut self, secrets_paths: &[PathBuf]) -> Result<()> {
        if self.api_key.is_some() {
            return Ok(());
        }
        self.api_key = find_api_key(secrets_paths, std::env::var(API_KEY_VAR).ok())?;
        Ok(())
    }

    pub fn require_api_key(&self) -> Result<&ApiKey> {
        self.api_key.as_ref().ok_or_else(|| AnalyzerError::MissingApiKey {
            hint: format!(
                "set {} or add it to one of: {}",
                API_KEY_VAR,
                DEFAULT_SECRETS_PATHS.join(", ")
            ),
        })
    }

    pub fn client_settings(&self) -> Result<ClientSettings> {
        let key = self.require_api_key()?;
        Ok(ClientSettings {
            base_url: self.api_base_url.clone(),
            api_key: key.expose().to_string(),
            timeout: Duration::from_secs(self.timeout_seconds),
            retry_attempts: self.retry_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        })
    }

    pub fn stage_settings(&self) -> StageSettings {
        StageSettings {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
        }
    }
}

/// Looks for `ANTHROPIC_API_KEY` in the first existing secrets file, then
/// falls back to `env_value`.
pub fn find_api_key(secrets_paths: &[PathBuf], env_value: Option<String>) -> Result<Option<ApiKey>> {
    for path in secrets_paths {
        if let Some(key) = read_secrets_key(path)? {
            tracing::debug!("🔑 API key loaded from {}", path.display());
            return Ok(Some(ApiKey::new(key)));
        }
    }

    Ok(env_value
        .filter(|v| !v.trim().is_empty())
        .map(|v| {
            tracing::debug!("🔑 API key loaded from {}", API_KEY_VAR);
            ApiKey::new(v)
        }))
}

fn read_secrets_key(path: &Path) -> Result<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)?;
    let table: toml::Table = toml::from_str(&content).map_err(|e| {
        AnalyzerError::ConfigValidationError {
            field: path.display().to_string(),
            message: format!("secrets file is not valid TOML: {}", e),
        }
    })?;

    Ok(table
        .get(API_KEY_VAR)
        .and_then(|v| v.as_str())
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string))
}

impl ConfigProvider for AnalyzerSettings {
    fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn web_search_enabled(&self) -> bool {
        self.web_search
    }
}

impl Validate for AnalyzerSettings {
    fn validate(&self) -> Result<()> {
        validation::validate_base_url("api.base_url", &self.api_base_url)?;
        validation::validate_non_empty_string("api.model", &self.model)?;
        validation::validate_range("api.max_tokens", self.max_tokens, 1, 128_000)?;
        validation::validate_range("api.timeout_seconds", self.timeout_seconds, 1, 3600)?;
        validation::validate_range("api.retry_attempts", self.retry_attempts, 0, 10)?;
        if let Some(max) = self.max_searches {
            validation::validate_range("research.max_searches", max, 1, 20)?;
        }
        validation::validate_document_limit("max_document_bytes", self.max_document_bytes)?;
        validation::validate_output_dir("output.output_path", &self.output_path)?;
        Ok(())
    }
}
