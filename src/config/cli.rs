use crate::app::render::DisplayFormat;
use crate::config::file_config::FileConfig;
use crate::config::settings::{AnalyzerSettings, OutputFormat, DEFAULT_SECRETS_PATHS};
use crate::utils::error::Result;
use crate::utils::validation::Validate;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "energy-analyzer")]
#[command(about = "Analyze a PDF energy bill with three chained model calls")]
pub struct CliConfig {
    /// Path to the PDF energy bill
    pub bill: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Secrets file holding ANTHROPIC_API_KEY
    #[arg(long)]
    pub secrets: Option<PathBuf>,

    #[arg(long)]
    pub api_base_url: Option<String>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    #[arg(long)]
    pub output_path: Option<String>,

    /// Comma-separated report files to write (json, markdown)
    #[arg(long, value_delimiter = ',')]
    pub output_formats: Vec<String>,

    /// How results are printed to the terminal
    #[arg(long, value_enum, default_value = "text")]
    pub format: DisplayFormat,

    /// Run the research stage without the web search tool
    #[arg(long)]
    pub no_web_search: bool,

    /// Show the execution plan without calling the API
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long, help = "Log CPU and memory between stages")]
    pub monitor: bool,

    /// Write run metrics as JSON to this file
    #[arg(long)]
    pub metrics_file: Option<String>,

    #[arg(long)]
    pub execution_id: Option<String>,

    #[arg(long, value_enum, default_value = "compact")]
    pub log_format: LogFormat,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

impl CliConfig {
    /// Defaults, then the config file, then flags.
    pub fn resolve_settings(&self) -> Result<AnalyzerSettings> {
        let mut settings = AnalyzerSettings::default();

        if let Some(path) = &self.config {
            tracing::info!("📁 Loading configuration from: {}", path.display());
            settings.merge_file(&FileConfig::from_file(path)?)?;
        }

        if let Some(base_url) = &self.api_base_url {
            settings.api_base_url = base_url.clone();
        }
        if let Some(model) = &self.model {
            settings.model = model.clone();
        }
        if let Some(max_tokens) = self.max_tokens {
            settings.max_tokens = max_tokens;
        }
        if let Some(output_path) = &self.output_path {
            settings.output_path = output_path.clone();
        }
        if !self.output_formats.is_empty() {
            settings.output_formats = self
                .output_formats
                .iter()
                .map(|f| OutputFormat::parse(f.trim()))
                .collect::<Result<Vec<_>>>()?;
        }
        if self.no_web_search {
            settings.web_search = false;
        }
        if self.monitor {
            settings.monitoring = true;
        }
        if let Some(metrics_file) = &self.metrics_file {
            settings.metrics_file = Some(metrics_file.clone());
        }

        settings.resolve_api_key(&self.secrets_paths())?;
        settings.validate()?;
        Ok(settings)
    }

    fn secrets_paths(&self) -> Vec<PathBuf> {
        match &self.secrets {
            Some(path) => vec![path.clone()],
            None => DEFAULT_SECRETS_PATHS.iter().map(PathBuf::from).collect(),
        }
    }
}
