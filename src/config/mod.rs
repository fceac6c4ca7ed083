#[cfg(feature = "cli")]
pub mod cli;
pub mod file_config;
pub mod settings;

#[cfg(feature = "cli")]
pub use cli::CliConfig;
pub use file_config::FileConfig;
pub use settings::{AnalyzerSettings, OutputFormat};
