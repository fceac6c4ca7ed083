pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{anthropic::AnthropicClient, storage::LocalStorage};
pub use config::AnalyzerSettings;
pub use core::{analyzer::EnergyAnalyzer, sequence::AnalysisSequence};
pub use utils::error::{AnalyzerError, Result};
