use clap::Parser;
use energy_analyzer::app::render;
use energy_analyzer::config::cli::LogFormat;
use energy_analyzer::core::analyzer::load_document;
use energy_analyzer::utils::error::{AnalyzerError, ErrorSeverity};
use energy_analyzer::utils::logger;
use energy_analyzer::{AnalyzerSettings, AnthropicClient, CliConfig, EnergyAnalyzer, LocalStorage};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = CliConfig::parse();

    match config.log_format {
        LogFormat::Compact => logger::init_cli_logger(config.verbose),
        LogFormat::Json => logger::init_json_logger(config.verbose),
    }

    tracing::info!("Starting energy-analyzer");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    if let Err(e) = run(config).await {
        report_failure(&e);
        std::process::exit(exit_code(&e));
    }
}

async fn run(config: CliConfig) -> Result<(), AnalyzerError> {
    let settings = config.resolve_settings()?;
    tracing::debug!("Resolved settings: {:?}", settings);

    let execution_id = config
        .execution_id
        .clone()
        .unwrap_or_else(|| format!("run_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S")));

    if config.dry_run {
        print_plan(&settings, &config, &execution_id);
        return Ok(());
    }

    let bill_path = config.bill.to_string_lossy().to_string();
    let document = load_document(
        &LocalStorage::new(""),
        &bill_path,
        settings.max_document_bytes,
    )
    .await?;
    println!("✅ File uploaded: {}", document.file_name);

    let api = Arc::new(AnthropicClient::new(settings.client_settings()?)?);
    let storage = LocalStorage::new(settings.output_path.clone());
    let analyzer = EnergyAnalyzer::new(storage, settings, api);

    let outcome = analyzer.run(document, execution_id.clone()).await?;

    if outcome.report.has_results() {
        println!("{}", render::render(&outcome.report, config.format)?);
    }
    for path in &outcome.written_files {
        println!("📁 Output saved to: {}", path);
    }

    match outcome.error {
        Some(e) => Err(e),
        None => {
            println!("✅ Analysis complete! ({})", execution_id);
            Ok(())
        }
    }
}

fn print_plan(settings: &AnalyzerSettings, config: &CliConfig, execution_id: &str) {
    println!("🔍 Dry run for {}", config.bill.display());
    println!("  Execution ID: {}", execution_id);
    println!("  API: {}/v1/messages", settings.api_base_url.trim_end_matches('/'));
    println!("  Model: {} (max_tokens {})", settings.model, settings.max_tokens);
    println!(
        "  API key: {}",
        if settings.api_key.is_some() { "found" } else { "missing" }
    );
    println!();
    println!("  1. 🔍 Bill Analyzer: PDF document + extraction prompt");
    println!(
        "  2. 🌐 Web Researcher: benchmark prompt{}",
        if settings.web_search {
            " + web_search tool"
        } else {
            " (web search disabled)"
        }
    );
    println!("  3. 📊 Report Generator: bill + research synthesis");
    println!();
    let formats: Vec<&str> = settings.output_formats.iter().map(|f| f.extension()).collect();
    println!("  💾 Output: {} ({})", settings.output_path, formats.join(", "));
}

fn report_failure(e: &AnalyzerError) {
    tracing::error!(
        "❌ Analysis failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    eprintln!("❌ Error: {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());
}

fn exit_code(e: &AnalyzerError) -> i32 {
    match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}
