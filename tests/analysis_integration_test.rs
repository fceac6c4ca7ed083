use anyhow::Result;
use energy_analyzer::config::settings::{ApiKey, OutputFormat};
use energy_analyzer::core::analyzer::{load_document, AnalysisOutcome};
use energy_analyzer::core::stages::{BILL_ANALYZER, REPORT_GENERATOR};
use energy_analyzer::{
    AnalyzerError, AnalyzerSettings, AnthropicClient, EnergyAnalyzer, LocalStorage,
};
use httpmock::prelude::*;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

const BILL_JSON: &str = r#"{"totalCost": 142.37, "usage": 980, "ratePerKwh": 0.145, "billingPeriod": "March 2025", "unusualCharges": ["Late fee $5.00"], "insights": "Usage is up 12% from February"}"#;
const RESEARCH_JSON: &str = r#"{"averageRate": 0.168, "typicalUsage": "About 860 kWh per month for US households", "recommendations": ["Shift laundry to off-peak hours", "Seal air leaks"], "sources": ["EIA Electric Power Monthly"]}"#;
const REPORT_JSON: &str = r#"{"summary": "Your rate is below the national average but usage is high.", "comparison": "0.145 $/kWh vs 0.168 $/kWh average", "savings": ["$15/month by reducing peak usage"], "nextSteps": ["Book a home energy audit"]}"#;

fn message(text: &str) -> serde_json::Value {
    json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "model": "claude-sonnet-4-20250514",
        "content": [{"type": "text", "text": text}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 1200, "output_tokens": 150}
    })
}

fn search_message(text: &str) -> serde_json::Value {
    json!({
        "id": "msg_search",
        "type": "message",
        "role": "assistant",
        "model": "claude-sonnet-4-20250514",
        "content": [
            {"type": "text", "text": "I'll look up current benchmarks."},
            {"type": "server_tool_use", "id": "srvtoolu_1", "name": "web_search", "input": {"query": "average residential electricity rate"}},
            {"type": "web_search_tool_result", "tool_use_id": "srvtoolu_1", "content": [
                {"type": "web_search_result", "url": "https://www.eia.gov", "title": "EIA", "encrypted_content": "abc"}
            ]},
            {"type": "text", "text": text}
        ],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 3000, "output_tokens": 200}
    })
}

struct Fixture {
    server: MockServer,
    temp_dir: TempDir,
}

impl Fixture {
    async fn new() -> Self {
        Self {
            server: MockServer::start_async().await,
            temp_dir: TempDir::new().expect("temp dir"),
        }
    }

    fn output_dir(&self) -> String {
        self.temp_dir.path().join("out").to_string_lossy().to_string()
    }

    fn settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            api_base_url: self.server.base_url(),
            api_key: Some(ApiKey::new("sk-test")),
            retry_delay_ms: 1,
            output_path: self.output_dir(),
            ..AnalyzerSettings::default()
        }
    }

    async fn run_with(&self, settings: AnalyzerSettings, file_name: &str, bytes: &[u8]) -> Result<AnalysisOutcome> {
        let input = LocalStorage::new(self.temp_dir.path());
        tokio::fs::write(self.temp_dir.path().join(file_name), bytes).await?;
        let document = load_document(&input, file_name, settings.max_document_bytes).await?;

        let api = Arc::new(AnthropicClient::new(settings.client_settings()?)?);
        let analyzer = EnergyAnalyzer::new(LocalStorage::new(self.output_dir()), settings, api);
        Ok(analyzer.run(document, "test_run".to_string()).await?)
    }

    async fn run(&self) -> Result<AnalysisOutcome> {
        self.run_with(self.settings(), "march.pdf", b"%PDF-1.4\n%fake bill\n").await
    }
}

#[tokio::test]
async fn test_full_analysis_renders_three_sections() -> Result<()> {
    let fixture = Fixture::new().await;

    let bill_mock = fixture
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/messages")
                .header("x-api-key", "sk-test")
                .header("anthropic-version", "2023-06-01")
                .body_contains("\"type\":\"document\"")
                .body_contains("\"media_type\":\"application/pdf\"");
            then.status(200).json_body(message(&format!("```json\n{}\n```", BILL_JSON)));
        })
        .await;
    let research_mock = fixture
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/messages")
                .body_contains("web_search_20250305")
                .body_contains("energy rate 0.145 kWh industry benchmark");
            then.status(200).json_body(search_message(RESEARCH_JSON));
        })
        .await;
    let report_mock = fixture
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/messages")
                .body_contains("Generate a concise energy analysis report.");
            then.status(200).json_body(message(REPORT_JSON));
        })
        .await;

    let outcome = fixture.run().await?;

    assert!(outcome.error.is_none());
    assert!(outcome.report.is_complete());
    assert!(!outcome.report.research_fallback_used);
    assert_eq!(outcome.stage_results.len(), 3);

    let bill = outcome.report.bill_analysis.as_ref().unwrap();
    assert_eq!(bill.rate_per_kwh, 0.145);
    let research = outcome.report.web_research.as_ref().unwrap();
    assert_eq!(research.average_rate, 0.168);
    let report = outcome.report.final_report.as_ref().unwrap();
    assert_eq!(report.next_steps, vec![json!("Book a home energy audit")]);

    let text = energy_analyzer::app::render::render_text(&outcome.report);
    assert!(text.contains("Agent #1: Bill Analysis"));
    assert!(text.contains("Agent #2: Industry Research"));
    assert!(text.contains("Agent #3: Final Report"));

    bill_mock.assert_async().await;
    research_mock.assert_async().await;
    report_mock.assert_async().await;

    assert_eq!(outcome.written_files.len(), 2);
    let json_path = fixture.temp_dir.path().join("out/march_test_run.json");
    let written: serde_json::Value = serde_json::from_str(&tokio::fs::read_to_string(json_path).await?)?;
    assert_eq!(written["bill_analysis"]["totalCost"], json!(142.37));
    let md = tokio::fs::read_to_string(fixture.temp_dir.path().join("out/march_test_run.md")).await?;
    assert!(md.contains("## 📋 Final Report"));

    Ok(())
}

#[tokio::test]
async fn test_unparseable_research_uses_fallback() -> Result<()> {
    let fixture = Fixture::new().await;

    fixture
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/messages").body_contains("\"type\":\"document\"");
            then.status(200).json_body(message(BILL_JSON));
        })
        .await;
    fixture
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/messages").body_contains("web_search_20250305");
            then.status(200)
                .json_body(search_message("Rates vary widely by state, so no single figure applies."));
        })
        .await;
    let report_mock = fixture
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/messages")
                .body_contains("Generate a concise energy analysis report.")
                .body_contains("Based on industry standards");
            then.status(200).json_body(message(REPORT_JSON));
        })
        .await;

    let outcome = fixture.run().await?;

    assert!(outcome.error.is_none());
    assert!(outcome.report.research_fallback_used);
    assert_eq!(outcome.report.web_research.as_ref().unwrap().average_rate, 0.13);
    report_mock.assert_async().await;

    Ok(())
}

#[tokio::test]
async fn test_malformed_extraction_stops_before_research() -> Result<()> {
    let fixture = Fixture::new().await;

    fixture
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/messages").body_contains("\"type\":\"document\"");
            then.status(200)
                .json_body(message("This document does not appear to be an energy bill."));
        })
        .await;
    let research_mock = fixture
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/messages").body_contains("Research industry benchmarks");
            then.status(200).json_body(message(RESEARCH_JSON));
        })
        .await;
    let report_mock = fixture
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/messages")
                .body_contains("Generate a concise energy analysis report.");
            then.status(200).json_body(message(REPORT_JSON));
        })
        .await;

    let outcome = fixture.run().await?;

    match outcome.error.as_ref() {
        Some(AnalyzerError::StageFailed { stage, source }) => {
            assert_eq!(stage, BILL_ANALYZER);
            assert!(matches!(**source, AnalyzerError::MalformedResponse { .. }));
        }
        other => panic!("unexpected outcome error: {:?}", other),
    }
    assert!(!outcome.report.has_results());
    assert!(outcome.written_files.is_empty());
    assert_eq!(research_mock.hits_async().await, 0);
    assert_eq!(report_mock.hits_async().await, 0);

    Ok(())
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() -> Result<()> {
    let fixture = Fixture::new().await;

    let mock = fixture
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/messages");
            then.status(401).json_body(json!({
                "type": "error",
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            }));
        })
        .await;

    let outcome = fixture.run().await?;
    let err = outcome.error.expect("run should fail");

    match err.root() {
        AnalyzerError::UpstreamError { status, message } => {
            assert_eq!(*status, 401);
            assert!(message.contains("invalid x-api-key"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(!err.is_retryable());
    assert_eq!(mock.hits_async().await, 1);

    Ok(())
}

#[tokio::test]
async fn test_server_errors_are_retried() -> Result<()> {
    let fixture = Fixture::new().await;

    let mock = fixture
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/messages");
            then.status(529).json_body(json!({
                "type": "error",
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            }));
        })
        .await;

    let outcome = fixture.run().await?;

    assert!(outcome.error.is_some());
    assert_eq!(mock.hits_async().await, 3);

    Ok(())
}

#[tokio::test]
async fn test_report_failure_keeps_partial_results() -> Result<()> {
    let fixture = Fixture::new().await;

    fixture
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/messages").body_contains("\"type\":\"document\"");
            then.status(200).json_body(message(BILL_JSON));
        })
        .await;
    fixture
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/messages").body_contains("web_search_20250305");
            then.status(200).json_body(search_message(RESEARCH_JSON));
        })
        .await;
    fixture
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/messages")
                .body_contains("Generate a concise energy analysis report.");
            then.status(500).body("internal error");
        })
        .await;

    let settings = AnalyzerSettings {
        retry_attempts: 0,
        output_formats: vec![OutputFormat::Json],
        ..fixture.settings()
    };
    let outcome = fixture
        .run_with(settings, "march.pdf", b"%PDF-1.7\nbill")
        .await?;

    match outcome.error.as_ref() {
        Some(AnalyzerError::StageFailed { stage, .. }) => assert_eq!(stage, REPORT_GENERATOR),
        other => panic!("unexpected outcome error: {:?}", other),
    }
    assert!(outcome.report.bill_analysis.is_some());
    assert!(outcome.report.web_research.is_some());
    assert!(outcome.report.final_report.is_none());
    assert_eq!(outcome.written_files.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_non_pdf_rejected_before_any_request() -> Result<()> {
    let fixture = Fixture::new().await;

    let mock = fixture
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/messages");
            then.status(200).json_body(message(BILL_JSON));
        })
        .await;

    let result = fixture
        .run_with(fixture.settings(), "bill.pdf", b"<html>not a pdf</html>")
        .await;

    let err = result.expect_err("non-PDF should be rejected");
    let analyzer_err = err.downcast_ref::<AnalyzerError>().expect("analyzer error");
    assert!(matches!(analyzer_err, AnalyzerError::InvalidDocument { .. }));
    assert_eq!(mock.hits_async().await, 0);

    Ok(())
}

#[tokio::test]
async fn test_metrics_export() -> Result<()> {
    let fixture = Fixture::new().await;

    fixture
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/messages").body_contains("\"type\":\"document\"");
            then.status(200).json_body(message(BILL_JSON));
        })
        .await;
    fixture
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/messages").body_contains("Research industry benchmarks");
            then.status(200).json_body(message(RESEARCH_JSON));
        })
        .await;
    fixture
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/messages")
                .body_contains("Generate a concise energy analysis report.");
            then.status(200).json_body(message(REPORT_JSON));
        })
        .await;

    let metrics_path = fixture.temp_dir.path().join("metrics.json");
    let settings = AnalyzerSettings {
        web_search: false,
        metrics_file: Some(metrics_path.to_string_lossy().to_string()),
        ..fixture.settings()
    };
    let outcome = fixture.run_with(settings, "march.pdf", b"%PDF-1.4").await?;
    assert!(outcome.error.is_none());

    let metrics: serde_json::Value =
        serde_json::from_str(&tokio::fs::read_to_string(&metrics_path).await?)?;
    assert_eq!(metrics["execution_id"], "test_run");
    assert_eq!(metrics["summary"]["total_stages"], 3);
    assert_eq!(
        metrics["summary"]["executed_stages"],
        json!(["bill_analyzer", "web_researcher", "report_generator"])
    );
    assert!(metrics["error"].is_null());

    Ok(())
}

#[tokio::test]
async fn test_rate_limit_is_retried() -> Result<()> {
    let fixture = Fixture::new().await;

    let mock = fixture
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/messages");
            then.status(429).json_body(json!({
                "type": "error",
                "error": {"type": "rate_limit_error", "message": "Number of request tokens has exceeded your rate limit"}
            }));
        })
        .await;

    let settings = AnalyzerSettings {
        retry_attempts: 1,
        ..fixture.settings()
    };
    let outcome = fixture.run_with(settings, "march.pdf", b"%PDF-1.4").await?;
    let err = outcome.error.expect("run should fail");

    assert!(matches!(err.root(), AnalyzerError::UpstreamError { status: 429, .. }));
    assert!(err.is_retryable());
    assert_eq!(mock.hits_async().await, 2);

    Ok(())
}

#[tokio::test]
async fn test_connection_errors_are_retried_with_backoff() -> Result<()> {
    let fixture = Fixture::new().await;

    // Bind then release a port so nothing is listening on it.
    let closed_port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.local_addr()?.port()
    };

    let settings = AnalyzerSettings {
        api_base_url: format!("http://127.0.0.1:{}", closed_port),
        retry_attempts: 2,
        retry_delay_ms: 50,
        ..fixture.settings()
    };

    let started = std::time::Instant::now();
    let outcome = fixture.run_with(settings, "march.pdf", b"%PDF-1.4").await?;
    let elapsed = started.elapsed();

    let err = outcome.error.expect("run should fail");
    match err.root() {
        AnalyzerError::ApiError(e) => assert!(e.is_connect()),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.is_retryable());
    // 50ms then 100ms of backoff between the three attempts.
    assert!(elapsed >= std::time::Duration::from_millis(150));
    assert!(outcome.report.bill_analysis.is_none());

    Ok(())
}

#[tokio::test]
async fn test_stage_error_survives_metrics_in_missing_directory() -> Result<()> {
    let fixture = Fixture::new().await;

    fixture
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/messages");
            then.status(401).json_body(json!({
                "type": "error",
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            }));
        })
        .await;

    let metrics_path = fixture.temp_dir.path().join("metrics").join("run.json");
    let settings = AnalyzerSettings {
        metrics_file: Some(metrics_path.to_string_lossy().to_string()),
        ..fixture.settings()
    };
    let outcome = fixture.run_with(settings, "march.pdf", b"%PDF-1.4").await?;

    let err = outcome.error.expect("run should fail");
    assert!(matches!(err.root(), AnalyzerError::UpstreamError { status: 401, .. }));

    let metrics: serde_json::Value =
        serde_json::from_str(&tokio::fs::read_to_string(&metrics_path).await?)?;
    assert!(metrics["error"].as_str().unwrap_or_default().contains("invalid x-api-key"));

    Ok(())
}

#[tokio::test]
async fn test_stage_error_wins_over_failed_metrics_write() -> Result<()> {
    let fixture = Fixture::new().await;

    fixture
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/messages");
            then.status(401).json_body(json!({
                "type": "error",
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            }));
        })
        .await;

    // A regular file where the metrics directory should be.
    let blocker = fixture.temp_dir.path().join("blocked");
    tokio::fs::write(&blocker, b"not a directory").await?;
    let settings = AnalyzerSettings {
        metrics_file: Some(blocker.join("run.json").to_string_lossy().to_string()),
        ..fixture.settings()
    };
    let outcome = fixture.run_with(settings, "march.pdf", b"%PDF-1.4").await?;

    let err = outcome.error.expect("run should fail");
    assert!(matches!(err.root(), AnalyzerError::UpstreamError { status: 401, .. }));
    assert!(outcome.written_files.is_empty());

    Ok(())
}
