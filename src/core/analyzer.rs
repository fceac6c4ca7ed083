use crate::config::settings::{AnalyzerSettings, OutputFormat};
use crate::core::sequence::{AnalysisContext, AnalysisSequence, StageResult};
use crate::core::stages::{BillAnalyzer, ReportGenerator, WebResearcher};
use crate::domain::model::{AnalysisReport, BillDocument};
use crate::domain::ports::{ConfigProvider, MessagesApi, Storage};
use crate::app::render;
use crate::utils::error::{AnalyzerError, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Checks that the upload is something the model can read as a PDF.
pub fn validate_document(document: &BillDocument, max_bytes: u64) -> Result<()> {
    let invalid = |reason: String| AnalyzerError::InvalidDocument {
        file_name: document.file_name.clone(),
        reason,
    };

    let has_pdf_extension = Path::new(&document.file_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if !has_pdf_extension {
        return Err(invalid("only .pdf files are accepted".to_string()));
    }
    if document.bytes.is_empty() {
        return Err(invalid("file is empty".to_string()));
    }
    if document.bytes.len() as u64 > max_bytes {
        return Err(invalid(format!(
            "file is {} bytes, limit is {} bytes",
            document.bytes.len(),
            max_bytes
        )));
    }

    // Some generators put a few junk bytes before the header.
    let head = &document.bytes[..document.bytes.len().min(1024)];
    if !head.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC) {
        return Err(invalid("missing %PDF- header".to_string()));
    }

    Ok(())
}

/// Reads a bill through `storage` and validates it.
pub async fn load_document<S: Storage>(
    storage: &S,
    path: &str,
    max_bytes: u64,
) -> Result<BillDocument> {
    let bytes = storage.read_file(path).await?;
    let document = BillDocument::new(path, bytes);
    validate_document(&document, max_bytes)?;
    tracing::info!(
        "✅ File uploaded: {} ({} bytes)",
        document.file_name,
        document.bytes.len()
    );
    Ok(document)
}

/// The outcome of a run. `error` is set when a stage failed; `report`
/// still holds whatever completed before it.
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub report: AnalysisReport,
    pub stage_results: Vec<StageResult>,
    pub written_files: Vec<String>,
    pub error: Option<AnalyzerError>,
}

/// Runs the three stages over a bill and writes the report files through
/// its storage.
pub struct EnergyAnalyzer<S: Storage> {
    storage: S,
    settings: AnalyzerSettings,
    api: Arc<dyn MessagesApi>,
}

impl<S: Storage> EnergyAnalyzer<S> {
    pub fn new(storage: S, settings: AnalyzerSettings, api: Arc<dyn MessagesApi>) -> Self {
        Self {
            storage,
            settings,
            api,
        }
    }

    pub fn build_sequence(&self) -> AnalysisSequence {
        let stage_settings = self.settings.stage_settings();
        let mut sequence = AnalysisSequence::new().with_monitoring(self.settings.monitoring);

        sequence.add_stage(Box::new(BillAnalyzer::new(
            self.api.clone(),
            stage_settings.clone(),
        )));
        sequence.add_stage(Box::new(
            WebResearcher::new(self.api.clone(), stage_settings.clone())
                .with_web_search(self.settings.web_search_enabled(), self.settings.max_searches),
        ));
        sequence.add_stage(Box::new(ReportGenerator::new(
            self.api.clone(),
            stage_settings,
        )));

        sequence
    }

    /// Runs the analysis. An invalid document is returned directly; stage
    /// errors are carried in the outcome together with the partial report.
    /// Write failures are returned only when every stage succeeded, so a
    /// stage error is never replaced by an I/O error.
    pub async fn run(&self, document: BillDocument, execution_id: String) -> Result<AnalysisOutcome> {
        validate_document(&document, self.settings.max_document_bytes)?;
        let sequence = self.build_sequence();

        tracing::info!(
            "🚀 Running analysis {} with {} ({} stages)",
            execution_id,
            self.settings.model(),
            sequence.stage_names().len()
        );

        let mut context = AnalysisContext::new(execution_id, document);
        let (stage_results, error) = match sequence.execute_all(&mut context).await {
            Ok(results) => (results, None),
            Err(e) => (context.completed.clone(), Some(e)),
        };

        let report = context.to_report(self.settings.model());
        let written_files = if report.has_results() {
            match self.write_outputs(&context, &report).await {
                Ok(files) => files,
                Err(e) if error.is_some() => {
                    tracing::warn!("⚠️ Could not write partial results: {}", e);
                    Vec::new()
                }
                Err(e) => return Err(e),
            }
        } else {
            Vec::new()
        };

        if let Some(metrics_file) = &self.settings.metrics_file {
            let exported = self
                .export_metrics(metrics_file, &report, &stage_results, error.as_ref())
                .await;
            match exported {
                Err(e) if error.is_some() => {
                    tracing::warn!("⚠️ Could not export metrics to {}: {}", metrics_file, e)
                }
                other => other?,
            }
        }

        Ok(AnalysisOutcome {
            report,
            stage_results,
            written_files,
            error,
        })
    }

    async fn write_outputs(
        &self,
        context: &AnalysisContext,
        report: &AnalysisReport,
    ) -> Result<Vec<String>> {
        let mut written = Vec::new();
        let stem = context.document.stem();

        for format in &self.settings.output_formats {
            let file_name = format!("{}_{}.{}", stem, report.execution_id, format.extension());
            let body = match format {
                OutputFormat::Json => serde_json::to_string_pretty(report)?,
                OutputFormat::Markdown => render::render_markdown(report),
            };
            self.storage.write_file(&file_name, body.as_bytes()).await?;

            let full_path = Path::new(self.settings.output_path())
                .join(&file_name)
                .display()
                .to_string();
            tracing::info!("📁 Output saved to: {}", full_path);
            written.push(full_path);
        }

        Ok(written)
    }

    async fn export_metrics(
        &self,
        metrics_file: &str,
        report: &AnalysisReport,
        stage_results: &[StageResult],
        error: Option<&AnalyzerError>,
    ) -> Result<()> {
        let mut metrics = HashMap::new();
        metrics.insert(
            "execution_id",
            serde_json::Value::String(report.execution_id.clone()),
        );
        metrics.insert(
            "timestamp",
            serde_json::Value::String(report.generated_at.to_rfc3339()),
        );
        metrics.insert("model", serde_json::Value::String(report.model.clone()));
        metrics.insert(
            "summary",
            serde_json::Value::Object(
                AnalysisSequence::get_execution_summary(stage_results)
                    .into_iter()
                    .collect(),
            ),
        );
        metrics.insert(
            "research_fallback_used",
            serde_json::Value::Bool(report.research_fallback_used),
        );
        metrics.insert(
            "error",
            error
                .map(|e| serde_json::Value::String(e.to_string()))
                .unwrap_or(serde_json::Value::Null),
        );

        let metrics_json = serde_json::to_string_pretty(&metrics)?;
        if let Some(parent) = Path::new(metrics_file).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(metrics_file, metrics_json).await?;
        tracing::info!("📊 Execution metrics exported to: {}", metrics_file);
        Ok(())
    }
}
