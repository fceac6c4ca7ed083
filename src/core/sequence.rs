use crate::domain::model::{
    AnalysisReport, BillAnalysis, BillDocument, FinalReport, IndustryResearch, StageTiming,
};
use crate::utils::error::Result;
use crate::utils::monitor::ProcessMonitor;
use chrono::Utc;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Stage execution result
#[derive(Debug, Clone)]
pub struct StageResult {
    pub stage_name: String,
    pub duration: Duration,
}

/// What a stage hands back to the sequence.
#[derive(Debug, Clone)]
pub enum StageOutput {
    Bill(BillAnalysis),
    Research {
        research: IndustryResearch,
        fallback_used: bool,
    },
    Report(FinalReport),
}

/// Shared state threaded through the stages of one run.
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    pub execution_id: String,
    pub document: BillDocument,
    pub bill_analysis: Option<BillAnalysis>,
    pub web_research: Option<IndustryResearch>,
    pub final_report: Option<FinalReport>,
    pub research_fallback_used: bool,
    pub completed: Vec<StageResult>,
}

impl AnalysisContext {
    pub fn new(execution_id: String, document: BillDocument) -> Self {
        Self {
            execution_id,
            document,
            bill_analysis: None,
            web_research: None,
            final_report: None,
            research_fallback_used: false,
            completed: Vec::new(),
        }
    }

    pub fn apply(&mut self, output: StageOutput) {
        match output {
            StageOutput::Bill(bill) => self.bill_analysis = Some(bill),
            StageOutput::Research {
                research,
                fallback_used,
            } => {
                self.web_research = Some(research);
                self.research_fallback_used = fallback_used;
            }
            StageOutput::Report(report) => self.final_report = Some(report),
        }
    }

    /// Snapshot of whatever has completed so far.
    pub fn to_report(&self, model: &str) -> AnalysisReport {
        AnalysisReport {
            execution_id: self.execution_id.clone(),
            file_name: self.document.file_name.clone(),
            model: model.to_string(),
            generated_at: Utc::now(),
            bill_analysis: self.bill_analysis.clone(),
            web_research: self.web_research.clone(),
            final_report: self.final_report.clone(),
            research_fallback_used: self.research_fallback_used,
            stages: self
                .completed
                .iter()
                .map(|r| StageTiming {
                    stage: r.stage_name.clone(),
                    duration_ms: r.duration.as_millis() as u64,
                })
                .collect(),
        }
    }
}

/// One step of the analysis.
#[async_trait::async_trait]
pub trait AnalysisStage: Send + Sync {
    fn get_name(&self) -> &str;

    /// Human-readable label used in progress output.
    fn label(&self) -> &str {
        self.get_name()
    }

    fn should_execute(&self, _context: &AnalysisContext) -> bool {
        true
    }

    async fn run(&self, context: &AnalysisContext) -> Result<StageOutput>;
}

/// Runs stages one after another, stopping at the first failure.
pub struct AnalysisSequence {
    stages: Vec<Box<dyn AnalysisStage>>,
    monitor: Option<ProcessMonitor>,
}

impl AnalysisSequence {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            monitor: None,
        }
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = enabled.then(|| ProcessMonitor::new(true));
        self
    }

    pub fn add_stage(&mut self, stage: Box<dyn AnalysisStage>) {
        self.stages.push(stage);
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.get_name()).collect()
    }

    /// Executes every stage against `context`. On failure the context
    /// keeps the outputs of the stages that did complete.
    pub async fn execute_all(&self, context: &mut AnalysisContext) -> Result<Vec<StageResult>> {
        if let Some(monitor) = &self.monitor {
            monitor.log_stats("Analysis started");
        }

        let mut results = Vec::new();
        for stage in &self.stages {
            if !stage.should_execute(context) {
                tracing::info!("⏭️ Skipping stage: {} (condition not met)", stage.get_name());
                continue;
            }

            tracing::info!("⏳ {}...", stage.label());
            let start_time = Instant::now();

            let output = match stage.run(context).await {
                Ok(output) => output,
                Err(e) => {
                    tracing::error!("❌ Stage {} failed: {}", stage.get_name(), e);
                    return Err(e.in_stage(stage.get_name()));
                }
            };

            let result = StageResult {
                stage_name: stage.get_name().to_string(),
                duration: start_time.elapsed(),
            };
            tracing::info!(
                "✅ Stage executed: {} (duration: {:?})",
                result.stage_name,
                result.duration
            );

            context.apply(output);
            context.completed.push(result.clone());
            results.push(result);

            if let Some(monitor) = &self.monitor {
                monitor.log_stats(stage.get_name());
            }
        }

        if let Some(monitor) = &self.monitor {
            monitor.log_stats("Analysis completed");
        }

        Ok(results)
    }

    pub fn get_execution_summary(results: &[StageResult]) -> HashMap<String, serde_json::Value> {
        let mut summary = HashMap::new();

        let total_duration: Duration = results.iter().map(|r| r.duration).sum();

        summary.insert(
            "total_stages".to_string(),
            serde_json::Value::Number(results.len().into()),
        );
        summary.insert(
            "total_duration_ms".to_string(),
            serde_json::Value::Number((total_duration.as_millis() as u64).into()),
        );

        let stage_names: Vec<serde_json::Value> = results
            .iter()
            .map(|r| serde_json::Value::String(r.stage_name.clone()))
            .collect();
        summary.insert(
            "executed_stages".to_string(),
            serde_json::Value::Array(stage_names),
        );

        summary
    }
}

impl Default for AnalysisSequence {
    fn default() -> Self {
        Self::new()
    }
}
