use crate::core::prompts;
use crate::core::reply::parse_reply;
use crate::core::sequence::{AnalysisContext, AnalysisStage, StageOutput};
use crate::domain::messages::{MessageContent, MessageRequest, RequestBlock, Tool};
use crate::domain::model::{BillAnalysis, FinalReport, IndustryResearch};
use crate::domain::ports::MessagesApi;
use crate::utils::error::{AnalyzerError, Result};
use std::sync::Arc;

pub const BILL_ANALYZER: &str = "bill_analyzer";
pub const WEB_RESEARCHER: &str = "web_researcher";
pub const REPORT_GENERATOR: &str = "report_generator";

#[derive(Debug, Clone)]
pub struct StageSettings {
    pub model: String,
    pub max_tokens: u32,
}

fn missing_input(stage: &str, what: &str) -> AnalyzerError {
    AnalyzerError::ConfigError {
        message: format!("{} requires {} from an earlier stage", stage, what),
    }
}

/// Extracts cost, usage and rate from the PDF itself.
pub struct BillAnalyzer {
    api: Arc<dyn MessagesApi>,
    settings: StageSettings,
}

impl BillAnalyzer {
    pub fn new(api: Arc<dyn MessagesApi>, settings: StageSettings) -> Self {
        Self { api, settings }
    }

    fn build_request(&self, context: &AnalysisContext) -> MessageRequest {
        MessageRequest::new(&self.settings.model, self.settings.max_tokens).with_user(
            MessageContent::Blocks(vec![
                RequestBlock::pdf_base64(context.document.to_base64()),
                RequestBlock::text(prompts::EXTRACTION_PROMPT),
            ]),
        )
    }
}

#[async_trait::async_trait]
impl AnalysisStage for BillAnalyzer {
    fn get_name(&self) -> &str {
        BILL_ANALYZER
    }

    fn label(&self) -> &str {
        "🔍 Agent #1 analyzing bill"
    }

    async fn run(&self, context: &AnalysisContext) -> Result<StageOutput> {
        let request = self.build_request(context);
        let response = self.api.create_message(&request).await?;
        let bill: BillAnalysis = parse_reply(BILL_ANALYZER, &response.text())?;

        tracing::info!(
            "📄 Extracted bill: ${} for {} kWh at ${}/kWh ({})",
            bill.total_cost,
            bill.usage,
            bill.rate_per_kwh,
            bill.billing_period
        );
        Ok(StageOutput::Bill(bill))
    }
}

/// Looks up industry benchmarks for the extracted rate, with web search.
pub struct WebResearcher {
    api: Arc<dyn MessagesApi>,
    settings: StageSettings,
    web_search: bool,
    max_searches: Option<u32>,
}

impl WebResearcher {
    pub fn new(api: Arc<dyn MessagesApi>, settings: StageSettings) -> Self {
        Self {
            api,
            settings,
            web_search: true,
            max_searches: None,
        }
    }

    pub fn with_web_search(mut self, enabled: bool, max_searches: Option<u32>) -> Self {
        self.web_search = enabled;
        self.max_searches = max_searches;
        self
    }

    fn build_request(&self, query: &str) -> MessageRequest {
        let request = MessageRequest::new(&self.settings.model, self.settings.max_tokens)
            .with_user(MessageContent::Text(prompts::research_prompt(query)));
        if self.web_search {
            request.with_tool(Tool::web_search(self.max_searches))
        } else {
            request
        }
    }
}

#[async_trait::async_trait]
impl AnalysisStage for WebResearcher {
    fn get_name(&self) -> &str {
        WEB_RESEARCHER
    }

    fn label(&self) -> &str {
        "🌐 Agent #2 researching industry benchmarks"
    }

    async fn run(&self, context: &AnalysisContext) -> Result<StageOutput> {
        let bill = context
            .bill_analysis
            .as_ref()
            .ok_or_else(|| missing_input(WEB_RESEARCHER, "a bill analysis"))?;

        let query = bill.benchmark_query();
        tracing::debug!("🔎 Research query: {}", query);

        let response = self.api.create_message(&self.build_request(&query)).await?;

        // A reply that does not parse degrades to generic benchmarks
        // instead of failing the run.
        let output = match parse_reply::<IndustryResearch>(WEB_RESEARCHER, &response.text()) {
            Ok(research) => StageOutput::Research {
                research,
                fallback_used: false,
            },
            Err(e) => {
                tracing::warn!("⚠️ Using fallback benchmarks: {}", e);
                StageOutput::Research {
                    research: IndustryResearch::fallback(),
                    fallback_used: true,
                }
            }
        };
        Ok(output)
    }
}

/// Combines the bill and the benchmarks into the final report.
pub struct ReportGenerator {
    api: Arc<dyn MessagesApi>,
    settings: StageSettings,
}

impl ReportGenerator {
    pub fn new(api: Arc<dyn MessagesApi>, settings: StageSettings) -> Self {
        Self { api, settings }
    }
}

#[async_trait::async_trait]
impl AnalysisStage for ReportGenerator {
    fn get_name(&self) -> &str {
        REPORT_GENERATOR
    }

    fn label(&self) -> &str {
        "📊 Agent #3 generating final report"
    }

    async fn run(&self, context: &AnalysisContext) -> Result<StageOutput> {
        let bill = context
            .bill_analysis
            .as_ref()
            .ok_or_else(|| missing_input(REPORT_GENERATOR, "a bill analysis"))?;
        let research = context
            .web_research
            .as_ref()
            .ok_or_else(|| missing_input(REPORT_GENERATOR, "industry research"))?;

        let request = MessageRequest::new(&self.settings.model, self.settings.max_tokens)
            .with_user(MessageContent::Text(prompts::report_prompt(bill, research)?));
        let response = self.api.create_message(&request).await?;
        let report: FinalReport = parse_reply(REPORT_GENERATOR, &response.text())?;

        Ok(StageOutput::Report(report))
    }
}
