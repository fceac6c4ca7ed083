use crate::domain::model::{BillAnalysis, IndustryResearch};
use crate::utils::error::Result;

pub const EXTRACTION_PROMPT: &str = "Analyze this energy bill. Extract: total cost, usage (kWh), rate per kWh, billing period, any unusual charges.
Respond ONLY with valid JSON (no markdown):
{\"totalCost\": number, \"usage\": number, \"ratePerKwh\": number, \"billingPeriod\": \"string\", \"unusualCharges\": [], \"insights\": \"string\"}";

pub fn research_prompt(context: &str) -> String {
    format!(
        "Research industry benchmarks for: {}
Find average rates, typical usage patterns, and cost-saving recommendations.
Respond ONLY with valid JSON (no markdown):
{{\"averageRate\": number, \"typicalUsage\": \"string\", \"recommendations\": [], \"sources\": []}}",
        context
    )
}

pub fn report_prompt(bill: &BillAnalysis, research: &IndustryResearch) -> Result<String> {
    Ok(format!(
        "Generate a concise energy analysis report.
Bill data: {}
Research data: {}
Respond ONLY with valid JSON (no markdown):
{{\"summary\": \"string\", \"comparison\": \"string\", \"savings\": [], \"nextSteps\": []}}",
        serde_json::to_string(bill)?,
        serde_json::to_string(research)?
    ))
}
