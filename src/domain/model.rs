use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// An uploaded bill as read from storage.
#[derive(Debug, Clone)]
pub struct BillDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl BillDocument {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// File name without directories or extension, used for output names.
    pub fn stem(&self) -> &str {
        std::path::Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("bill")
    }
}

/// Structured data pulled out of the bill by the extraction stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillAnalysis {
    pub total_cost: f64,
    pub usage: f64,
    pub rate_per_kwh: f64,
    pub billing_period: String,
    #[serde(default)]
    pub unusual_charges: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights: Option<String>,
}

impl BillAnalysis {
    /// Query handed to the research stage.
    pub fn benchmark_query(&self) -> String {
        format!(
            "energy rate {} kWh industry benchmark",
            self.rate_per_kwh
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndustryResearch {
    pub average_rate: f64,
    pub typical_usage: String,
    #[serde(default)]
    pub recommendations: Vec<serde_json::Value>,
    #[serde(default)]
    pub sources: Vec<serde_json::Value>,
}

impl IndustryResearch {
    /// Substituted when the research reply cannot be parsed.
    pub fn fallback() -> Self {
        Self {
            average_rate: 0.13,
            typical_usage: "Based on industry standards".to_string(),
            recommendations: vec![
                "Monitor peak usage".into(),
                "Consider energy-efficient appliances".into(),
            ],
            sources: vec!["Industry data".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalReport {
    pub summary: String,
    pub comparison: String,
    #[serde(default)]
    pub savings: Vec<serde_json::Value>,
    #[serde(default)]
    pub next_steps: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub duration_ms: u64,
}

/// Everything a run produced. Later sections are `None` when their stage
/// did not complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub execution_id: String,
    pub file_name: String,
    pub model: String,
    pub generated_at: DateTime<Utc>,
    pub bill_analysis: Option<BillAnalysis>,
    pub web_research: Option<IndustryResearch>,
    pub final_report: Option<FinalReport>,
    #[serde(default)]
    pub research_fallback_used: bool,
    #[serde(default)]
    pub stages: Vec<StageTiming>,
}

impl AnalysisReport {
    pub fn is_complete(&self) -> bool {
        self.bill_analysis.is_some() && self.web_research.is_some() && self.final_report.is_some()
    }

    pub fn has_results(&self) -> bool {
        self.bill_analysis.is_some()
    }
}

/// Renders a list entry the model returned. Strings are shown as-is,
/// anything else as compact JSON.
pub fn display_item(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(map) => {
            let text = ["description", "name", "text", "title"]
                .iter()
                .find_map(|key| map.get(*key).and_then(|v| v.as_str()));
            match (text, map.get("amount")) {
                (Some(text), Some(amount)) => format!("{} ({})", text, amount),
                (Some(text), None) => text.to_string(),
                _ => value.to_string(),
            }
        }
        other => other.to_string(),
    }
}
