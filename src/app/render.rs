//! Presentation of an [`AnalysisReport`]: one panel per stage, as terminal
//! text, Markdown or JSON. Panels whose stage did not complete are left out.

use crate::domain::model::{
    display_item, AnalysisReport, BillAnalysis, FinalReport, IndustryResearch,
};
use crate::utils::error::Result;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum DisplayFormat {
    Text,
    Markdown,
    Json,
}

pub fn render(report: &AnalysisReport, format: DisplayFormat) -> Result<String> {
    match format {
        DisplayFormat::Text => Ok(render_text(report)),
        DisplayFormat::Markdown => Ok(render_markdown(report)),
        DisplayFormat::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}

const RULE: &str = "────────────────────────────────────────────────────────";

pub fn render_text(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "📊 Results ({})", report.file_name);

    if let Some(bill) = &report.bill_analysis {
        text_bill_panel(&mut out, bill);
    }
    if let Some(research) = &report.web_research {
        text_research_panel(&mut out, research, report.research_fallback_used);
    }
    if let Some(final_report) = &report.final_report {
        text_report_panel(&mut out, final_report);
    }

    let _ = writeln!(out, "{}", RULE);
    out
}

fn text_bill_panel(out: &mut String, bill: &BillAnalysis) {
    let _ = writeln!(out, "\n🔍 Agent #1: Bill Analysis");
    let _ = writeln!(out, "  {:<16}${}", "Total Cost", bill.total_cost);
    let _ = writeln!(out, "  {:<16}{} kWh", "Usage", bill.usage);
    let _ = writeln!(out, "  {:<16}${}", "Rate per kWh", bill.rate_per_kwh);
    let _ = writeln!(out, "  {:<16}{}", "Billing Period", bill.billing_period);

    if !bill.unusual_charges.is_empty() {
        let _ = writeln!(out, "  Unusual charges:");
        for charge in &bill.unusual_charges {
            let _ = writeln!(out, "    - {}", display_item(charge));
        }
    }
    if let Some(insights) = bill.insights.as_deref().filter(|s| !s.is_empty()) {
        let _ = writeln!(out, "  💡 Insights: {}", insights);
    }
}

fn text_research_panel(out: &mut String, research: &IndustryResearch, fallback: bool) {
    let _ = writeln!(out, "\n🌐 Agent #2: Industry Research");
    let _ = writeln!(
        out,
        "  Average Industry Rate  ${}/kWh{}",
        research.average_rate,
        if fallback { "  (generic estimate)" } else { "" }
    );
    let _ = writeln!(out, "  Typical Usage          {}", research.typical_usage);

    let _ = writeln!(out, "  Recommendations");
    for rec in &research.recommendations {
        let _ = writeln!(out, "    - {}", display_item(rec));
    }
    if !research.sources.is_empty() {
        let _ = writeln!(out, "  Sources");
        for source in &research.sources {
            let _ = writeln!(out, "    - {}", display_item(source));
        }
    }
}

fn text_report_panel(out: &mut String, report: &FinalReport) {
    let _ = writeln!(out, "\n📋 Agent #3: Final Report");
    let _ = writeln!(out, "  Executive Summary\n    {}", report.summary);
    let _ = writeln!(out, "  Comparison\n    {}", report.comparison);

    let _ = writeln!(out, "  💰 Potential Savings");
    for saving in &report.savings {
        let _ = writeln!(out, "    ✔ {}", display_item(saving));
    }
    let _ = writeln!(out, "  📝 Next Steps");
    for step in &report.next_steps {
        let _ = writeln!(out, "    → {}", display_item(step));
    }
}

pub fn render_markdown(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Energy Bill Analysis: {}\n", report.file_name);
    let _ = writeln!(
        out,
        "_Run `{}` with `{}` at {}_\n",
        report.execution_id,
        report.model,
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    if let Some(bill) = &report.bill_analysis {
        let _ = writeln!(out, "## 🔍 Bill Analysis\n");
        let _ = writeln!(out, "| Metric | Value |\n|---|---|");
        let _ = writeln!(out, "| Total Cost | ${} |", bill.total_cost);
        let _ = writeln!(out, "| Usage | {} kWh |", bill.usage);
        let _ = writeln!(out, "| Rate per kWh | ${} |", bill.rate_per_kwh);
        let _ = writeln!(out, "| Billing Period | {} |\n", bill.billing_period);
        if !bill.unusual_charges.is_empty() {
            let _ = writeln!(out, "**Unusual charges:**\n");
            markdown_list(&mut out, &bill.unusual_charges);
        }
        if let Some(insights) = bill.insights.as_deref().filter(|s| !s.is_empty()) {
            let _ = writeln!(out, "> **Insights:** {}\n", insights);
        }
    }

    if let Some(research) = &report.web_research {
        let _ = writeln!(out, "## 🌐 Industry Research\n");
        let _ = writeln!(
            out,
            "**Average Industry Rate:** ${}/kWh{}\n",
            research.average_rate,
            if report.research_fallback_used {
                " (generic estimate)"
            } else {
                ""
            }
        );
        let _ = writeln!(out, "**Typical Usage:** {}\n", research.typical_usage);
        let _ = writeln!(out, "### Recommendations\n");
        markdown_list(&mut out, &research.recommendations);
        if !research.sources.is_empty() {
            let _ = writeln!(out, "### Sources\n");
            markdown_list(&mut out, &research.sources);
        }
    }

    if let Some(final_report) = &report.final_report {
        let _ = writeln!(out, "## 📋 Final Report\n");
        let _ = writeln!(out, "### Executive Summary\n\n{}\n", final_report.summary);
        let _ = writeln!(out, "### Comparison\n\n{}\n", final_report.comparison);
        let _ = writeln!(out, "### 💰 Potential Savings\n");
        markdown_list(&mut out, &final_report.savings);
        let _ = writeln!(out, "### 📝 Next Steps\n");
        markdown_list(&mut out, &final_report.next_steps);
    }

    out
}

fn markdown_list(out: &mut String, items: &[serde_json::Value]) {
    for item in items {
        let _ = writeln!(out, "- {}", display_item(item));
    }
    let _ = writeln!(out);
}
