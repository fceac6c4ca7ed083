pub mod analyzer;
pub mod prompts;
pub mod reply;
pub mod sequence;
pub mod stages;

pub use crate::domain::model::{AnalysisReport, BillAnalysis, FinalReport, IndustryResearch};
pub use crate::domain::ports::{ConfigProvider, MessagesApi, Storage};
pub use crate::utils::error::Result;
