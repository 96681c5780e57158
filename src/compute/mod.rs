//! Compute engine steps.
//!
//! A step is one unit of the report-processing pipeline. It receives the
//! caller's [`DbSession`] and the context of the report being processed, and
//! delegates the actual work to a domain service. Steps neither retry nor
//! commit; the pipeline owning the session does.

mod digest;

pub use digest::{AnalysisReportService, DigestReportStep};

use serde::{Deserialize, Serialize};

use crate::db::DbSession;
use crate::error::Result;

/// An analysis report queued for processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub id: u64,
    pub project_key: String,
}

/// Component the report belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRef {
    pub key: String,
    pub name: String,
}

/// Everything a step knows about the report it processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeContext {
    pub report: AnalysisReport,
    pub project: ComponentRef,
}

impl ComputeContext {
    pub fn new(report: AnalysisReport, project: ComponentRef) -> Self {
        Self { report, project }
    }
}

/// One pipeline step.
pub trait ComputationStep: Send + Sync {
    /// Short name used in logs.
    fn description(&self) -> &str;

    /// Run the step against `context`, staging writes on `session`.
    ///
    /// # Errors
    ///
    /// Whatever the delegate service returns.
    fn execute(&self, session: &mut DbSession, context: &ComputeContext) -> Result<()>;
}
