use std::sync::Arc;

use tracing::debug;

use super::{ComputationStep, ComputeContext};
use crate::db::DbSession;
use crate::error::Result;

/// Domain service turning a raw analysis report into stored measures.
pub trait AnalysisReportService: Send + Sync {
    /// # Errors
    ///
    /// Implementation defined.
    fn digest(&self, session: &mut DbSession, context: &ComputeContext) -> Result<()>;
}

/// Step digesting the report through [`AnalysisReportService`].
pub struct DigestReportStep {
    service: Arc<dyn AnalysisReportService>,
}

impl DigestReportStep {
    pub fn new(service: Arc<dyn AnalysisReportService>) -> Self {
        Self { service }
    }
}

impl ComputationStep for DigestReportStep {
    fn description(&self) -> &str {
        "Digest analysis report"
    }

    fn execute(&self, session: &mut DbSession, context: &ComputeContext) -> Result<()> {
        debug!(
            report = context.report.id,
            project = %context.project.key,
            "Digesting analysis report"
        );
        self.service.digest(session, context)
    }
}
