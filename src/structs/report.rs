use tracing::{info, warn};

use crate::errors::StageWarning;

/* Collects the warnings of one stage so the user gets a single report at the end instead of messages
interleaved with the progress output. */
#[derive(Debug)]
pub struct StageReport {
    stage: &'static str,
    warnings: Vec<StageWarning>,
}

impl StageReport {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            warnings: Vec::new(),
        }
    }

    pub fn extend(&mut self, warnings: impl IntoIterator<Item = StageWarning>) {
        self.warnings.extend(warnings);
    }

    pub fn warnings(&self) -> &[StageWarning] {
        &self.warnings
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn log_summary(&self) {
        if self.warnings.is_empty() {
            info!(stage = self.stage, "completed without warnings");
            return;
        }
        warn!(
            stage = self.stage,
            count = self.warnings.len(),
            "completed with warnings"
        );
        for warning in &self.warnings {
            warn!(stage = self.stage, "{warning}");
        }
    }
}
