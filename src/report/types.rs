use crate::automation::{ApproveWithMergeOutcome, AutoApproveCandidate};
use crate::risk::AnalysisResult;

/// How the outcome banner should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Positive,
    Negative,
}

/// Counts over a finished batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeSummary {
    /// Outcomes whose approval succeeded
    pub approved: usize,
    /// Remaining outcomes
    pub failed: usize,
    /// Raw transport error when the batch did not run
    pub error: Option<String>,
}

impl OutcomeSummary {
    pub fn tone(&self) -> Tone {
        if self.failed > 0 || self.error.is_some() {
            Tone::Negative
        } else {
            Tone::Positive
        }
    }

    pub fn headline(&self) -> String {
        match &self.error {
            Some(error) => format!("Auto-approve failed: {}", error),
            None => format!("{} approved, {} failed", self.approved, self.failed),
        }
    }
}

/// Risk annotation of one pull request; `analysis` is None while pending
/// or when the analysis failed.
#[derive(Debug, Clone)]
pub struct RiskRow {
    pub pr_number: u64,
    pub title: String,
    pub analysis: Option<AnalysisResult>,
}

/// Everything shown at the end of a run.
#[derive(Debug)]
pub struct Report {
    /// "owner/repo"
    pub scope: String,
    pub rows: Vec<RiskRow>,
    /// Candidates that were proposed, whether or not the batch ran
    pub candidates: Vec<AutoApproveCandidate>,
    pub outcomes: Vec<ApproveWithMergeOutcome>,
    pub summary: Option<OutcomeSummary>,
    /// Why no batch ran (disabled, nothing qualified, cancelled, error)
    pub notice: Option<String>,
}
