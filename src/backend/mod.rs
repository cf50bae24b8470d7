pub mod batch;
pub mod github;
pub mod mock;

pub use batch::{approve_then_merge, ReviewActions, StepError};
pub use github::GitHubBackend;
pub use mock::{MockBackend, MockPull};

use async_trait::async_trait;
use thiserror::Error;

use crate::automation::{AutoApproveCandidate, AutomationConfig, BatchResponse};
use crate::config::ConfigError;
use crate::pr::{PrError, PullSummary, RepoScope, RequestKey};
use crate::risk::{self, AnalysisResult};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    GitHub(#[from] PrError),

    #[error("Failed to load automation config: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Failed(String),
}

/// What an analysis run yields for one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskAnalysis {
    pub result: AnalysisResult,
    /// Secondary assessment, for backends that combine two scoring passes
    pub hybrid: Option<AnalysisResult>,
}

impl From<AnalysisResult> for RiskAnalysis {
    fn from(result: AnalysisResult) -> Self {
        Self {
            result,
            hybrid: None,
        }
    }
}

/// Runs risk analyses for single pull requests.
/// Implementations must be Send + Sync: the scheduler calls them from
/// several worker tasks at once.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    async fn analyze_risk(&self, key: &RequestKey) -> Result<RiskAnalysis, BackendError>;

    /// Open pull requests of the scope, used to pick what to analyze.
    async fn open_pull_requests(&self, scope: &RepoScope) -> Result<Vec<PullSummary>, BackendError>;
}

/// Evaluates and executes the auto-approve workflow for a repository.
#[async_trait]
pub trait AutomationService: Send + Sync {
    async fn load_automation_config(
        &self,
        scope: &RepoScope,
    ) -> Result<AutomationConfig, BackendError>;

    /// Candidates already filtered by the configured risk threshold.
    /// An empty list is a valid result.
    async fn evaluate_candidates(
        &self,
        scope: &RepoScope,
    ) -> Result<Vec<AutoApproveCandidate>, BackendError>;

    /// Approve every candidate, then merge it iff `enable_auto_merge`.
    /// Per-candidate failures are reported in the outcomes; `Err` means the
    /// batch could not be run at all.
    async fn run_approve_with_merge(
        &self,
        scope: &RepoScope,
        candidates: &[AutoApproveCandidate],
        config: &AutomationConfig,
    ) -> Result<BatchResponse, BackendError>;
}

/// Turn an analysis into a candidate when its level is within the
/// configured auto-approve threshold.
pub fn candidate_for(
    pull: &PullSummary,
    result: &AnalysisResult,
    config: &AutomationConfig,
) -> Option<AutoApproveCandidate> {
    if !risk::qualifies(result.level, config.auto_approve_max_risk) {
        return None;
    }
    let mut reason = format!(
        "risk score {} ({}) within auto-approve limit {}",
        result.score, result.level, config.auto_approve_max_risk
    );
    if let Some(top) = result.factors.iter().max_by_key(|f| f.score) {
        reason.push_str(&format!("; top factor: {}", top.description));
    }
    Some(AutoApproveCandidate {
        pr_number: pull.number,
        title: pull.title.clone(),
        risk_level: result.level,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::tests::{test_file, test_pull_request};
    use crate::risk::{assess, RiskLevel};

    fn summary(number: u64) -> PullSummary {
        PullSummary {
            number,
            title: format!("PR {}", number),
            draft: false,
        }
    }

    #[test]
    fn test_candidate_for_respects_threshold() {
        let config = AutomationConfig {
            enabled: true,
            ..AutomationConfig::default()
        };
        let medium = assess(
            &test_pull_request(2, vec![test_file("src/lib.rs", 40, 10)]),
            &config.risk,
        );
        assert_eq!(medium.level, RiskLevel::Medium);
        assert!(candidate_for(&summary(2), &medium, &config).is_none());

        let raised = AutomationConfig {
            auto_approve_max_risk: RiskLevel::Medium,
            ..config
        };
        let candidate = candidate_for(&summary(2), &medium, &raised).unwrap();
        assert_eq!(candidate.pr_number, 2);
        assert_eq!(candidate.risk_level, RiskLevel::Medium);
        assert!(candidate.reason.contains("src/lib.rs"));
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::Failed("connection reset".to_string());
        assert_eq!(err.to_string(), "connection reset");
        let err: BackendError = PrError::MissingToken.into();
        assert!(err.to_string().contains("token"));
    }
}
