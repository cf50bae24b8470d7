use async_trait::async_trait;
use tracing::{debug, warn};

use super::BackendError;
use crate::automation::{
    ApproveWithMergeOutcome, AutoApproveCandidate, AutomationConfig, BatchResponse, MergeMethod,
    MergeStatus,
};
use crate::pr::{RepoScope, RequestKey};

/// Why a single approve or merge call did not go through.
#[derive(Debug)]
pub enum StepError {
    /// The backend answered and refused; recorded on the candidate's outcome
    Rejected(String),
    /// The backend could not be reached; aborts the whole batch
    Unreachable(BackendError),
}

/// The two calls an approve+merge batch is made of.
#[async_trait]
pub trait ReviewActions: Send + Sync {
    async fn approve(&self, key: &RequestKey) -> Result<(), StepError>;

    async fn merge(&self, key: &RequestKey, method: MergeMethod) -> Result<(), StepError>;
}

/// Approve every candidate in order, then merge it iff `enable_auto_merge`.
///
/// A rejected approval yields `SkippedDueToApproveFail`, a rejected merge
/// yields `Failed(reason)`. An unreachable backend fails the batch: no
/// partial outcomes are returned.
pub async fn approve_then_merge(
    actions: &dyn ReviewActions,
    scope: &RepoScope,
    candidates: &[AutoApproveCandidate],
    config: &AutomationConfig,
) -> Result<BatchResponse, BackendError> {
    let mut outcomes = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let key = scope.key(candidate.pr_number);
        match actions.approve(&key).await {
            Ok(()) => {}
            Err(StepError::Rejected(reason)) => {
                warn!(pr = %key, reason = %reason, "approval rejected");
                let outcome = ApproveWithMergeOutcome::approval_failed(candidate.pr_number, reason);
                outcomes.push(outcome);
                continue;
            }
            Err(StepError::Unreachable(e)) => {
                warn!(pr = %key, error = %e, "approval could not be sent; aborting batch");
                return Err(e);
            }
        }

        let merge_status = if !config.enable_auto_merge {
            MergeStatus::Skipped
        } else {
            match actions.merge(&key, config.merge_method).await {
                Ok(()) => MergeStatus::Enabled,
                Err(StepError::Rejected(reason)) => {
                    warn!(pr = %key, reason = %reason, "merge rejected");
                    MergeStatus::Failed(reason)
                }
                Err(StepError::Unreachable(e)) => {
                    warn!(pr = %key, error = %e, "merge could not be sent; aborting batch");
                    return Err(e);
                }
            }
        };
        debug!(pr = %key, merge = %merge_status, "candidate approved");
        outcomes.push(ApproveWithMergeOutcome::approved(candidate.pr_number, merge_status));
    }
    Ok(BatchResponse { outcomes })
}
