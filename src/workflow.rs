use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::automation::{ApproveWithMergeOutcome, AutoApproveCandidate, AutomationConfig};
use crate::backend::AutomationService;
use crate::pr::RepoScope;
use crate::report::{self, OutcomeSummary};

/// Stage of the auto-approve workflow. Each variant carries only the data
/// valid in that stage.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowPhase {
    Idle,
    Evaluating,
    /// Waiting for the user to confirm the proposed batch
    Confirm {
        candidates: Vec<AutoApproveCandidate>,
        config: AutomationConfig,
    },
    Executing,
    /// `error` holds the raw transport error when the batch could not run
    Done {
        outcomes: Vec<ApproveWithMergeOutcome>,
        error: Option<String>,
    },
}

impl WorkflowPhase {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowPhase::Idle => "idle",
            WorkflowPhase::Evaluating => "evaluating",
            WorkflowPhase::Confirm { .. } => "confirm",
            WorkflowPhase::Executing => "executing",
            WorkflowPhase::Done { .. } => "done",
        }
    }
}

/// Failure at a phase boundary, kept as the workflow's displayed message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhaseError {
    #[error("Could not load automation settings: {0}")]
    ConfigLoad(String),

    #[error("Risk evaluation failed: {0}")]
    Evaluation(String),

    #[error("{0}")]
    Execution(String),

    #[error("The {0} was interrupted before it finished")]
    Interrupted(&'static str),
}

/// An action was requested in a phase that does not define it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} while the workflow is {phase}")]
pub struct TransitionError {
    pub action: &'static str,
    pub phase: &'static str,
}

/// Drives idle -> evaluating -> (idle | confirm) -> executing -> done.
///
/// Backend failures never escape: they become [`AutomationWorkflow::error`]
/// and the workflow settles in a stable phase. The only `Err` returned is a
/// [`TransitionError`] for calling an action from the wrong phase.
pub struct AutomationWorkflow {
    scope: RepoScope,
    service: Arc<dyn AutomationService>,
    phase: WorkflowPhase,
    error: Option<PhaseError>,
    evaluated: bool,
}

impl AutomationWorkflow {
    pub fn new(scope: RepoScope, service: Arc<dyn AutomationService>) -> Self {
        Self {
            scope,
            service,
            phase: WorkflowPhase::Idle,
            error: None,
            evaluated: false,
        }
    }

    pub fn phase(&self) -> &WorkflowPhase {
        &self.phase
    }

    /// Latest phase-boundary error, if any.
    pub fn error(&self) -> Option<&PhaseError> {
        self.error.as_ref()
    }

    /// True once an evaluation completed, including one that found nothing.
    pub fn evaluated(&self) -> bool {
        self.evaluated
    }

    /// Candidates awaiting confirmation; empty outside `confirm`.
    pub fn candidates(&self) -> &[AutoApproveCandidate] {
        match &self.phase {
            WorkflowPhase::Confirm { candidates, .. } => candidates,
            _ => &[],
        }
    }

    /// Batch outcomes; empty outside `done`.
    pub fn outcomes(&self) -> &[ApproveWithMergeOutcome] {
        match &self.phase {
            WorkflowPhase::Done { outcomes, .. } => outcomes,
            _ => &[],
        }
    }

    /// Aggregated counts, available once `done`.
    pub fn summary(&self) -> Option<OutcomeSummary> {
        match &self.phase {
            WorkflowPhase::Done { outcomes, error } => {
                Some(report::summarize(outcomes, error.as_deref()))
            }
            _ => None,
        }
    }

    fn require(&self, action: &'static str, allowed: bool) -> Result<(), TransitionError> {
        if allowed {
            Ok(())
        } else {
            Err(TransitionError {
                action,
                phase: self.phase.name(),
            })
        }
    }

    fn set_phase(&mut self, next: WorkflowPhase) -> WorkflowPhase {
        info!(
            scope = %self.scope,
            from = self.phase.name(),
            to = next.name(),
            "workflow transition"
        );
        mem::replace(&mut self.phase, next)
    }

    fn fail(&mut self, error: PhaseError) {
        warn!(scope = %self.scope, error = %error, "workflow phase failed");
        self.error = Some(error);
        self.set_phase(WorkflowPhase::Idle);
    }

    /// Load the automation config and, if enabled, ask the service for
    /// candidates. Ends in `confirm` when there are any, otherwise `idle`.
    ///
    /// The candidate list is shown exactly as returned; risk filtering is
    /// the service's job.
    pub async fn evaluate(&mut self) -> Result<(), TransitionError> {
        self.require("evaluate", matches!(self.phase, WorkflowPhase::Idle))?;
        self.error = None;
        self.evaluated = false;
        self.set_phase(WorkflowPhase::Evaluating);

        let mut run = SettleOnDrop(self);
        run.run_evaluation().await;
        Ok(())
    }

    async fn run_evaluation(&mut self) {
        let config = match self.service.load_automation_config(&self.scope).await {
            Ok(config) => config,
            Err(e) => {
                self.fail(PhaseError::ConfigLoad(e.to_string()));
                return;
            }
        };

        if !config.enabled {
            info!(scope = %self.scope, "automation disabled; nothing to evaluate");
            self.set_phase(WorkflowPhase::Idle);
            return;
        }

        match self.service.evaluate_candidates(&self.scope).await {
            Err(e) => self.fail(PhaseError::Evaluation(e.to_string())),
            Ok(candidates) => {
                self.evaluated = true;
                info!(scope = %self.scope, candidates = candidates.len(), "evaluation complete");
                if candidates.is_empty() {
                    self.set_phase(WorkflowPhase::Idle);
                } else {
                    self.set_phase(WorkflowPhase::Confirm { candidates, config });
                }
            }
        }
    }

    /// Run the confirmed batch. Always ends in `done`: a transport failure
    /// yields no outcomes and keeps the raw error text.
    pub async fn confirm(&mut self) -> Result<(), TransitionError> {
        self.require("confirm", matches!(self.phase, WorkflowPhase::Confirm { .. }))?;
        let (candidates, config) = match self.set_phase(WorkflowPhase::Executing) {
            WorkflowPhase::Confirm { candidates, config } => (candidates, config),
            other => {
                self.phase = other;
                return Err(TransitionError {
                    action: "confirm",
                    phase: self.phase.name(),
                });
            }
        };

        let mut run = SettleOnDrop(self);
        run.run_batch(candidates, config).await;
        Ok(())
    }

    async fn run_batch(&mut self, candidates: Vec<AutoApproveCandidate>, config: AutomationConfig) {
        let done = match self
            .service
            .run_approve_with_merge(&self.scope, &candidates, &config)
            .await
        {
            Ok(response) => WorkflowPhase::Done {
                outcomes: response.outcomes,
                error: None,
            },
            Err(e) => {
                let raw = e.to_string();
                warn!(scope = %self.scope, error = %raw, "approve+merge batch failed");
                self.error = Some(PhaseError::Execution(raw.clone()));
                WorkflowPhase::Done {
                    outcomes: Vec::new(),
                    error: Some(raw),
                }
            }
        };
        self.set_phase(done);
    }

    /// Discard the proposed candidates.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.require("cancel", matches!(self.phase, WorkflowPhase::Confirm { .. }))?;
        self.evaluated = false;
        self.set_phase(WorkflowPhase::Idle);
        Ok(())
    }

    /// Discard the outcomes of a finished batch.
    pub fn reset(&mut self) -> Result<(), TransitionError> {
        self.require("reset", matches!(self.phase, WorkflowPhase::Done { .. }))?;
        self.error = None;
        self.set_phase(WorkflowPhase::Idle);
        Ok(())
    }
}

/// Holds the workflow while `evaluate` or `confirm` awaits the service.
/// If the future is dropped before the operation settles, the workflow is
/// moved out of `evaluating`/`executing` so it never stays stuck there.
struct SettleOnDrop<'a>(&'a mut AutomationWorkflow);

impl Deref for SettleOnDrop<'_> {
    type Target = AutomationWorkflow;

    fn deref(&self) -> &AutomationWorkflow {
        &*self.0
    }
}

impl DerefMut for SettleOnDrop<'_> {
    fn deref_mut(&mut self) -> &mut AutomationWorkflow {
        &mut *self.0
    }
}

impl Drop for SettleOnDrop<'_> {
    fn drop(&mut self) {
        let workflow = &mut *self.0;
        match workflow.phase {
            WorkflowPhase::Evaluating => workflow.fail(PhaseError::Interrupted("evaluation")),
            WorkflowPhase::Executing => {
                // Some candidates may have been approved; their outcomes are unknown
                let error = PhaseError::Interrupted("auto-approve batch");
                warn!(scope = %workflow.scope, error = %error, "workflow phase failed");
                let raw = error.to_string();
                workflow.error = Some(error);
                workflow.set_phase(WorkflowPhase::Done {
                    outcomes: Vec::new(),
                    error: Some(raw),
                });
            }
            _ => {}
        }
    }
}
