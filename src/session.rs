use std::sync::Arc;

use crate::backend::{AnalysisClient, AutomationService};
use crate::pr::RepoScope;
use crate::risk::AnalysisResult;
use crate::scheduler::AnalysisScheduler;
use crate::workflow::AutomationWorkflow;

/// State tied to one repository selection: the analysis cache with its
/// scheduler, and the automation workflow. Dropping the session discards
/// the cache.
pub struct Session {
    scope: RepoScope,
    scheduler: AnalysisScheduler,
    workflow: AutomationWorkflow,
}

impl Session {
    pub fn new(
        scope: RepoScope,
        client: Arc<dyn AnalysisClient>,
        service: Arc<dyn AutomationService>,
        workers: usize,
    ) -> Self {
        Self {
            scheduler: AnalysisScheduler::new(client, workers),
            workflow: AutomationWorkflow::new(scope.clone(), service),
            scope,
        }
    }

    pub fn scope(&self) -> &RepoScope {
        &self.scope
    }

    pub fn scheduler(&self) -> &AnalysisScheduler {
        &self.scheduler
    }

    pub fn workflow(&self) -> &AutomationWorkflow {
        &self.workflow
    }

    pub fn workflow_mut(&mut self) -> &mut AutomationWorkflow {
        &mut self.workflow
    }

    /// Schedule analyses for PRs not yet cached or pending.
    pub fn annotate(&self, pr_numbers: &[u64]) -> usize {
        self.scheduler
            .schedule(pr_numbers.iter().map(|n| self.scope.key(*n)))
    }

    /// Replace the item list: drop every cached analysis, then schedule.
    pub fn refresh(&self, pr_numbers: &[u64]) -> usize {
        self.scheduler.clear();
        self.annotate(pr_numbers)
    }

    pub fn analysis(&self, pr_number: u64) -> Option<AnalysisResult> {
        self.scheduler
            .get(&self.scope.key(pr_number))
            .map(|entry| entry.result)
    }

    pub fn is_pending(&self, pr_number: u64) -> bool {
        self.scheduler.is_pending(&self.scope.key(pr_number))
    }
}
