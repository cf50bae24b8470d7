use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{
    approve_then_merge, candidate_for, AnalysisClient, AutomationService, BackendError,
    ReviewActions, RiskAnalysis, StepError,
};
use crate::automation::{
    ApproveWithMergeOutcome, AutoApproveCandidate, AutomationConfig, BatchResponse, MergeMethod,
};
use crate::pr::diff::parse_diff;
use crate::pr::{PullRequest, PullSummary, RepoScope, RequestKey};
use crate::risk::{self, RiskLevel};

/// A pull request served by [`MockBackend`].
#[derive(Debug, Clone)]
pub struct MockPull {
    pub number: u64,
    pub title: String,
    pub author: String,
    pub diff: String,
    pub draft: bool,
    /// Simulated round-trip time of an analysis
    pub latency: Duration,
    /// Approval is rejected with this message
    pub approve_error: Option<String>,
    /// Merge is rejected with this reason
    pub merge_error: Option<String>,
}

impl MockPull {
    /// A pull request whose diff touches `files` as `(path, additions, deletions)`.
    pub fn new(number: u64, title: &str, files: &[(&str, usize, usize)]) -> Self {
        Self {
            number,
            title: title.to_string(),
            author: "octocat".to_string(),
            diff: synthetic_diff(files),
            draft: false,
            latency: Duration::from_millis(10),
            approve_error: None,
            merge_error: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn draft(mut self) -> Self {
        self.draft = true;
        self
    }

    pub fn rejecting_approval(mut self, error: &str) -> Self {
        self.approve_error = Some(error.to_string());
        self
    }

    pub fn rejecting_merge(mut self, reason: &str) -> Self {
        self.merge_error = Some(reason.to_string());
        self
    }
}

/// Build a unified diff with one hunk per file.
fn synthetic_diff(files: &[(&str, usize, usize)]) -> String {
    let mut diff = String::new();
    for (path, additions, deletions) in files {
        diff.push_str(&format!("diff --git a/{path} b/{path}\n--- a/{path}\n+++ b/{path}\n"));
        diff.push_str(&format!("@@ -1,{} +1,{} @@\n", deletions, additions));
        for i in 0..*deletions {
            diff.push_str(&format!("-old line {}\n", i));
        }
        for i in 0..*additions {
            diff.push_str(&format!("+new line {}\n", i));
        }
    }
    diff
}

/// Batch request as received by the mock.
#[derive(Debug, Clone)]
pub struct RecordedBatch {
    pub candidates: Vec<AutoApproveCandidate>,
    pub config: AutomationConfig,
}

#[derive(Debug, Default)]
struct Script {
    config_error: Option<String>,
    evaluate_error: Option<String>,
    batch_error: Option<String>,
    candidates: Option<Vec<AutoApproveCandidate>>,
    outcomes: Option<Vec<ApproveWithMergeOutcome>>,
    failing_analyses: HashSet<u64>,
    batches: Vec<RecordedBatch>,
    /// Delay before evaluation and batch calls answer
    service_latency: Duration,
}

/// In-memory backend for demos and tests.
///
/// Scores fixture diffs with the same rules as [`super::GitHubBackend`].
/// Individual calls can be scripted to fail or to return canned data, and
/// analysis calls are counted together with their peak concurrency.
pub struct MockBackend {
    pulls: HashMap<u64, MockPull>,
    automation: AutomationConfig,
    script: Mutex<Script>,
    analysis_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockBackend {
    pub fn new(automation: AutomationConfig) -> Self {
        Self {
            pulls: HashMap::new(),
            automation,
            script: Mutex::new(Script::default()),
            analysis_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Fixture repository used by `--mock`.
    pub fn demo() -> Self {
        let automation = AutomationConfig {
            enabled: true,
            auto_approve_max_risk: RiskLevel::Low,
            enable_auto_merge: true,
            merge_method: MergeMethod::Squash,
            ..AutomationConfig::default()
        };
        Self::new(automation)
            .with_pull(
                MockPull::new(101, "Fix typo in README", &[("README.md", 2, 2)])
                    .with_latency(Duration::from_millis(40)),
            )
            .with_pull(
                MockPull::new(
                    102,
                    "Add retry to HTTP client",
                    &[("src/http/client.rs", 30, 5), ("tests/http_client.rs", 25, 0)],
                )
                .with_latency(Duration::from_millis(120)),
            )
            .with_pull(
                MockPull::new(
                    103,
                    "Refactor session handling",
                    &[("src/auth/session.rs", 80, 40)],
                )
                .with_latency(Duration::from_millis(90)),
            )
            .with_pull(
                MockPull::new(
                    104,
                    "Bump serde to 1.0.210",
                    &[("Cargo.toml", 1, 1), ("Cargo.lock", 20, 20)],
                )
                .with_latency(Duration::from_millis(60))
                .rejecting_merge("Pull Request is not mergeable"),
            )
            .with_pull(
                MockPull::new(
                    105,
                    "Update contributing guide",
                    &[("docs/CONTRIBUTING.md", 12, 3)],
                )
                .with_latency(Duration::from_millis(30))
                .rejecting_approval("403: Resource not accessible by integration"),
            )
            .with_pull(
                MockPull::new(106, "WIP: billing export", &[("src/billing/export.rs", 60, 0)])
                    .draft(),
            )
    }

    pub fn with_pull(mut self, pull: MockPull) -> Self {
        self.pulls.insert(pull.number, pull);
        self
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fail_config(&self, message: &str) {
        self.script().config_error = Some(message.to_string());
    }

    pub fn fail_evaluation(&self, message: &str) {
        self.script().evaluate_error = Some(message.to_string());
    }

    pub fn fail_batch(&self, message: &str) {
        self.script().batch_error = Some(message.to_string());
    }

    /// Return `candidates` verbatim from `evaluate_candidates`.
    pub fn script_candidates(&self, candidates: Vec<AutoApproveCandidate>) {
        self.script().candidates = Some(candidates);
    }

    /// Return `outcomes` verbatim from `run_approve_with_merge`.
    pub fn script_outcomes(&self, outcomes: Vec<ApproveWithMergeOutcome>) {
        self.script().outcomes = Some(outcomes);
    }

    pub fn set_service_latency(&self, latency: Duration) {
        self.script().service_latency = latency;
    }

    /// Make analyses of `pr_number` fail (or succeed again).
    pub fn set_analysis_failure(&self, pr_number: u64, failing: bool) {
        let mut script = self.script();
        if failing {
            script.failing_analyses.insert(pr_number);
        } else {
            script.failing_analyses.remove(&pr_number);
        }
    }

    pub fn analysis_calls(&self) -> usize {
        self.analysis_calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn batches(&self) -> Vec<RecordedBatch> {
        self.script().batches.clone()
    }

    fn pull(&self, pr_number: u64) -> Result<&MockPull, BackendError> {
        self.pulls
            .get(&pr_number)
            .ok_or_else(|| {
                BackendError::Failed(format!("404: pull request #{} not found", pr_number))
            })
    }

    fn summary(pull: &MockPull) -> PullSummary {
        PullSummary {
            number: pull.number,
            title: pull.title.clone(),
            draft: pull.draft,
        }
    }

    fn sorted_pulls(&self) -> Vec<&MockPull> {
        let mut pulls: Vec<&MockPull> = self.pulls.values().collect();
        pulls.sort_by_key(|p| p.number);
        pulls
    }

    fn score(
        &self,
        pull: &MockPull,
        config: &AutomationConfig,
    ) -> Result<RiskAnalysis, BackendError> {
        let files = parse_diff(&pull.diff)?;
        let pr = PullRequest {
            number: pull.number,
            title: pull.title.clone(),
            author: pull.author.clone(),
            files,
        };
        Ok(risk::assess(&pr, &config.risk).into())
    }
}

#[async_trait]
impl AnalysisClient for MockBackend {
    async fn analyze_risk(&self, key: &RequestKey) -> Result<RiskAnalysis, BackendError> {
        self.analysis_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = self.pulls.get(&key.pr_number).map(|p| p.latency).unwrap_or_default();
        tokio::time::sleep(latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.script().failing_analyses.contains(&key.pr_number) {
            return Err(BackendError::Failed(format!("analysis of {} failed", key)));
        }
        let pull = self.pull(key.pr_number)?;
        debug!(pr = %key, "mock analysis complete");
        self.score(pull, &self.automation)
    }

    async fn open_pull_requests(
        &self,
        _scope: &RepoScope,
    ) -> Result<Vec<PullSummary>, BackendError> {
        Ok(self.sorted_pulls().into_iter().map(Self::summary).collect())
    }
}

#[async_trait]
impl AutomationService for MockBackend {
    async fn load_automation_config(
        &self,
        _scope: &RepoScope,
    ) -> Result<AutomationConfig, BackendError> {
        if let Some(message) = self.script().config_error.clone() {
            return Err(BackendError::Failed(message));
        }
        Ok(self.automation.clone())
    }

    async fn evaluate_candidates(
        &self,
        _scope: &RepoScope,
    ) -> Result<Vec<AutoApproveCandidate>, BackendError> {
        let latency = self.script().service_latency;
        tokio::time::sleep(latency).await;
        {
            let script = self.script();
            if let Some(message) = &script.evaluate_error {
                return Err(BackendError::Failed(message.clone()));
            }
            if let Some(candidates) = &script.candidates {
                return Ok(candidates.clone());
            }
        }

        let mut candidates = Vec::new();
        for pull in self.sorted_pulls().into_iter().filter(|p| !p.draft) {
            let analysis = self.score(pull, &self.automation)?;
            let summary = Self::summary(pull);
            if let Some(candidate) = candidate_for(&summary, &analysis.result, &self.automation) {
                candidates.push(candidate);
            }
        }
        Ok(candidates)
    }

    async fn run_approve_with_merge(
        &self,
        scope: &RepoScope,
        candidates: &[AutoApproveCandidate],
        config: &AutomationConfig,
    ) -> Result<BatchResponse, BackendError> {
        let latency = self.script().service_latency;
        tokio::time::sleep(latency).await;
        let scripted = {
            let mut script = self.script();
            script.batches.push(RecordedBatch {
                candidates: candidates.to_vec(),
                config: config.clone(),
            });
            if let Some(message) = &script.batch_error {
                return Err(BackendError::Failed(message.clone()));
            }
            script.outcomes.clone()
        };
        if let Some(outcomes) = scripted {
            return Ok(BatchResponse { outcomes });
        }
        approve_then_merge(self, scope, candidates, config).await
    }
}

#[async_trait]
impl ReviewActions for MockBackend {
    async fn approve(&self, key: &RequestKey) -> Result<(), StepError> {
        match self.pulls.get(&key.pr_number) {
            None => Err(StepError::Rejected("404: Not Found".to_string())),
            Some(pull) => match &pull.approve_error {
                Some(error) => Err(StepError::Rejected(error.clone())),
                None => Ok(()),
            },
        }
    }

    async fn merge(&self, key: &RequestKey, _method: MergeMethod) -> Result<(), StepError> {
        match self.pulls.get(&key.pr_number).and_then(|p| p.merge_error.clone()) {
            Some(reason) => Err(StepError::Rejected(reason)),
            None => Ok(()),
        }
    }
}
