use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::{
    approve_then_merge, candidate_for, AnalysisClient, AutomationService, BackendError,
    ReviewActions, RiskAnalysis, StepError,
};
use crate::automation::{AutoApproveCandidate, AutomationConfig, BatchResponse, MergeMethod};
use crate::config::{Config, ConfigError};
use crate::pr::{GitHubClient, PrError, PullSummary, RepoScope, RequestKey};
use crate::risk::{self, RiskConfig};

/// Backend that talks to GitHub directly and scores diffs locally.
///
/// The automation config (risk model included) is re-read from
/// `config_path` on every analysis and evaluation, so annotations and
/// candidates always agree and edits apply without restarting.
pub struct GitHubBackend {
    client: GitHubClient,
    config_path: PathBuf,
}

impl GitHubBackend {
    pub fn new(config: &Config, config_path: impl Into<PathBuf>) -> Result<Self, PrError> {
        Ok(Self {
            client: GitHubClient::new(config)?,
            config_path: config_path.into(),
        })
    }

    async fn read_automation(&self) -> Result<AutomationConfig, BackendError> {
        let path = self.config_path.clone();
        let automation = tokio::task::spawn_blocking(move || Config::load_automation(&path))
            .await
            .map_err(|e| ConfigError::Invalid(format!("config loader panicked: {}", e)))??;
        debug!(
            path = %self.config_path.display(),
            enabled = automation.enabled,
            "loaded automation config"
        );
        Ok(automation)
    }

    async fn analyze_with(
        &self,
        key: &RequestKey,
        risk_config: &RiskConfig,
    ) -> Result<RiskAnalysis, BackendError> {
        let pull = self.client.fetch_pull_request(key).await?;
        Ok(risk::assess(&pull, risk_config).into())
    }
}

#[async_trait]
impl AnalysisClient for GitHubBackend {
    async fn analyze_risk(&self, key: &RequestKey) -> Result<RiskAnalysis, BackendError> {
        let automation = self.read_automation().await?;
        self.analyze_with(key, &automation.risk).await
    }

    async fn open_pull_requests(
        &self,
        scope: &RepoScope,
    ) -> Result<Vec<PullSummary>, BackendError> {
        Ok(self.client.list_open_pulls(scope).await?)
    }
}

#[async_trait]
impl AutomationService for GitHubBackend {
    #[instrument(skip(self, scope), fields(scope = %scope))]
    async fn load_automation_config(
        &self,
        scope: &RepoScope,
    ) -> Result<AutomationConfig, BackendError> {
        self.read_automation().await
    }

    #[instrument(skip(self, scope), fields(scope = %scope))]
    async fn evaluate_candidates(
        &self,
        scope: &RepoScope,
    ) -> Result<Vec<AutoApproveCandidate>, BackendError> {
        let config = self.read_automation().await?;
        if !config.enabled {
            return Ok(Vec::new());
        }

        let mut candidates = Vec::new();
        for pull in self.client.list_open_pulls(scope).await? {
            if pull.draft {
                debug!(pr = pull.number, "skipping draft pull request");
                continue;
            }
            let analysis = self.analyze_with(&scope.key(pull.number), &config.risk).await?;
            if let Some(candidate) = candidate_for(&pull, &analysis.result, &config) {
                candidates.push(candidate);
            }
        }
        info!(candidates = candidates.len(), "evaluated auto-approve candidates");
        Ok(candidates)
    }

    #[instrument(
        skip(self, scope, candidates, config),
        fields(scope = %scope, candidates = candidates.len())
    )]
    async fn run_approve_with_merge(
        &self,
        scope: &RepoScope,
        candidates: &[AutoApproveCandidate],
        config: &AutomationConfig,
    ) -> Result<BatchResponse, BackendError> {
        approve_then_merge(&self.client, scope, candidates, config).await
    }
}

#[async_trait]
impl ReviewActions for GitHubClient {
    async fn approve(&self, key: &RequestKey) -> Result<(), StepError> {
        GitHubClient::approve(self, key).await.map_err(step_error)
    }

    async fn merge(&self, key: &RequestKey, method: MergeMethod) -> Result<(), StepError> {
        GitHubClient::merge(self, key, method).await.map_err(step_error)
    }
}

/// Requests that never got an HTTP answer abort the batch; anything GitHub
/// answered is a per-candidate rejection.
fn step_error(err: PrError) -> StepError {
    match err {
        PrError::ApiRequest(_) => StepError::Unreachable(err.into()),
        other => StepError::Rejected(rejection_reason(&other)),
    }
}

/// Short form of a GitHub error for display next to a PR number.
fn rejection_reason(err: &PrError) -> String {
    match err {
        PrError::Rejected { status, message } => format!("{}: {}", status.as_u16(), message),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn config_with_token() -> Config {
        let mut config = Config::default();
        config.github.token = Some("ghp_test".to_string());
        config
    }

    #[test]
    fn test_rejection_reason_uses_status_and_message() {
        let err = PrError::Rejected {
            status: StatusCode::FORBIDDEN,
            message: "Resource not accessible by integration".to_string(),
        };
        assert_eq!(rejection_reason(&err), "403: Resource not accessible by integration");
    }

    #[tokio::test]
    async fn test_load_automation_config_missing_file_is_disabled() {
        let path = std::env::temp_dir().join("pr_autopilot_backend_missing.toml");
        let backend = GitHubBackend::new(&config_with_token(), &path).unwrap();
        let automation = backend
            .load_automation_config(&RepoScope::new("org", "repo"))
            .await
            .unwrap();
        assert!(!automation.enabled);
    }

    #[tokio::test]
    async fn test_evaluate_disabled_makes_no_requests() {
        let path = std::env::temp_dir().join("pr_autopilot_backend_disabled.toml");
        std::fs::write(&path, "[automation]\nenabled = false\n").unwrap();
        let mut config = config_with_token();
        // Unroutable; any request would fail the test
        config.github.api_url = "http://127.0.0.1:9".to_string();
        let backend = GitHubBackend::new(&config, &path).unwrap();
        let candidates = backend
            .evaluate_candidates(&RepoScope::new("org", "repo"))
            .await
            .unwrap();
        assert!(candidates.is_empty());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_step_error_splits_rejections_from_transport() {
        let rejected = step_error(PrError::Rejected {
            status: StatusCode::METHOD_NOT_ALLOWED,
            message: "Pull Request is not mergeable".to_string(),
        });
        assert!(matches!(
            rejected,
            StepError::Rejected(reason) if reason == "405: Pull Request is not mergeable"
        ));
        assert!(matches!(
            step_error(PrError::MissingToken),
            StepError::Rejected(_)
        ));
    }

    #[tokio::test]
    async fn test_batch_fails_when_github_is_unreachable() {
        let path = std::env::temp_dir().join("pr_autopilot_backend_unreachable.toml");
        let mut config = config_with_token();
        // Nothing listens here; the connection is refused
        config.github.api_url = "http://127.0.0.1:9".to_string();
        let backend = GitHubBackend::new(&config, &path).unwrap();
        let candidates = vec![AutoApproveCandidate {
            pr_number: 1,
            title: "Docs".to_string(),
            risk_level: crate::risk::RiskLevel::Low,
            reason: "small change".to_string(),
        }];
        let automation = AutomationConfig {
            enabled: true,
            enable_auto_merge: true,
            ..AutomationConfig::default()
        };

        let err = backend
            .run_approve_with_merge(&RepoScope::new("org", "repo"), &candidates, &automation)
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::GitHub(PrError::ApiRequest(_))));
    }

    #[tokio::test]
    async fn test_analysis_uses_reloaded_risk_config() {
        let path = std::env::temp_dir().join("pr_autopilot_backend_broken_risk.toml");
        std::fs::write(&path, "[automation.risk]\nlow_max = 90\nmedium_max = 10\n").unwrap();
        let mut config = config_with_token();
        config.github.api_url = "http://127.0.0.1:9".to_string();
        let backend = GitHubBackend::new(&config, &path).unwrap();

        // The invalid cutoffs are rejected before any request is made
        let err = backend
            .analyze_risk(&RepoScope::new("org", "repo").key(1))
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::Config(ConfigError::Invalid(_))));
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_load_automation_config_parse_error() {
        let path = std::env::temp_dir().join("pr_autopilot_backend_broken.toml");
        std::fs::write(&path, "[automation]\nenabled = maybe\n").unwrap();
        let backend = GitHubBackend::new(&config_with_token(), &path).unwrap();
        let err = backend
            .load_automation_config(&RepoScope::new("org", "repo"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Config(ConfigError::Parse(_))));
        std::fs::remove_file(&path).ok();
    }
}
