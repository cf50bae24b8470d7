use std::fmt;

use serde::{Deserialize, Serialize};

use crate::risk::{RiskConfig, RiskLevel};

/// How an approved pull request gets merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    Merge,
    #[default]
    Squash,
    Rebase,
}

impl MergeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeMethod::Merge => "merge",
            MergeMethod::Squash => "squash",
            MergeMethod::Rebase => "rebase",
        }
    }
}

impl fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-repository automation settings (`[automation]` in the config file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub enabled: bool,
    /// Highest risk level still eligible for automatic approval
    pub auto_approve_max_risk: RiskLevel,
    pub enable_auto_merge: bool,
    pub merge_method: MergeMethod,
    pub risk: RiskConfig,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_approve_max_risk: RiskLevel::Low,
            enable_auto_merge: false,
            merge_method: MergeMethod::default(),
            risk: RiskConfig::default(),
        }
    }
}

/// A pull request proposed for automatic approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoApproveCandidate {
    pub pr_number: u64,
    #[serde(default)]
    pub title: String,
    pub risk_level: RiskLevel,
    /// Human-readable justification shown before confirmation
    pub reason: String,
}

/// What happened to the merge step of one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeStatus {
    /// Merge attempted and accepted
    Enabled,
    /// Auto-merge disabled in config
    Skipped,
    /// Never attempted because approval failed
    SkippedDueToApproveFail,
    /// Merge attempted and rejected
    Failed(String),
}

impl fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeStatus::Enabled => write!(f, "merged"),
            MergeStatus::Skipped => write!(f, "merge skipped"),
            MergeStatus::SkippedDueToApproveFail => write!(f, "merge skipped (approval failed)"),
            MergeStatus::Failed(reason) => write!(f, "merge failed: {}", reason),
        }
    }
}

/// Result of approving (and possibly merging) one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproveWithMergeOutcome {
    pub pr_number: u64,
    pub approve_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approve_error: Option<String>,
    pub auto_merge_status: MergeStatus,
}

impl ApproveWithMergeOutcome {
    pub fn approved(pr_number: u64, auto_merge_status: MergeStatus) -> Self {
        Self {
            pr_number,
            approve_success: true,
            approve_error: None,
            auto_merge_status,
        }
    }

    pub fn approval_failed(pr_number: u64, error: impl Into<String>) -> Self {
        Self {
            pr_number,
            approve_success: false,
            approve_error: Some(error.into()),
            auto_merge_status: MergeStatus::SkippedDueToApproveFail,
        }
    }
}

/// Response of a batch approve+merge run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub outcomes: Vec<ApproveWithMergeOutcome>,
}
