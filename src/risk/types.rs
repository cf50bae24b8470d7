use serde::{Deserialize, Serialize};

/// Risk level for a pull request. Totally ordered: Low < Medium < High.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[serde(alias = "Low", alias = "LOW")]
    Low,
    #[serde(alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "High", alias = "HIGH")]
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
        }
    }
}

/// Coarse classification of a changed file by its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Source,
    Test,
    Config,
    Docs,
}

impl std::fmt::Display for FileCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FileCategory::Source => "source",
            FileCategory::Test => "test",
            FileCategory::Config => "config",
            FileCategory::Docs => "docs",
        };
        f.write_str(name)
    }
}

/// One contribution to the overall score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    pub score: u8,
    pub description: String,
}

/// How a file was touched by the diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChange {
    Added,
    Modified,
    Deleted,
}

impl std::fmt::Display for FileChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FileChange::Added => "added",
            FileChange::Modified => "modified",
            FileChange::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// Category assignment of a single changed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileBreakdown {
    pub path: String,
    pub category: FileCategory,
    pub change: FileChange,
    pub lines_changed: usize,
}

/// Aggregate change counts for the whole pull request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub files: usize,
    pub additions: usize,
    pub deletions: usize,
}

/// Risk analysis of one pull request.
///
/// `level` is always the bucket of `score` under the [`RiskConfig`] that
/// produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Overall score in [0, 100]
    pub score: u8,
    pub level: RiskLevel,
    pub factors: Vec<RiskFactor>,
    pub files: Vec<FileBreakdown>,
    pub counts: ChangeCounts,
}

/// Weight applied to a file's size contribution, per category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryWeights {
    #[serde(default = "default_source_weight")]
    pub source: f64,
    #[serde(default = "default_test_weight")]
    pub test: f64,
    #[serde(default = "default_config_weight")]
    pub config: f64,
    #[serde(default = "default_docs_weight")]
    pub docs: f64,
}

impl CategoryWeights {
    pub fn weight(&self, category: FileCategory) -> f64 {
        match category {
            FileCategory::Source => self.source,
            FileCategory::Test => self.test,
            FileCategory::Config => self.config,
            FileCategory::Docs => self.docs,
        }
    }
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            source: default_source_weight(),
            test: default_test_weight(),
            config: default_config_weight(),
            docs: default_docs_weight(),
        }
    }
}

fn default_source_weight() -> f64 {
    1.0
}

fn default_test_weight() -> f64 {
    0.2
}

fn default_config_weight() -> f64 {
    0.8
}

fn default_docs_weight() -> f64 {
    0.1
}

/// Path fragment that marks a change as sensitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivePath {
    /// Case-insensitive substring matched against the file path
    pub pattern: String,
    pub score: u8,
}

/// Scoring parameters and level cutoffs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub category_weights: CategoryWeights,
    pub sensitive_paths: Vec<SensitivePath>,
    /// More changed files than this adds a fixed penalty
    pub large_file_count: usize,
    /// More changed lines than this adds a fixed penalty
    pub large_line_count: usize,
    /// Added when source files change without any test file
    pub missing_test_penalty: u8,
    pub low_max: u8,
    pub medium_max: u8,
}

impl Default for RiskConfig {
    fn default() -> Self {
        let sensitive = |pattern: &str, score| SensitivePath {
            pattern: pattern.to_string(),
            score,
        };
        Self {
            category_weights: CategoryWeights::default(),
            sensitive_paths: vec![
                sensitive("auth", 25),
                sensitive("crypto", 25),
                sensitive("migrations/", 20),
                sensitive(".github/workflows", 20),
            ],
            large_file_count: 20,
            large_line_count: 500,
            missing_test_penalty: 15,
            low_max: 30,
            medium_max: 60,
        }
    }
}

impl RiskConfig {
    /// Bucket a score: `<= low_max` is Low, `<= medium_max` is Medium, else High.
    pub fn level_for(&self, score: u8) -> RiskLevel {
        if score <= self.low_max {
            RiskLevel::Low
        } else if score <= self.medium_max {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.low_max > self.medium_max {
            return Err(format!(
                "low_max ({}) must not exceed medium_max ({})",
                self.low_max, self.medium_max
            ));
        }
        if self.medium_max > 100 {
            return Err(format!("medium_max ({}) must be within 0..=100", self.medium_max));
        }
        Ok(())
    }
}
