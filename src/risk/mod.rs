pub mod types;

pub use types::{
    AnalysisResult, ChangeCounts, FileBreakdown, FileCategory, FileChange, RiskConfig, RiskFactor,
    RiskLevel,
};

use tracing::debug;

use crate::pr::PullRequest;

/// Points a single file can contribute at full weight.
const MAX_FILE_POINTS: f64 = 40.0;
/// Changed lines at which a file reaches `MAX_FILE_POINTS`.
const FILE_LINES_CAP: usize = 100;
const LARGE_CHANGE_PENALTY: u8 = 15;

/// Whether a unit at `level` may be auto-approved under `max`.
pub fn qualifies(level: RiskLevel, max: RiskLevel) -> bool {
    level <= max
}

/// Classify a file path.
pub fn categorize(path: &str) -> FileCategory {
    let lower = path.to_ascii_lowercase();
    let file_name = lower.rsplit('/').next().unwrap_or(&lower);

    let is_test = lower.starts_with("tests/")
        || lower.starts_with("test/")
        || lower.contains("/tests/")
        || lower.contains("/test/")
        || lower.contains("__tests__/")
        || file_name.starts_with("test_")
        || file_name.contains("_test.")
        || file_name.contains(".test.")
        || file_name.contains(".spec.");
    if is_test {
        return FileCategory::Test;
    }

    let is_docs = lower.starts_with("docs/")
        || lower.starts_with("doc/")
        || [".md", ".rst", ".txt", ".adoc"]
            .iter()
            .any(|ext| file_name.ends_with(ext));
    if is_docs {
        return FileCategory::Docs;
    }

    let is_config = lower.starts_with(".github/")
        || matches!(file_name, "dockerfile" | "makefile")
        || [".toml", ".yaml", ".yml", ".json", ".ini", ".cfg", ".lock", ".env"]
            .iter()
            .any(|ext| file_name.ends_with(ext));
    if is_config {
        return FileCategory::Config;
    }

    FileCategory::Source
}

/// Score a pull request against `config`.
///
/// The score is the largest weighted per-file contribution plus the
/// additive factors (sensitive paths, change size, missing tests), clamped
/// to 100. Every contribution is recorded as a [`RiskFactor`].
pub fn assess(pr: &PullRequest, config: &RiskConfig) -> AnalysisResult {
    let files: Vec<FileBreakdown> = pr
        .files
        .iter()
        .map(|f| FileBreakdown {
            path: f.path.clone(),
            category: categorize(&f.path),
            change: if f.is_new {
                FileChange::Added
            } else if f.is_deleted {
                FileChange::Deleted
            } else {
                FileChange::Modified
            },
            lines_changed: f.lines_changed(),
        })
        .collect();

    let counts = ChangeCounts {
        files: files.len(),
        additions: pr.additions(),
        deletions: pr.deletions(),
    };

    let mut factors = Vec::new();

    let largest = files
        .iter()
        .map(|f| {
            let size = f.lines_changed.min(FILE_LINES_CAP) as f64 / FILE_LINES_CAP as f64;
            let weight = config.category_weights.weight(f.category).max(0.0);
            let points = (size * MAX_FILE_POINTS * weight).round().min(100.0) as u8;
            (points, f)
        })
        .max_by_key(|(points, _)| *points);
    if let Some((points, file)) = largest {
        if points > 0 {
            factors.push(RiskFactor {
                name: "largest_change".to_string(),
                score: points,
                description: format!(
                    "{} ({} {}, {} lines changed)",
                    file.path, file.change, file.category, file.lines_changed
                ),
            });
        }
    }

    for sensitive in &config.sensitive_paths {
        let pattern = sensitive.pattern.to_ascii_lowercase();
        if pattern.is_empty() {
            continue;
        }
        if let Some(hit) = files
            .iter()
            .find(|f| f.path.to_ascii_lowercase().contains(&pattern))
        {
            factors.push(RiskFactor {
                name: format!("sensitive_path:{}", sensitive.pattern),
                score: sensitive.score,
                description: format!("Touches sensitive path {}", hit.path),
            });
        }
    }

    if counts.files > config.large_file_count {
        factors.push(RiskFactor {
            name: "many_files".to_string(),
            score: LARGE_CHANGE_PENALTY,
            description: format!(
                "{} files changed (threshold {})",
                counts.files, config.large_file_count
            ),
        });
    }

    let total_lines = counts.additions + counts.deletions;
    if total_lines > config.large_line_count {
        factors.push(RiskFactor {
            name: "large_diff".to_string(),
            score: LARGE_CHANGE_PENALTY,
            description: format!(
                "{} lines changed (threshold {})",
                total_lines, config.large_line_count
            ),
        });
    }

    let touches_source = files.iter().any(|f| f.category == FileCategory::Source);
    // Removing tests does not cover a source change
    let touches_tests = files
        .iter()
        .any(|f| f.category == FileCategory::Test && f.change != FileChange::Deleted);
    if touches_source && !touches_tests && config.missing_test_penalty > 0 {
        factors.push(RiskFactor {
            name: "missing_tests".to_string(),
            score: config.missing_test_penalty,
            description: "Source files changed without any test changes".to_string(),
        });
    }

    let total: u32 = factors.iter().map(|f| u32::from(f.score)).sum();
    let score = total.min(100) as u8;
    let level = config.level_for(score);
    debug!(pr = pr.number, score, level = %level, factors = factors.len(), "scored pull request");

    AnalysisResult {
        score,
        level,
        factors,
        files,
        counts,
    }
}
