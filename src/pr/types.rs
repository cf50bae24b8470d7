use std::fmt;

use serde::{Deserialize, Serialize};

/// Owner/repo pair every backend call is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoScope {
    pub owner: String,
    pub repo: String,
}

impl RepoScope {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Key for one pull request within this scope.
    pub fn key(&self, pr_number: u64) -> RequestKey {
        RequestKey {
            scope: self.clone(),
            pr_number,
        }
    }
}

impl fmt::Display for RepoScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Stable identifier of one analyzable unit: a PR number within a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub scope: RepoScope,
    pub pr_number: u64,
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.scope, self.pr_number)
    }
}

/// A pull request as needed for scoring: metadata plus per-file change stats.
/// Not Deserialize: built from the GitHub metadata response and the parsed diff.
#[derive(Debug, Clone)]
pub struct PullRequest {
    /// PR number (e.g., 42)
    pub number: u64,
    /// PR title
    pub title: String,
    /// Author's GitHub login
    pub author: String,
    /// Parsed diff files
    pub files: Vec<DiffFile>,
}

impl PullRequest {
    pub fn additions(&self) -> usize {
        self.files.iter().map(|f| f.additions).sum()
    }

    pub fn deletions(&self) -> usize {
        self.files.iter().map(|f| f.deletions).sum()
    }
}

/// A single file within the PR diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffFile {
    /// File path (e.g., "src/auth/config.rs")
    pub path: String,
    pub is_new: bool,
    pub is_deleted: bool,
    pub additions: usize,
    pub deletions: usize,
}

impl DiffFile {
    pub fn lines_changed(&self) -> usize {
        self.additions + self.deletions
    }
}

/// Entry of the open pull request listing.
#[derive(Debug, Clone, Deserialize)]
pub struct PullSummary {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub draft: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_request_key_display() {
        let scope = RepoScope::new("org", "repo");
        assert_eq!(scope.key(42).to_string(), "org/repo#42");
    }

    #[test]
    fn test_request_key_hashing() {
        let scope = RepoScope::new("org", "repo");
        let mut keys = HashSet::new();
        keys.insert(scope.key(1));
        keys.insert(scope.key(1));
        keys.insert(scope.key(2));
        keys.insert(RepoScope::new("org", "other").key(1));
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_pull_request_totals() {
        let pr = PullRequest {
            number: 1,
            title: "Test".to_string(),
            author: "alice".to_string(),
            files: vec![
                DiffFile {
                    path: "a.rs".to_string(),
                    is_new: false,
                    is_deleted: false,
                    additions: 3,
                    deletions: 1,
                },
                DiffFile {
                    path: "b.rs".to_string(),
                    is_new: true,
                    is_deleted: false,
                    additions: 10,
                    deletions: 0,
                },
            ],
        };
        assert_eq!(pr.additions(), 13);
        assert_eq!(pr.deletions(), 1);
        assert_eq!(pr.files[0].lines_changed(), 4);
    }
}
