use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::automation::AutomationConfig;

/// Config file looked up in the current directory.
pub const DEFAULT_CONFIG_PATH: &str = ".pr-autopilot.toml";

/// Worker pool size used when the config does not set one.
pub const DEFAULT_WORKERS: usize = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration loaded from .pr-autopilot.toml.
/// All sections are optional; the tool runs with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Automation settings; `enabled` defaults to false
    #[serde(default)]
    pub automation: AutomationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,

    /// REST API root, overridable for GitHub Enterprise
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_api_url(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of analyses outstanding at once
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

impl Config {
    /// Load configuration from .pr-autopilot.toml in the current directory.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(DEFAULT_CONFIG_PATH);
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };

        if config.github.token.is_none() {
            if let Ok(token) = std::env::var("GITHUB_TOKEN") {
                config.github.token = Some(token);
            }
        }

        Ok(config)
    }

    /// Load from a specific path, validating the result.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read only the `[automation]` table from `path`.
    ///
    /// A missing file yields the default (disabled) automation config; an
    /// unreadable or malformed file is an error.
    pub fn load_automation(path: &Path) -> Result<AutomationConfig, ConfigError> {
        if !path.exists() {
            return Ok(AutomationConfig::default());
        }
        Ok(Self::load_from(path)?.automation)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.workers == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.workers must be at least 1".to_string(),
            ));
        }
        self.automation
            .risk
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("automation.risk: {}", e)))
    }

    /// Resolve the GitHub token: config file value takes precedence,
    /// falls back to GITHUB_TOKEN env var.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::MergeMethod;
    use crate::risk::RiskLevel;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.github.token.is_none());
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.scheduler.workers, 3);
        assert!(!config.automation.enabled);
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[scheduler]
workers = 5

[automation]
enabled = true
auto_approve_max_risk = "medium"
enable_auto_merge = true
merge_method = "merge"

[automation.risk]
low_max = 25
medium_max = 50

[[automation.risk.sensitive_paths]]
pattern = "billing"
score = 30
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scheduler.workers, 5);
        assert!(config.automation.enabled);
        assert_eq!(config.automation.auto_approve_max_risk, RiskLevel::Medium);
        assert_eq!(config.automation.merge_method, MergeMethod::Merge);
        assert_eq!(config.automation.risk.medium_max, 50);
        assert_eq!(config.automation.risk.sensitive_paths.len(), 1);
        assert_eq!(config.automation.risk.sensitive_paths[0].pattern, "billing");
    }

    #[test]
    fn test_load_from_rejects_zero_workers() {
        let path = write_temp("pr_autopilot_zero_workers.toml", "[scheduler]\nworkers = 0\n");
        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_automation_missing_file_is_disabled() {
        let path = std::env::temp_dir().join("pr_autopilot_does_not_exist.toml");
        let automation = Config::load_automation(&path).unwrap();
        assert!(!automation.enabled);
    }

    #[test]
    fn test_load_automation_parse_error() {
        let path = write_temp("pr_autopilot_broken.toml", "[automation\nenabled = ");
        let err = Config::load_automation(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_automation_inverted_cutoffs() {
        let path = write_temp(
            "pr_autopilot_inverted.toml",
            "[automation.risk]\nlow_max = 80\nmedium_max = 40\n",
        );
        let err = Config::load_automation(&path).unwrap_err();
        assert!(err.to_string().contains("low_max"));
        fs::remove_file(&path).ok();
    }
}
