use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILENAME: &str = "sneg2github.toml";
pub const DEFAULT_DB_PATH: &str = "sneg2github.db";
pub const DEFAULT_USER_AGENT: &str = "sneg2github/0.1";
pub const DEFAULT_FORUM_URL: &str = "https://snegopat.ru/forum";
pub const DEFAULT_FORUM_ID: u32 = 8;
pub const DEFAULT_PAGE_OFFSETS: [u32; 2] = [0, 25];
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_OWNER: &str = "kuntashov";
pub const DEFAULT_REPO: &str = "snegopat-test-issues";
pub const DEFAULT_SENTINEL_TITLE: &str = "Как писать об ошибках";
pub const DEFAULT_LABELS: [&str; 2] = ["bug", "forum"];
pub const DEFAULT_IMPORT_DELAY_MS: u64 = 1_500;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 300;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct AppConfig {
    pub db_path: Option<String>,
    #[serde(default)]
    pub forum: ForumSection,
    #[serde(default)]
    pub github: GitHubSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ForumSection {
    pub url: Option<String>,
    pub forum_id: Option<u32>,
    pub page_offsets: Option<Vec<u32>>,
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
    pub request_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct GitHubSection {
    pub api_url: Option<String>,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub labels: Option<Vec<String>>,
    pub sentinel_title: Option<String>,
    pub delay_ms: Option<u64>,
}

/// Owner and name of the target repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoTarget {
    pub owner: String,
    pub repo: String,
}

impl RepoTarget {
    /// Parse an `owner/repo` pair.
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let Some((owner, repo)) = trimmed.split_once('/') else {
            bail!("invalid repository `{trimmed}` (expected owner/repo)");
        };
        let owner = owner.trim();
        let repo = repo.trim();
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            bail!("invalid repository `{trimmed}` (expected owner/repo)");
        }
        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl AppConfig {
    /// Resolve the forum base URL: env SNEG2GITHUB_FORUM_URL > config > default.
    /// Trailing slashes are removed.
    pub fn forum_url(&self) -> String {
        let value = env_override("SNEG2GITHUB_FORUM_URL")
            .or_else(|| self.forum.url.clone())
            .unwrap_or_else(|| DEFAULT_FORUM_URL.to_string());
        value.trim_end_matches('/').to_string()
    }

    pub fn forum_id(&self) -> u32 {
        self.forum.forum_id.unwrap_or(DEFAULT_FORUM_ID)
    }

    pub fn page_offsets(&self) -> Vec<u32> {
        self.forum
            .page_offsets
            .clone()
            .unwrap_or_else(|| DEFAULT_PAGE_OFFSETS.to_vec())
    }

    pub fn user_agent(&self) -> String {
        self.forum
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn timeout_ms(&self) -> u64 {
        self.forum.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    pub fn request_delay_ms(&self) -> u64 {
        self.forum
            .request_delay_ms
            .unwrap_or(DEFAULT_REQUEST_DELAY_MS)
    }

    pub fn github_api_url(&self) -> String {
        self.github
            .api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// Resolve the target repository: env SNEG2GITHUB_REPO (`owner/repo`) > config > default.
    pub fn repo_target(&self) -> Result<RepoTarget> {
        if let Some(value) = env_override("SNEG2GITHUB_REPO") {
            return RepoTarget::parse(&value).context("invalid SNEG2GITHUB_REPO");
        }
        Ok(RepoTarget {
            owner: self
                .github
                .owner
                .clone()
                .unwrap_or_else(|| DEFAULT_OWNER.to_string()),
            repo: self
                .github
                .repo
                .clone()
                .unwrap_or_else(|| DEFAULT_REPO.to_string()),
        })
    }

    pub fn labels(&self) -> Vec<String> {
        self.github
            .labels
            .clone()
            .unwrap_or_else(|| DEFAULT_LABELS.iter().map(ToString::to_string).collect())
    }

    pub fn sentinel_title(&self) -> String {
        self.github
            .sentinel_title
            .clone()
            .unwrap_or_else(|| DEFAULT_SENTINEL_TITLE.to_string())
    }

    pub fn import_delay_ms(&self) -> u64 {
        self.github.delay_ms.unwrap_or(DEFAULT_IMPORT_DELAY_MS)
    }
}

/// Load and parse an AppConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<AppConfig> {
    if !config_path.exists() {
        return Ok(AppConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: AppConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

pub(crate) fn env_override(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_uses_builtin_targets() {
        let config = AppConfig::default();
        assert!(config.db_path.is_none());
        assert_eq!(config.forum_id(), 8);
        assert_eq!(config.page_offsets(), vec![0, 25]);
        assert_eq!(config.labels(), vec!["bug".to_string(), "forum".to_string()]);
        assert_eq!(config.sentinel_title(), "Как писать об ошибках");
        assert_eq!(config.import_delay_ms(), 1_500);
        assert_eq!(config.github_api_url(), "https://api.github.com");
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/sneg2github.toml")).expect("load config");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn load_config_parses_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("sneg2github.toml");
        fs::write(
            &config_path,
            r#"
db_path = "data/topics.db"

[forum]
url = "https://forum.example.org/"
forum_id = 3
page_offsets = [0, 50, 100]
timeout_ms = 5000

[github]
owner = "someone"
repo = "bugs"
labels = ["imported"]
sentinel_title = "Read me first"
delay_ms = 0
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.db_path.as_deref(), Some("data/topics.db"));
        assert_eq!(config.forum.url.as_deref(), Some("https://forum.example.org/"));
        assert_eq!(config.forum_id(), 3);
        assert_eq!(config.page_offsets(), vec![0, 50, 100]);
        assert_eq!(config.timeout_ms(), 5000);
        assert_eq!(config.request_delay_ms(), DEFAULT_REQUEST_DELAY_MS);
        assert_eq!(config.labels(), vec!["imported".to_string()]);
        assert_eq!(config.sentinel_title(), "Read me first");
        assert_eq!(config.import_delay_ms(), 0);
        assert_eq!(config.github.owner.as_deref(), Some("someone"));
        assert_eq!(config.github.repo.as_deref(), Some("bugs"));
    }

    #[test]
    fn load_config_tolerates_partial_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("sneg2github.toml");
        fs::write(&config_path, "[forum]\nforum_id = 12\n").expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.forum_id(), 12);
        assert!(config.github.owner.is_none());
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("sneg2github.toml");
        fs::write(&config_path, "[forum\nurl = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn repo_target_parses_owner_and_repo() {
        let target = RepoTarget::parse(" owner/name ").expect("parse");
        assert_eq!(target.owner, "owner");
        assert_eq!(target.repo, "name");
        assert_eq!(target.slug(), "owner/name");
    }

    #[test]
    fn repo_target_rejects_malformed_values() {
        assert!(RepoTarget::parse("owner").is_err());
        assert!(RepoTarget::parse("/name").is_err());
        assert!(RepoTarget::parse("owner/").is_err());
        assert!(RepoTarget::parse("a/b/c").is_err());
    }

    #[test]
    fn api_url_drops_trailing_slash() {
        let config = AppConfig {
            github: GitHubSection {
                api_url: Some("https://ghe.example.org/api/v3/".to_string()),
                ..GitHubSection::default()
            },
            ..AppConfig::default()
        };
        assert_eq!(config.github_api_url(), "https://ghe.example.org/api/v3");
    }
}
