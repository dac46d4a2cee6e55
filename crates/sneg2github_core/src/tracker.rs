use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::{AppConfig, RepoTarget};

pub const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// Status and raw body of an issue-creation call, unvalidated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueResponse {
    pub status: u16,
    pub body: String,
}

impl IssueResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `html_url` of the created issue when the body is GitHub's issue JSON.
    pub fn html_url(&self) -> Option<String> {
        serde_json::from_str::<Value>(&self.body)
            .ok()?
            .get("html_url")?
            .as_str()
            .map(ToString::to_string)
    }
}

pub trait IssueTracker {
    fn create_issue(&mut self, issue: &NewIssue) -> Result<IssueResponse>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct GitHubClientConfig {
    pub api_url: String,
    pub target: RepoTarget,
    pub token: String,
    pub user_agent: String,
    pub timeout_ms: u64,
}

impl GitHubClientConfig {
    pub fn from_config(config: &AppConfig, token: &str) -> Result<Self> {
        Ok(Self {
            api_url: config.github_api_url(),
            target: config.repo_target()?,
            token: token.to_string(),
            user_agent: config.user_agent(),
            timeout_ms: config.timeout_ms(),
        })
    }

    pub fn issues_endpoint(&self) -> String {
        format!(
            "{}/repos/{}/{}/issues",
            self.api_url.trim_end_matches('/'),
            self.target.owner,
            self.target.repo
        )
    }
}

pub struct GitHubClient {
    client: Client,
    config: GitHubClientConfig,
    request_count: usize,
}

impl GitHubClient {
    pub fn new(config: GitHubClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .context("failed to build GitHub HTTP client")?;
        Ok(Self {
            client,
            config,
            request_count: 0,
        })
    }
}

impl IssueTracker for GitHubClient {
    fn create_issue(&mut self, issue: &NewIssue) -> Result<IssueResponse> {
        let endpoint = self.config.issues_endpoint();
        debug!(%endpoint, title = %issue.title, "POST issue");
        self.request_count += 1;
        let response = self
            .client
            .post(&endpoint)
            .header(ACCEPT, GITHUB_ACCEPT)
            .header(AUTHORIZATION, format!("Bearer {}", self.config.token))
            .json(issue)
            .send()
            .with_context(|| format!("failed to POST {endpoint}"))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .with_context(|| format!("failed to read response of {endpoint}"))?;
        Ok(IssueResponse { status, body })
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}
