use std::thread::sleep;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::storage::Database;
use crate::tracker::{IssueTracker, NewIssue};

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub sentinel_title: String,
    pub labels: Vec<String>,
    pub delay: Duration,
    pub dry_run: bool,
}

impl ImportOptions {
    pub fn from_config(config: &AppConfig, dry_run: bool) -> Self {
        Self {
            sentinel_title: config.sentinel_title(),
            labels: config.labels(),
            delay: Duration::from_millis(config.import_delay_ms()),
            dry_run,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueAction {
    Created,
    Rejected,
    WouldCreate,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportIssueResult {
    pub title: String,
    pub action: IssueAction,
    pub status: Option<u16>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub dry_run: bool,
    pub considered: usize,
    pub created: usize,
    pub failed: usize,
    pub issues: Vec<ImportIssueResult>,
    pub request_count: usize,
}

/// Publish every stored topic except the sentinel as a tracker issue.
///
/// Non-2xx responses are logged and recorded, not raised; transport errors
/// abort the run with whatever was already created left in place.
pub fn import_to_tracker<T: IssueTracker>(
    db: &Database,
    tracker: Option<&mut T>,
    options: &ImportOptions,
) -> Result<ImportReport> {
    let topics = db.topics_for_import(&options.sentinel_title)?;
    let mut report = ImportReport {
        dry_run: options.dry_run,
        considered: topics.len(),
        created: 0,
        failed: 0,
        issues: Vec::with_capacity(topics.len()),
        request_count: 0,
    };

    let mut tracker = match (options.dry_run, tracker) {
        (true, _) => None,
        (false, Some(tracker)) => Some(tracker),
        (false, None) => anyhow::bail!("an issue tracker client is required unless dry_run is set"),
    };

    for topic in topics {
        let issue = NewIssue {
            title: topic.title,
            body: topic.text,
            labels: options.labels.clone(),
        };

        let Some(tracker) = tracker.as_deref_mut() else {
            info!(title = %issue.title, "dry run: would create issue");
            report.issues.push(ImportIssueResult {
                title: issue.title,
                action: IssueAction::WouldCreate,
                status: None,
                detail: None,
            });
            continue;
        };

        let response = tracker.create_issue(&issue)?;
        report.request_count = tracker.request_count();
        if response.is_success() {
            info!(title = %issue.title, status = response.status, body = %response.body, "issue created");
            report.created += 1;
            report.issues.push(ImportIssueResult {
                title: issue.title,
                action: IssueAction::Created,
                status: Some(response.status),
                detail: response.html_url(),
            });
        } else {
            warn!(title = %issue.title, status = response.status, body = %response.body, "issue rejected");
            report.failed += 1;
            report.issues.push(ImportIssueResult {
                title: issue.title,
                action: IssueAction::Rejected,
                status: Some(response.status),
                detail: Some(response.body),
            });
        }

        if !options.delay.is_zero() {
            sleep(options.delay);
        }
    }

    Ok(report)
}
