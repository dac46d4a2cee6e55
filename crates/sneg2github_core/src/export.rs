use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::config::AppConfig;
use crate::forum::{listing_url, load_forum_topics, topic_url};
use crate::http::PageSource;
use crate::storage::{Database, TopicDraft};
use crate::thread::load_topic_text;

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub forum_url: String,
    pub forum_id: u32,
    pub page_offsets: Vec<u32>,
}

impl ExportOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            forum_url: config.forum_url(),
            forum_id: config.forum_id(),
            page_offsets: config.page_offsets(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportPageReport {
    pub offset: u32,
    pub url: String,
    pub listed: usize,
    pub inserted: usize,
    pub already_stored: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub pages: Vec<ExportPageReport>,
    pub listed: usize,
    pub inserted: usize,
    pub already_stored: usize,
    pub request_count: usize,
}

/// Scrape every configured listing page, load each new topic's thread and store it.
///
/// Topics whose href is already stored are neither refetched nor rewritten.
pub fn export_from_forum<S: PageSource>(
    db: &Database,
    source: &mut S,
    options: &ExportOptions,
) -> Result<ExportReport> {
    let mut pages = Vec::with_capacity(options.page_offsets.len());
    for &offset in &options.page_offsets {
        let url = listing_url(&options.forum_url, options.forum_id, offset);
        let drafts = load_forum_topics(source, &url)?;

        let mut page = ExportPageReport {
            offset,
            url,
            listed: drafts.len(),
            inserted: 0,
            already_stored: 0,
        };
        for draft in drafts {
            if db.topic_exists(&draft.href)? {
                info!(href = %draft.href, "topic already stored");
                page.already_stored += 1;
                continue;
            }
            let stored = save_topic(db, source, &options.forum_url, draft)?;
            if stored {
                page.inserted += 1;
            } else {
                page.already_stored += 1;
            }
        }
        pages.push(page);
    }

    Ok(ExportReport {
        listed: pages.iter().map(|page| page.listed).sum(),
        inserted: pages.iter().map(|page| page.inserted).sum(),
        already_stored: pages.iter().map(|page| page.already_stored).sum(),
        request_count: source.request_count(),
        pages,
    })
}

fn save_topic<S: PageSource>(
    db: &Database,
    source: &mut S,
    forum_url: &str,
    mut draft: TopicDraft,
) -> Result<bool> {
    let url = topic_url(forum_url, &draft.href)?;
    draft.text = load_topic_text(source, &url)
        .with_context(|| format!("failed to load topic \"{}\"", draft.title))?;
    let stored = db.insert_topic(&draft)?.is_some();
    if stored {
        info!(title = %draft.title, "loaded topic");
    }
    Ok(stored)
}
