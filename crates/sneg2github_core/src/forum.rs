//! Forum listing scraper.
//!
//! A listing page is a phpBB `viewforum.php` page. Data rows are recognised by
//! the `a.topictitle` anchor they carry, so caption, column-header, section and
//! footer rows are skipped wherever the template places them.

use anyhow::{Context, Result, anyhow};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, warn};

use crate::http::PageSource;
use crate::storage::TopicDraft;

const ROW_SELECTOR: &str = "#pagecontent .tablebg tr";
const TITLE_SELECTOR: &str = "a.topictitle[href]";
const AUTHOR_SELECTOR: &str = ".topicauthor";

pub fn listing_url(forum_url: &str, forum_id: u32, offset: u32) -> String {
    format!(
        "{}/viewforum.php?f={forum_id}&start={offset}",
        forum_url.trim_end_matches('/')
    )
}

/// Resolve a stored (source-relative) topic href against the forum base URL.
pub fn topic_url(forum_url: &str, href: &str) -> Result<String> {
    let base = format!("{}/", forum_url.trim_end_matches('/'));
    let base = Url::parse(&base).with_context(|| format!("invalid forum URL: {forum_url}"))?;
    let joined = base
        .join(href)
        .with_context(|| format!("invalid topic href: {href}"))?;
    Ok(joined.to_string())
}

pub fn load_forum_topics<S: PageSource>(source: &mut S, url: &str) -> Result<Vec<TopicDraft>> {
    info!(url, "loading forum listing");
    let html = source.fetch_html(url)?;
    let topics = parse_listing(&html).with_context(|| format!("failed to parse listing {url}"))?;
    if topics.is_empty() {
        warn!(url, "listing page has no topic rows; has the forum template changed?");
    }
    Ok(topics)
}

pub fn parse_listing(html: &str) -> Result<Vec<TopicDraft>> {
    let document = Html::parse_document(html);
    let rows = selector(ROW_SELECTOR)?;
    let title = selector(TITLE_SELECTOR)?;
    let author = selector(AUTHOR_SELECTOR)?;

    let mut topics = Vec::new();
    for row in document.select(&rows) {
        let Some(anchor) = row
            .select(&title)
            .find(|anchor| nearest_row(*anchor).is_some_and(|own| own.id() == row.id()))
        else {
            continue;
        };
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let title_text = element_text(anchor);
        if title_text.is_empty() {
            warn!(href, "skipping topic row with an empty title");
            continue;
        }
        let author_text = row
            .select(&author)
            .next()
            .map(element_text)
            .unwrap_or_default();

        topics.push(TopicDraft {
            title: title_text,
            href: strip_session_id(href),
            author: author_text,
            text: String::new(),
        });
    }
    Ok(topics)
}

/// Drop phpBB's `sid` query parameter so the same topic always maps to the same href.
pub fn strip_session_id(href: &str) -> String {
    let (without_fragment, fragment) = match href.split_once('#') {
        Some((head, tail)) => (head, Some(tail)),
        None => (href, None),
    };
    let Some((path, query)) = without_fragment.split_once('?') else {
        return href.to_string();
    };

    let kept = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split('=').next() != Some("sid"))
        .collect::<Vec<_>>();

    let mut out = path.to_string();
    if !kept.is_empty() {
        out.push('?');
        out.push_str(&kept.join("&"));
    }
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// The innermost `tr` holding `element`; an outer row wrapping a nested table does not own it.
fn nearest_row(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| ancestor.value().name() == "tr")
}

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|error| anyhow!("invalid selector `{css}`: {error}"))
}

pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
