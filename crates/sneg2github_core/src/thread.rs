//! Topic page scraper: every post of a thread, rendered into one HTML text.

use std::collections::HashSet;

use anyhow::{Context, Result, bail};
use reqwest::Url;
use scraper::{ElementRef, Html};
use tracing::info;

use crate::forum::{element_text, selector};
use crate::http::PageSource;

const AUTHOR_SELECTOR: &str = ".postauthor";
const BODY_SELECTOR: &str = ".postbody";
const TITLE_CONTAINER_SELECTOR: &str = ".gensmall";
const LINK_SELECTOR: &str = "a";

pub const POST_SEPARATOR: &str = "\n<hr/>\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub url: String,
    pub title: String,
    pub author: String,
    pub body: String,
}

pub fn load_topic_text<S: PageSource>(source: &mut S, url: &str) -> Result<String> {
    info!(url, "loading topic");
    let html = source.fetch_html(url)?;
    let posts = parse_thread(&html, url).with_context(|| format!("failed to parse topic {url}"))?;
    if posts.is_empty() {
        bail!("topic page {url} has no posts; has the forum template changed?");
    }
    Ok(render_thread(&posts))
}

pub fn parse_thread(html: &str, page_url: &str) -> Result<Vec<Post>> {
    let document = Html::parse_document(html);
    let author = selector(AUTHOR_SELECTOR)?;
    let body = selector(BODY_SELECTOR)?;
    let title_container = selector(TITLE_CONTAINER_SELECTOR)?;
    let link = selector(LINK_SELECTOR)?;

    let mut seen_blocks = HashSet::new();
    let mut posts = Vec::new();
    for author_element in document.select(&author) {
        let Some(block) = enclosing_post_block(author_element, &body) else {
            continue;
        };
        if !seen_blocks.insert(block.id()) {
            continue;
        }

        let title_link = block
            .select(&title_container)
            .next()
            .and_then(|container| container.select(&link).next());
        let (url, title) = match title_link {
            Some(anchor) => (
                post_url(page_url, anchor.value().attr("href").unwrap_or_default()),
                element_text(anchor),
            ),
            None => (page_url.to_string(), String::new()),
        };
        let body_html = block
            .select(&body)
            .next()
            .map(|element| element.inner_html())
            .unwrap_or_default();

        posts.push(Post {
            url,
            title,
            author: element_text(author_element),
            body: body_html,
        });
    }
    Ok(posts)
}

pub fn format_post(post: &Post) -> String {
    format!(
        "<b>{}</b> <a href=\"{}\">{}</a>\n{}",
        post.author, post.url, post.title, post.body
    )
}

pub fn render_thread(posts: &[Post]) -> String {
    posts
        .iter()
        .map(format_post)
        .collect::<Vec<_>>()
        .join(POST_SEPARATOR)
}

/// Nearest ancestor of the author markup that also holds a post body.
fn enclosing_post_block<'a>(
    author: ElementRef<'a>,
    body: &scraper::Selector,
) -> Option<ElementRef<'a>> {
    author
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| ancestor.select(body).next().is_some())
}

fn post_url(page_url: &str, href: &str) -> String {
    if href.is_empty() {
        return page_url.to_string();
    }
    if href.starts_with('#') {
        return format!("{page_url}{href}");
    }
    match Url::parse(page_url).and_then(|base| base.join(href)) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{page_url}{href}"),
    }
}
