//! Help-center connector.
//!
//! Walks a help-center REST API (categories → sections → articles) and
//! flattens it into a content tree. Every list endpoint is paginated via an
//! absolute `next_page` URL which is followed until it is `null`.
//!
//! # Configuration
//!
//! ```toml
//! [source]
//! kind = "help_center"
//! base_url = "https://support.example.com/api/v2/help_center"
//! locale = "en-us"
//! per_page = 100
//! include_drafts = false
//! ```
//!
//! # Identifiers
//!
//! Categories, sections and articles are numbered independently, so ids are
//! prefixed with their kind: `category:1`, `section:1`, `article:1`.
//!
//! # Failure Handling
//!
//! Each GET is retried on transient failures (network, 408, 429, 5xx) with
//! the executor's backoff settings. If any request ultimately fails the
//! whole fetch fails: a partial tree would be diffed as mass deletions.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use corpus_sync_core::error::{RemoteError, SourceError};
use corpus_sync_core::hash::normalize_body;
use corpus_sync_core::models::{ContentNode, NodeKind};
use corpus_sync_core::source::ContentSource;

use crate::config::HelpCenterConfig;
use crate::executor::{retry, RetryPolicy};

// ═══════════════════════════════════════════════════════════════════════
// API response shapes
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct Category {
    id: u64,
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Section {
    id: u64,
    category_id: u64,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parent_section_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Article {
    id: u64,
    section_id: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    draft: bool,
}

#[derive(Debug, Deserialize)]
struct CategoriesPage {
    categories: Vec<Category>,
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SectionsPage {
    sections: Vec<Section>,
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArticlesPage {
    articles: Vec<Article>,
    next_page: Option<String>,
}

trait Page: DeserializeOwned {
    type Item;
    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

impl Page for CategoriesPage {
    type Item = Category;
    fn into_parts(self) -> (Vec<Category>, Option<String>) {
        (self.categories, self.next_page)
    }
}

impl Page for SectionsPage {
    type Item = Section;
    fn into_parts(self) -> (Vec<Section>, Option<String>) {
        (self.sections, self.next_page)
    }
}

impl Page for ArticlesPage {
    type Item = Article;
    fn into_parts(self) -> (Vec<Article>, Option<String>) {
        (self.articles, self.next_page)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Node mapping
// ═══════════════════════════════════════════════════════════════════════

fn category_id(id: u64) -> String {
    format!("category:{}", id)
}

fn section_id(id: u64) -> String {
    format!("section:{}", id)
}

fn article_id(id: u64) -> String {
    format!("article:{}", id)
}

fn category_node(c: Category) -> ContentNode {
    ContentNode {
        id: category_id(c.id),
        parent_id: None,
        kind: NodeKind::Category,
        title: c.name,
        body: normalize_body(&c.description.unwrap_or_default()),
    }
}

fn section_node(s: Section) -> ContentNode {
    let parent = match s.parent_section_id {
        Some(parent) => section_id(parent),
        None => category_id(s.category_id),
    };
    ContentNode {
        id: section_id(s.id),
        parent_id: Some(parent),
        kind: NodeKind::Section,
        title: s.name,
        body: normalize_body(&s.description.unwrap_or_default()),
    }
}

fn article_node(a: Article) -> ContentNode {
    ContentNode {
        id: article_id(a.id),
        parent_id: Some(section_id(a.section_id)),
        kind: NodeKind::Article,
        title: a.title,
        body: normalize_body(&a.body.unwrap_or_default()),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Connector
// ═══════════════════════════════════════════════════════════════════════

/// A [`ContentSource`] backed by a help-center REST API.
pub struct HelpCenterSource {
    client: reqwest::Client,
    config: HelpCenterConfig,
    retry: RetryPolicy,
}

impl HelpCenterSource {
    pub fn new(config: HelpCenterConfig, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config,
            retry,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}/{}?per_page={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.locale,
            path,
            self.config.per_page
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, RemoteError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RemoteError::Transient(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::from_status(status.as_u16(), &body));
        }

        resp.json::<T>()
            .await
            .map_err(|e| RemoteError::Permanent(format!("invalid response from {}: {}", url, e)))
    }

    /// Fetch every page starting at `url`.
    async fn get_all_pages<P: Page>(&self, url: String) -> Result<Vec<P::Item>, SourceError> {
        let mut items = Vec::new();
        let mut next = Some(url);
        while let Some(url) = next {
            let page: P = retry(&url, &self.retry, || self.get_json::<P>(&url))
                .await
                .map_err(|e| {
                    SourceError::Unavailable(format!(
                        "GET {} failed after {} attempt(s): {}",
                        url, e.attempts, e.error
                    ))
                })?;
            let (batch, next_page) = page.into_parts();
            debug!(%url, items = batch.len(), "fetched page");
            items.extend(batch);
            next = next_page;
        }
        Ok(items)
    }
}

#[async_trait]
impl ContentSource for HelpCenterSource {
    fn name(&self) -> &str {
        "help_center"
    }

    async fn fetch_tree(&self) -> Result<Vec<ContentNode>, SourceError> {
        let categories: Vec<Category> = self
            .get_all_pages::<CategoriesPage>(self.endpoint("categories.json"))
            .await?;

        // Per-parent listings run concurrently; `buffered` keeps them in
        // parent order.
        let sections: Vec<Section> = stream::iter(
            categories
                .iter()
                .map(|category| self.endpoint(&format!("categories/{}/sections.json", category.id)))
                .collect::<Vec<String>>(),
        )
            .map(|url: String| self.get_all_pages::<SectionsPage>(url))
            .buffered(self.config.fetch_concurrency)
            .try_collect::<Vec<_>>()
            .await?
            .into_iter()
            .flatten()
            .collect();

        let articles: Vec<Article> = stream::iter(
            sections
                .iter()
                .map(|section| self.endpoint(&format!("sections/{}/articles.json", section.id)))
                .collect::<Vec<String>>(),
        )
            .map(|url: String| self.get_all_pages::<ArticlesPage>(url))
            .buffered(self.config.fetch_concurrency)
            .try_collect::<Vec<_>>()
            .await?
            .into_iter()
            .flatten()
            .collect();

        let total_articles = articles.len();
        let articles: Vec<Article> = articles
            .into_iter()
            .filter(|a| self.config.include_drafts || !a.draft)
            .collect();

        info!(
            categories = categories.len(),
            sections = sections.len(),
            articles = articles.len(),
            drafts_skipped = total_articles - articles.len(),
            "help center fetched"
        );

        let mut nodes = Vec::with_capacity(categories.len() + sections.len() + articles.len());
        nodes.extend(categories.into_iter().map(category_node));
        nodes.extend(sections.into_iter().map(section_node));
        nodes.extend(articles.into_iter().map(article_node));
        Ok(nodes)
    }
}
