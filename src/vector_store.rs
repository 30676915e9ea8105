//! Vector-store remote.
//!
//! Implements [`RemoteStore`] on top of an OpenAI-compatible files and
//! vector-stores API. Each content node becomes one Markdown file attached
//! to a single vector store; the file id is the node's remote id.
//!
//! # Configuration
//!
//! ```toml
//! [remote]
//! base_url = "https://api.openai.com/v1"
//! vector_store_name = "Help Center"   # or vector_store_id = "vs_..."
//! api_key_env = "OPENAI_API_KEY"
//! ```
//!
//! # Operations
//!
//! | Operation | Requests |
//! |-----------|----------|
//! | create | `POST /files` (multipart), `POST /vector_stores/{vs}/files` |
//! | update | create new file, then delete the old one |
//! | delete | `DELETE /vector_stores/{vs}/files/{id}`, `DELETE /files/{id}` |
//! | list | `GET /vector_stores/{vs}/files?limit=100&after=…` |
//!
//! Files are immutable, so an update always yields a new remote id.
//! A 404 on delete means the object is already gone and counts as success.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use corpus_sync_core::error::RemoteError;
use corpus_sync_core::models::ContentNode;
use corpus_sync_core::remote::RemoteStore;

use crate::config::RemoteConfig;

const PAGE_LIMIT: u32 = 100;
const MAX_SLUG_LEN: usize = 80;

#[derive(Debug, Deserialize)]
struct IdObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct NamedObject {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListPage<T> {
    data: Vec<T>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    last_id: Option<String>,
}

/// Turn a title into a file-name-safe slug.
///
/// Lowercase ASCII alphanumerics separated by single dashes; falls back to
/// `fallback` when nothing usable remains.
pub fn slugify(title: &str, fallback: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        fallback
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect()
    } else {
        slug.to_string()
    }
}

/// The uploaded document for a node.
pub fn render_markdown(node: &ContentNode) -> String {
    format!("# {}\n\n{}\n", node.title.trim(), node.body.trim())
}

fn network(err: reqwest::Error) -> RemoteError {
    RemoteError::Transient(err.to_string())
}

async fn check(resp: Response) -> Result<Response, RemoteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(RemoteError::from_status(status.as_u16(), &body))
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, RemoteError> {
    resp.json::<T>()
        .await
        .map_err(|e| RemoteError::Permanent(format!("invalid response body: {}", e)))
}

/// [`RemoteStore`] backed by one vector store.
pub struct VectorStoreRemote {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    vector_store_id: String,
}

impl VectorStoreRemote {
    /// Build from config: reads the API key from the environment and
    /// resolves the vector store, creating it by name when needed.
    pub async fn connect(config: &RemoteConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("{} environment variable not set", config.api_key_env))?;

        let mut remote = Self::with_store(&config.base_url, api_key, String::new())?;
        remote.vector_store_id = match (&config.vector_store_id, &config.vector_store_name) {
            (Some(id), _) => id.clone(),
            (None, Some(name)) => remote.get_or_create_store(name).await?,
            (None, None) => bail!("remote needs either vector_store_id or vector_store_name"),
        };
        info!(vector_store = %remote.vector_store_id, "using vector store");
        Ok(remote)
    }

    /// Use an already known vector store.
    pub fn with_store(
        base_url: &str,
        api_key: impl Into<String>,
        vector_store_id: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            vector_store_id: vector_store_id.into(),
        })
    }

    pub fn vector_store_id(&self) -> &str {
        &self.vector_store_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, RemoteError> {
        req.bearer_auth(&self.api_key).send().await.map_err(network)
    }

    async fn get_or_create_store(&self, name: &str) -> Result<String> {
        let mut after: Option<String> = None;
        loop {
            let mut req = self
                .client
                .get(self.url("vector_stores"))
                .query(&[("limit", PAGE_LIMIT.to_string())]);
            if let Some(cursor) = &after {
                req = req.query(&[("after", cursor)]);
            }
            let resp = check(self.send(req).await?).await?;
            let page: ListPage<NamedObject> = decode(resp).await?;

            if let Some(found) = page.data.iter().find(|s| s.name.as_deref() == Some(name)) {
                debug!(name, id = %found.id, "found existing vector store");
                return Ok(found.id.clone());
            }
            if !page.has_more {
                break;
            }
            after = page.last_id.or_else(|| page.data.last().map(|s| s.id.clone()));
            if after.is_none() {
                break;
            }
        }

        let req = self
            .client
            .post(self.url("vector_stores"))
            .json(&serde_json::json!({ "name": name }));
        let created: IdObject = decode(check(self.send(req).await?).await?).await?;
        info!(name, id = %created.id, "created vector store");
        Ok(created.id)
    }

    async fn upload_file(&self, node: &ContentNode) -> Result<String, RemoteError> {
        let file_name = format!("{}.md", slugify(&node.title, &node.id));
        let part = Part::bytes(render_markdown(node).into_bytes()).file_name(file_name);
        let form = Form::new().text("purpose", "assistants").part("file", part);

        let req = self.client.post(self.url("files")).multipart(form);
        let file: IdObject = decode(check(self.send(req).await?).await?).await?;
        Ok(file.id)
    }

    async fn attach_file(&self, file_id: &str) -> Result<(), RemoteError> {
        let req = self
            .client
            .post(self.url(&format!("vector_stores/{}/files", self.vector_store_id)))
            .json(&serde_json::json!({ "file_id": file_id }));
        check(self.send(req).await?).await?;
        Ok(())
    }

    /// DELETE that treats 404 as already done.
    async fn delete_path(&self, path: &str) -> Result<(), RemoteError> {
        let resp = self.send(self.client.delete(self.url(path))).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!(path, "already deleted");
            return Ok(());
        }
        check(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for VectorStoreRemote {
    async fn create(&self, node: &ContentNode) -> Result<String, RemoteError> {
        let file_id = self.upload_file(node).await?;
        if let Err(err) = self.attach_file(&file_id).await {
            if let Err(cleanup) = self.delete_path(&format!("files/{}", file_id)).await {
                warn!(%file_id, error = %cleanup, "could not remove unattached file");
            }
            return Err(err);
        }
        debug!(id = %node.id, %file_id, "uploaded");
        Ok(file_id)
    }

    async fn update(
        &self,
        remote_id: &str,
        node: &ContentNode,
    ) -> Result<Option<String>, RemoteError> {
        let new_id = self.create(node).await?;
        if let Err(err) = self.delete(remote_id).await {
            warn!(
                id = %node.id,
                old = remote_id,
                new = %new_id,
                error = %err,
                "replaced file but could not delete the old one"
            );
        }
        Ok(Some(new_id))
    }

    async fn delete(&self, remote_id: &str) -> Result<(), RemoteError> {
        self.delete_path(&format!(
            "vector_stores/{}/files/{}",
            self.vector_store_id, remote_id
        ))
        .await?;
        self.delete_path(&format!("files/{}", remote_id)).await
    }

    async fn list(&self) -> Result<Vec<String>, RemoteError> {
        let mut ids = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let mut req = self
                .client
                .get(self.url(&format!("vector_stores/{}/files", self.vector_store_id)))
                .query(&[("limit", PAGE_LIMIT.to_string())]);
            if let Some(cursor) = &after {
                req = req.query(&[("after", cursor)]);
            }
            let page: ListPage<IdObject> = decode(check(self.send(req).await?).await?).await?;
            let last = page.data.last().map(|f| f.id.clone());
            ids.extend(page.data.into_iter().map(|f| f.id));
            if !page.has_more {
                break;
            }
            after = page.last_id.or(last);
            if after.is_none() {
                break;
            }
        }
        Ok(ids)
    }
}
