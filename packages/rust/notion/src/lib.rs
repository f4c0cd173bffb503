//! Notion API client: database query, property resolution, and child-block
//! listing/append/delete.
//!
//! Database and property calls fail with [`ChartSyncError::Query`]; block
//! calls fail with [`ChartSyncError::Reconcile`]. Every error names the
//! failing call (`METHOD /path`).

mod records;
mod wire;

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::json;
use tracing::{debug, instrument};

use chartsync_shared::{
    BlockSpec, ChartSyncError, DocumentBlock, HttpConfig, NotionConfig, PropertyRef, Result,
};

pub use records::{FetchOutcome, RecordFetcher};

/// User-Agent string for Notion requests.
const USER_AGENT: &str = concat!("chartsync/", env!("CARGO_PKG_VERSION"));

/// Page size used when listing section children.
pub const CHILDREN_PAGE_SIZE: usize = 50;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Everything needed to talk to the Notion API.
#[derive(Clone)]
pub struct NotionSettings {
    pub base_url: String,
    pub api_key: String,
    pub version: String,
    pub timeout_secs: u64,
}

impl NotionSettings {
    /// Merge config sections with the resolved API key.
    pub fn from_config(notion: &NotionConfig, http: &HttpConfig, api_key: String) -> Self {
        Self {
            base_url: notion.base_url.clone(),
            api_key,
            version: notion.version.clone(),
            timeout_secs: http.timeout_secs,
        }
    }
}

impl std::fmt::Debug for NotionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotionSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("version", &self.version)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// One row of a database query: its id and property ids keyed by name.
#[derive(Debug, Clone)]
pub struct DatabaseRow {
    pub id: String,
    pub property_ids: HashMap<String, String>,
}

/// Result of a single-page database query.
#[derive(Debug, Clone)]
pub struct DatabaseQuery {
    pub rows: Vec<DatabaseRow>,
    /// The service holds more rows than fit in one page.
    pub has_more: bool,
}

/// A resolved property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Title or rich text, concatenated plain text.
    Text(String),
    /// Number property; `None` when the cell is empty.
    Number(Option<f64>),
    /// Any other property type, by type name.
    Other(String),
}

/// Child blocks of a section (first page only).
#[derive(Debug, Clone)]
pub struct BlockListing {
    pub blocks: Vec<DocumentBlock>,
    /// The section holds more blocks than fit in one page.
    pub has_more: bool,
}

/// Which error variant a failed call maps to.
#[derive(Debug, Clone, Copy)]
enum Surface {
    Database,
    Blocks,
}

impl Surface {
    fn error(self, call: &str, message: String) -> ChartSyncError {
        match self {
            Self::Database => ChartSyncError::query(call, message),
            Self::Blocks => ChartSyncError::reconcile(call, message),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Thin typed wrapper over the Notion REST API. Cheap to clone.
#[derive(Clone)]
pub struct NotionClient {
    client: Client,
    base_url: String,
    api_key: String,
    version: String,
}

impl NotionClient {
    /// Create a client with a bounded per-request timeout.
    pub fn new(settings: NotionSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ChartSyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key,
            version: settings.version,
        })
    }

    /// Query a database once (no pagination).
    #[instrument(skip(self))]
    pub async fn query_database(&self, database_id: &str) -> Result<DatabaseQuery> {
        let path = format!("/v1/databases/{database_id}/query");
        let response: wire::QueryResponse = self
            .execute(Method::POST, &path, Surface::Database, |req| req.json(&json!({})))
            .await?;

        let rows = response
            .results
            .into_iter()
            .map(|page| DatabaseRow {
                id: page.id,
                property_ids: page
                    .properties
                    .into_iter()
                    .map(|(name, stub)| (name, stub.id))
                    .collect(),
            })
            .collect();

        Ok(DatabaseQuery {
            rows,
            has_more: response.has_more,
        })
    }

    /// Resolve one property reference to its value.
    #[instrument(skip(self), fields(record_id = %reference.record_id, property_id = %reference.property_id))]
    pub async fn retrieve_property(&self, reference: &PropertyRef) -> Result<PropertyValue> {
        let path = format!(
            "/v1/pages/{}/properties/{}",
            reference.record_id, reference.property_id
        );
        let response: wire::PropertyResponse = self
            .execute(Method::GET, &path, Surface::Database, |req| req)
            .await?;

        Ok(property_value(response))
    }

    /// List up to [`CHILDREN_PAGE_SIZE`] child blocks of a section.
    #[instrument(skip(self))]
    pub async fn list_children(&self, section_id: &str) -> Result<BlockListing> {
        let path = format!("/v1/blocks/{section_id}/children");
        let response: wire::BlockListResponse = self
            .execute(Method::GET, &path, Surface::Blocks, |req| {
                req.query(&[("page_size", CHILDREN_PAGE_SIZE)])
            })
            .await?;

        Ok(BlockListing {
            blocks: response.results.into_iter().map(DocumentBlock::from).collect(),
            has_more: response.has_more,
        })
    }

    /// Append blocks to the end of a section in a single call.
    /// Returns the created blocks.
    #[instrument(skip(self, children), fields(count = children.len()))]
    pub async fn append_children(
        &self,
        section_id: &str,
        children: &[BlockSpec],
    ) -> Result<Vec<DocumentBlock>> {
        let path = format!("/v1/blocks/{section_id}/children");
        let response: wire::BlockListResponse = self
            .execute(Method::PATCH, &path, Surface::Blocks, |req| {
                req.json(&json!({ "children": children }))
            })
            .await?;

        Ok(response.results.into_iter().map(DocumentBlock::from).collect())
    }

    /// Delete (archive) one block.
    #[instrument(skip(self))]
    pub async fn delete_block(&self, block_id: &str) -> Result<()> {
        let path = format!("/v1/blocks/{block_id}");
        let _: IgnoredAny = self
            .execute(Method::DELETE, &path, Surface::Blocks, |req| req)
            .await?;
        Ok(())
    }

    /// Send an authenticated request and decode the JSON body.
    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        surface: Surface,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<T> {
        let call = format!("{method} {path}");
        let url = format!("{}{path}", self.base_url);
        debug!(%call, "notion request");

        let request = self
            .client
            .request(method, &url)
            .bearer_auth(&self.api_key)
            .header("Notion-Version", &self.version);

        let response = build(request)
            .send()
            .await
            .map_err(|e| surface.error(&call, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = match serde_json::from_str::<wire::ErrorBody>(&body) {
                Ok(err) if !err.message.is_empty() => format!("{}: {}", err.code, err.message),
                _ => body,
            };
            return Err(surface.error(&call, format!("HTTP {status}: {detail}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| surface.error(&call, format!("malformed response body: {e}")))
    }
}

/// Collapse a property response into a single value.
fn property_value(response: wire::PropertyResponse) -> PropertyValue {
    match response {
        wire::PropertyResponse::PropertyItem(item) => match item.kind.as_str() {
            "number" => PropertyValue::Number(item.number),
            _ => PropertyValue::Other(item.kind),
        },
        wire::PropertyResponse::List { results, has_more } => {
            if has_more {
                debug!("property value truncated to first page of text items");
            }
            let Some(first) = results.first() else {
                return PropertyValue::Text(String::new());
            };
            if first.kind != "title" && first.kind != "rich_text" {
                return PropertyValue::Other(first.kind.clone());
            }
            let text = results
                .iter()
                .filter_map(|item| item.title.as_ref().or(item.rich_text.as_ref()))
                .map(|t| t.plain_text.as_str())
                .collect::<String>();
            PropertyValue::Text(text)
        }
    }
}
