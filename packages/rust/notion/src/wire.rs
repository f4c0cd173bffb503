//! Notion API response shapes (only the fields chartsync reads).

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use chartsync_shared::DocumentBlock;

/// `POST /v1/databases/{id}/query`
#[derive(Debug, Deserialize)]
pub(crate) struct QueryResponse {
    #[serde(default)]
    pub results: Vec<PageObject>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PageObject {
    pub id: String,
    #[serde(default)]
    pub properties: HashMap<String, PropertyStub>,
}

/// Property entry of a queried page; only the id is needed to resolve it.
#[derive(Debug, Deserialize)]
pub(crate) struct PropertyStub {
    pub id: String,
}

/// `GET /v1/pages/{page}/properties/{prop}`
///
/// Title and rich text come back as a paginated list of items, scalar
/// properties as a single item.
#[derive(Debug, Deserialize)]
#[serde(tag = "object", rename_all = "snake_case")]
pub(crate) enum PropertyResponse {
    List {
        #[serde(default)]
        results: Vec<PropertyItem>,
        #[serde(default)]
        has_more: bool,
    },
    PropertyItem(PropertyItem),
}

#[derive(Debug, Deserialize)]
pub(crate) struct PropertyItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: Option<TextItem>,
    #[serde(default)]
    pub rich_text: Option<TextItem>,
    #[serde(default)]
    pub number: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TextItem {
    #[serde(default)]
    pub plain_text: String,
}

/// `GET /v1/blocks/{id}/children` and `PATCH /v1/blocks/{id}/children`
#[derive(Debug, Deserialize)]
pub(crate) struct BlockListResponse {
    #[serde(default)]
    pub results: Vec<RawBlock>,
    #[serde(default)]
    pub has_more: bool,
}

/// A block object: the payload lives under a key named after its type.
#[derive(Debug, Deserialize)]
pub(crate) struct RawBlock {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub has_children: bool,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl From<RawBlock> for DocumentBlock {
    fn from(mut raw: RawBlock) -> Self {
        let payload = raw.rest.remove(&raw.kind).unwrap_or(Value::Null);
        Self {
            id: raw.id,
            kind: raw.kind,
            payload,
            has_children: raw.has_children,
        }
    }
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}
