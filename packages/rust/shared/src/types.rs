//! Core domain types for a chart refresh run.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{ChartSyncError, Result};

/// Block kind tag of image blocks.
pub const IMAGE_KIND: &str = "image";

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one refresh run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Pointer to one property value of one database record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRef {
    pub record_id: String,
    pub property_id: String,
}

/// One database row, holding references to its label and score properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub label_ref: PropertyRef,
    pub score_ref: PropertyRef,
}

/// A record dropped from the series because a property did not resolve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub record_id: String,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// ChartSeries
// ---------------------------------------------------------------------------

/// Parallel label/value arrays in database query order.
///
/// `labels[i]` and `values[i]` always describe the same record; the
/// constructors reject anything that would break that alignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    labels: Vec<String>,
    values: Vec<f64>,
}

impl ChartSeries {
    /// Build a series from parallel arrays of equal length.
    pub fn new(labels: Vec<String>, values: Vec<f64>) -> Result<Self> {
        if labels.len() != values.len() {
            return Err(ChartSyncError::validation(format!(
                "series has {} labels but {} values",
                labels.len(),
                values.len()
            )));
        }
        Ok(Self { labels, values })
    }

    /// Append one resolved record.
    pub fn push(&mut self, label: impl Into<String>, value: f64) {
        self.labels.push(label.into());
        self.values.push(value);
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// SHA-256 over labels and values, for comparing runs in logs.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (label, value) in self.labels.iter().zip(&self.values) {
            hasher.update(label.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.to_le_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

// ---------------------------------------------------------------------------
// Document blocks
// ---------------------------------------------------------------------------

/// One existing child block of a document section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentBlock {
    /// Opaque block identifier.
    pub id: String,
    /// Block type tag (`paragraph`, `image`, ...).
    pub kind: String,
    /// Kind-specific payload, preserved verbatim.
    pub payload: Value,
    /// Whether the block has nested children (these are not carried over).
    #[serde(default)]
    pub has_children: bool,
}

impl DocumentBlock {
    pub fn is_image(&self) -> bool {
        self.kind == IMAGE_KIND
    }
}

/// A block to be appended to a section.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockSpec {
    /// Non-image block copied from the original section.
    Preserved { kind: String, payload: Value },
    /// Freshly rendered chart referenced by external URL.
    ExternalImage { url: String },
}

impl BlockSpec {
    /// Copy kind and payload of an existing block.
    pub fn preserve(block: &DocumentBlock) -> Self {
        Self::Preserved {
            kind: block.kind.clone(),
            payload: block.payload.clone(),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Preserved { kind, .. } => kind,
            Self::ExternalImage { .. } => IMAGE_KIND,
        }
    }

    /// URL of a new image block, `None` for preserved blocks.
    pub fn image_url(&self) -> Option<&str> {
        match self {
            Self::ExternalImage { url } => Some(url),
            Self::Preserved { .. } => None,
        }
    }

    /// Request body shape expected by the block append API.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Preserved { kind, payload } => {
                let mut obj = serde_json::Map::new();
                obj.insert("object".into(), json!("block"));
                obj.insert("type".into(), json!(kind));
                obj.insert(kind.clone(), payload.clone());
                Value::Object(obj)
            }
            Self::ExternalImage { url } => json!({
                "object": "block",
                "type": IMAGE_KIND,
                IMAGE_KIND: {
                    "caption": [],
                    "type": "external",
                    "external": { "url": url },
                },
            }),
        }
    }
}

impl Serialize for BlockSpec {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
