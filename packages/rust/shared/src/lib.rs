//! Shared types, error model, and configuration for chartsync.
//!
//! This crate is the foundation depended on by all other chartsync crates.
//! It provides:
//! - [`ChartSyncError`]: the unified error type, tagged by pipeline [`Stage`]
//! - Domain types ([`Record`], [`ChartSeries`], [`DocumentBlock`], [`BlockSpec`])
//! - Configuration ([`AppConfig`], config loading, credential lookup)
//! - Notion id normalisation ([`normalize_id`])

pub mod config;
pub mod error;
pub mod ids;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ChartConfig, HttpConfig, ImgurConfig, MismatchPolicy, NotionConfig,
    ReconcileConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    read_secret,
};
pub use error::{ChartSyncError, Result, Stage};
pub use ids::normalize_id;
pub use types::{
    BlockSpec, ChartSeries, DocumentBlock, IMAGE_KIND, PropertyRef, Record, RunId, SkippedRecord,
};
