//! Record fetching: one database query, then two property lookups per row.

use futures::stream::{self, StreamExt};
use tracing::{info, instrument, warn};

use chartsync_shared::{
    ChartSeries, ChartSyncError, PropertyRef, Record, Result, SkippedRecord,
};

use crate::{DatabaseRow, NotionClient, PropertyValue};

/// Records and the chart series resolved from them.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Records that resolved, in query order.
    pub records: Vec<Record>,
    /// `series` index i belongs to `records[i]`.
    pub series: ChartSeries,
    /// Rows dropped because a property was missing or did not resolve.
    pub skipped: Vec<SkippedRecord>,
    /// Rows returned by the query.
    pub rows_seen: usize,
}

/// Reads label/score pairs out of a Notion database.
#[derive(Clone)]
pub struct RecordFetcher {
    client: NotionClient,
    label_property: String,
    score_property: String,
    concurrency: usize,
}

impl RecordFetcher {
    pub fn new(
        client: NotionClient,
        label_property: impl Into<String>,
        score_property: impl Into<String>,
    ) -> Self {
        Self {
            client,
            label_property: label_property.into(),
            score_property: score_property.into(),
            concurrency: 1,
        }
    }

    /// Resolve up to `concurrency` records at once. Output order is unaffected.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Query the database and resolve every row's label and score.
    ///
    /// A failed query aborts. A row whose label or score cannot be resolved
    /// is logged, counted in [`FetchOutcome::skipped`], and left out.
    #[instrument(skip_all, fields(database_id = %database_id))]
    pub async fn fetch(&self, database_id: &str) -> Result<FetchOutcome> {
        let query = self.client.query_database(database_id).await?;
        let rows_seen = query.rows.len();

        if query.has_more {
            warn!(
                rows = rows_seen,
                "database has more rows than one page; only the first page is charted"
            );
        }

        let mut skipped = Vec::new();
        let mut records = Vec::with_capacity(rows_seen);
        for row in &query.rows {
            match self.to_record(row) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    warn!(record_id = %row.id, %reason, "skipping record");
                    skipped.push(SkippedRecord {
                        record_id: row.id.clone(),
                        reason,
                    });
                }
            }
        }

        let resolved: Vec<(Record, Result<(String, f64)>)> = stream::iter(records)
            .map(|record| async move {
                let values = self.resolve(&record).await;
                (record, values)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut series = ChartSeries::default();
        let mut kept = Vec::with_capacity(resolved.len());
        for (record, values) in resolved {
            match values {
                Ok((label, score)) => {
                    series.push(label, score);
                    kept.push(record);
                }
                Err(e) => {
                    warn!(record_id = %record.id, error = %e, "skipping record");
                    skipped.push(SkippedRecord {
                        record_id: record.id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            rows = rows_seen,
            charted = series.len(),
            skipped = skipped.len(),
            "records fetched"
        );

        Ok(FetchOutcome {
            records: kept,
            series,
            skipped,
            rows_seen,
        })
    }

    fn to_record(&self, row: &DatabaseRow) -> std::result::Result<Record, String> {
        let lookup = |name: &str| {
            row.property_ids
                .get(name)
                .map(|property_id| PropertyRef {
                    record_id: row.id.clone(),
                    property_id: property_id.clone(),
                })
                .ok_or_else(|| format!("property '{name}' not present"))
        };

        Ok(Record {
            id: row.id.clone(),
            label_ref: lookup(&self.label_property)?,
            score_ref: lookup(&self.score_property)?,
        })
    }

    /// Both values must resolve or the record is dropped.
    async fn resolve(&self, record: &Record) -> Result<(String, f64)> {
        let label = match self.client.retrieve_property(&record.label_ref).await? {
            PropertyValue::Text(text) if !text.trim().is_empty() => text,
            PropertyValue::Text(_) => {
                return Err(ChartSyncError::query(
                    self.label_property.clone(),
                    "label is empty",
                ));
            }
            other => {
                return Err(ChartSyncError::query(
                    self.label_property.clone(),
                    format!("expected a text property, got {other:?}"),
                ));
            }
        };

        let score = match self.client.retrieve_property(&record.score_ref).await? {
            PropertyValue::Number(Some(n)) => n,
            PropertyValue::Number(None) => {
                return Err(ChartSyncError::query(
                    self.score_property.clone(),
                    "score is empty",
                ));
            }
            other => {
                return Err(ChartSyncError::query(
                    self.score_property.clone(),
                    format!("expected a number property, got {other:?}"),
                ));
            }
        };

        Ok((label, score))
    }
}
