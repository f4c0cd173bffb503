//! End-to-end refresh pipeline: database → chart → image host → page.

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument};
use url::Url;

use chartsync_imghost::{ImageRehoster, RehostSettings};
use chartsync_notion::{NotionClient, NotionSettings, RecordFetcher};
use chartsync_render::{ChartRenderer, RenderSettings};
use chartsync_shared::{
    ChartSyncError, MismatchPolicy, Result, RunId, SkippedRecord, Stage,
};

use crate::reconcile::{DocumentBlockReconciler, ReconcileOutcome};

/// Configuration for one refresh run.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Database to chart (normalised id).
    pub database_id: String,
    /// Section whose image blocks are replaced (normalised id).
    pub page_id: String,
    /// Chart.js chart type.
    pub chart_type: String,
    /// Plan only: no upload, no document mutation.
    pub dry_run: bool,
    pub notion: NotionSettings,
    pub render: RenderSettings,
    /// Image host settings; not needed for a dry run.
    pub rehost: Option<RehostSettings>,
    pub label_property: String,
    pub score_property: String,
    pub fetch_concurrency: usize,
    pub on_mismatch: MismatchPolicy,
}

/// Result of a refresh run.
#[derive(Debug)]
pub struct RefreshReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    /// Rows returned by the database query.
    pub rows_seen: usize,
    /// Rows that made it into the chart.
    pub charted: usize,
    pub skipped: Vec<SkippedRecord>,
    /// SHA-256 of the charted labels and values.
    pub series_fingerprint: String,
    /// Chart service URL.
    pub chart_url: Url,
    /// Rehosted image URL; `None` for a dry run.
    pub image_url: Option<Url>,
    pub reconcile: ReconcileOutcome,
    pub dry_run: bool,
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new stage.
    fn phase(&self, name: &str);
    /// Called when the pipeline completes.
    fn done(&self, report: &RefreshReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _report: &RefreshReport) {}
}

/// The four refresh components, wired from one [`RefreshConfig`].
pub struct RefreshPipeline {
    fetcher: RecordFetcher,
    renderer: ChartRenderer,
    rehoster: Option<ImageRehoster>,
    reconciler: DocumentBlockReconciler,
}

impl RefreshPipeline {
    /// Build every component. Fails if a real run has no image host settings.
    pub fn new(config: &RefreshConfig) -> Result<Self> {
        let notion = NotionClient::new(config.notion.clone())?;

        let fetcher = RecordFetcher::new(
            notion.clone(),
            config.label_property.clone(),
            config.score_property.clone(),
        )
        .with_concurrency(config.fetch_concurrency);

        let renderer = ChartRenderer::new(config.render.clone())?;

        let rehoster = match (&config.rehost, config.dry_run) {
            (Some(settings), _) => Some(ImageRehoster::new(settings.clone())?),
            (None, true) => None,
            (None, false) => {
                return Err(ChartSyncError::config(
                    "image host settings are required unless running dry",
                ));
            }
        };

        let reconciler = DocumentBlockReconciler::new(notion, config.on_mismatch);

        Ok(Self {
            fetcher,
            renderer,
            rehoster,
            reconciler,
        })
    }

    /// Run fetch → render → rehost → reconcile. The first failure aborts.
    #[instrument(skip_all, fields(database_id = %config.database_id, page_id = %config.page_id, dry_run = config.dry_run))]
    pub async fn run(
        &self,
        config: &RefreshConfig,
        progress: &dyn ProgressReporter,
    ) -> Result<RefreshReport> {
        let start = Instant::now();
        let run_id = RunId::new();
        let started_at = Utc::now();

        info!(%run_id, chart_type = %config.chart_type, "starting refresh");

        let result = self.stages(config, progress).await;
        let (fetched, chart_url, image_url, reconcile) = match result {
            Ok(parts) => parts,
            Err(e) => {
                error!(%run_id, stage = %e.stage(), call = e.call().unwrap_or("-"), error = %e, "refresh aborted");
                return Err(e);
            }
        };

        let report = RefreshReport {
            run_id,
            started_at,
            rows_seen: fetched.rows_seen,
            charted: fetched.series.len(),
            series_fingerprint: fetched.series.fingerprint(),
            skipped: fetched.skipped,
            chart_url,
            image_url,
            reconcile,
            dry_run: config.dry_run,
            elapsed: start.elapsed(),
        };

        progress.done(&report);

        info!(
            run_id = %report.run_id,
            charted = report.charted,
            skipped = report.skipped.len(),
            blocks_after = report.reconcile.blocks.len(),
            elapsed_ms = report.elapsed.as_millis(),
            "refresh complete"
        );

        Ok(report)
    }

    async fn stages(
        &self,
        config: &RefreshConfig,
        progress: &dyn ProgressReporter,
    ) -> Result<(
        chartsync_notion::FetchOutcome,
        Url,
        Option<Url>,
        ReconcileOutcome,
    )> {
        // --- Stage 1: Fetch ---
        progress.phase("Fetching records");
        let fetched = self.fetcher.fetch(&config.database_id).await?;

        // --- Stage 2: Render ---
        progress.phase("Rendering chart");
        let chart_url = self
            .renderer
            .render(&fetched.series, &config.chart_type)
            .await?;

        // --- Stage 3: Rehost ---
        let image_url = match (&self.rehoster, config.dry_run) {
            (Some(rehoster), false) => {
                progress.phase("Uploading chart image");
                Some(rehoster.rehost(&chart_url).await?)
            }
            _ => None,
        };

        // --- Stage 4: Reconcile ---
        let reconcile = match &image_url {
            Some(url) => {
                progress.phase("Replacing page images");
                self.reconciler
                    .reconcile(&config.page_id, &[url.to_string()])
                    .await?
            }
            None => {
                progress.phase("Planning page update");
                self.reconciler
                    .preview(&config.page_id, &[chart_url.to_string()])
                    .await?
            }
        };

        Ok((fetched, chart_url, image_url, reconcile))
    }
}

/// Build the pipeline from `config` and run it once.
pub async fn refresh(
    config: &RefreshConfig,
    progress: &dyn ProgressReporter,
) -> Result<RefreshReport> {
    RefreshPipeline::new(config)?.run(config, progress).await
}

/// Whether a failed run may have left the document partially updated.
pub fn may_have_mutated(err: &ChartSyncError) -> bool {
    err.stage() == Stage::Reconcile && err.call().is_some_and(|c| c.starts_with("DELETE"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn config_for(server: &MockServer, dry_run: bool) -> RefreshConfig {
        RefreshConfig {
            database_id: "db".into(),
            page_id: "page".into(),
            chart_type: "pie".into(),
            dry_run,
            notion: NotionSettings {
                base_url: server.uri(),
                api_key: "secret_test".into(),
                version: "2022-06-28".into(),
                timeout_secs: 5,
            },
            render: RenderSettings::default(),
            rehost: Some(RehostSettings {
                base_url: server.uri(),
                client_id: "cid".into(),
                timeout_secs: 5,
            }),
            label_property: "Name".into(),
            score_property: "Score".into(),
            fetch_concurrency: 1,
            on_mismatch: MismatchPolicy::Strict,
        }
    }

    async fn mount_database(server: &MockServer) {
        let rows: Vec<serde_json::Value> = ["r1", "r2", "r3"]
            .iter()
            .map(|id| {
                json!({
                    "id": id,
                    "properties": {
                        "Name": { "id": "title", "type": "title" },
                        "Score": { "id": "scr", "type": "number" }
                    }
                })
            })
            .collect();

        Mock::given(method("POST"))
            .and(path("/v1/databases/db/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list", "results": rows, "has_more": false
            })))
            .mount(server)
            .await;

        for (id, name, score) in [("r1", "Ann", 4.0), ("r2", "Ben", 2.0), ("r3", "Cat", 7.0)] {
            Mock::given(method("GET"))
                .and(path(format!("/v1/pages/{id}/properties/title")))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "object": "list",
                    "results": [{ "object": "property_item", "type": "title", "title": { "plain_text": name } }]
                })))
                .mount(server)
                .await;
            Mock::given(method("GET"))
                .and(path(format!("/v1/pages/{id}/properties/scr")))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "object": "property_item", "type": "number", "number": score
                })))
                .mount(server)
                .await;
        }
    }

    async fn mount_section(server: &MockServer, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/v1/blocks/page/children"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "results": [
                    { "id": "t0", "type": "paragraph", "paragraph": { "rich_text": [] } },
                    { "id": "i1", "type": "image", "image": { "type": "external", "external": { "url": "https://old.png" } } },
                    { "id": "t2", "type": "to_do", "to_do": { "rich_text": [], "checked": true } }
                ],
                "has_more": false
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn echo_append(req: &Request) -> ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
        let results: Vec<serde_json::Value> = body["children"]
            .as_array()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, child)| {
                let mut block = child.clone();
                block["id"] = json!(format!("n{i}"));
                block
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({ "object": "list", "results": results }))
    }

    async fn mount_mutations(server: &MockServer, appends: u64, deletes: u64) {
        Mock::given(method("PATCH"))
            .and(path("/v1/blocks/page/children"))
            .respond_with(echo_append)
            .expect(appends)
            .mount(server)
            .await;
        Mock::given(method("DELETE"))
            .and(path_regex(r"^/v1/blocks/[a-z0-9]+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "archived": true })))
            .expect(deletes)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn full_refresh_replaces_the_chart() {
        let server = MockServer::start().await;
        mount_database(&server).await;
        mount_section(&server, 1).await;
        mount_mutations(&server, 1, 3).await;

        Mock::given(method("POST"))
            .and(path("/3/image"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "link": "https://i.imgur.com/chart.png" }, "success": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = config_for(&server, false);
        let report = refresh(&config, &SilentProgress).await.unwrap();

        assert_eq!(report.rows_seen, 3);
        assert_eq!(report.charted, 3);
        assert!(report.skipped.is_empty());
        assert_eq!(report.chart_url.host_str(), Some("quickchart.io"));
        assert_eq!(
            report.image_url.as_ref().map(Url::as_str),
            Some("https://i.imgur.com/chart.png")
        );

        let blocks = &report.reconcile.blocks;
        let kinds: Vec<&str> = blocks.iter().map(|b| b.kind.as_str()).collect();
        assert_eq!(kinds, ["paragraph", "image", "to_do"]);
        assert_eq!(blocks[1].payload["external"]["url"], "https://i.imgur.com/chart.png");
        assert_eq!(blocks[2].payload["checked"], true);
    }

    #[tokio::test]
    async fn image_host_failure_leaves_document_untouched() {
        let server = MockServer::start().await;
        mount_database(&server).await;
        mount_section(&server, 0).await;
        mount_mutations(&server, 0, 0).await;

        Mock::given(method("POST"))
            .and(path("/3/image"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let config = config_for(&server, false);
        let err = refresh(&config, &SilentProgress).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Rehost);
        assert!(!may_have_mutated(&err));
    }

    #[tokio::test]
    async fn query_failure_aborts_before_rendering() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db/query"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/3/image"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        mount_section(&server, 0).await;

        let config = config_for(&server, false);
        let err = refresh(&config, &SilentProgress).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Fetch);
        assert_eq!(err.call(), Some("POST /v1/databases/db/query"));
    }

    #[tokio::test]
    async fn dry_run_plans_without_uploading_or_mutating() {
        let server = MockServer::start().await;
        mount_database(&server).await;
        mount_section(&server, 1).await;
        mount_mutations(&server, 0, 0).await;

        Mock::given(method("POST"))
            .and(path("/3/image"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = config_for(&server, true);
        config.rehost = None;
        let report = refresh(&config, &SilentProgress).await.unwrap();

        assert!(report.dry_run);
        assert!(report.image_url.is_none());
        assert!(!report.reconcile.applied);
        assert_eq!(report.reconcile.plan.slots_filled, 1);
        assert_eq!(
            report.reconcile.plan.children[1].image_url(),
            Some(report.chart_url.as_str())
        );
    }

    #[test]
    fn real_run_requires_image_host() {
        let server_uri = "http://127.0.0.1:9";
        let mut config = RefreshConfig {
            database_id: "db".into(),
            page_id: "page".into(),
            chart_type: "bar".into(),
            dry_run: false,
            notion: NotionSettings {
                base_url: server_uri.into(),
                api_key: "k".into(),
                version: "2022-06-28".into(),
                timeout_secs: 1,
            },
            render: RenderSettings::default(),
            rehost: None,
            label_property: "Name".into(),
            score_property: "Score".into(),
            fetch_concurrency: 1,
            on_mismatch: MismatchPolicy::Strict,
        };
        assert!(RefreshPipeline::new(&config).is_err());

        config.dry_run = true;
        assert!(RefreshPipeline::new(&config).is_ok());
    }

    #[test]
    fn delete_failures_flag_possible_mutation() {
        let err = ChartSyncError::reconcile("DELETE /v1/blocks/x", "HTTP 500");
        assert!(may_have_mutated(&err));
        let err = ChartSyncError::reconcile("PATCH /v1/blocks/p/children", "HTTP 500");
        assert!(!may_have_mutated(&err));
    }
}
