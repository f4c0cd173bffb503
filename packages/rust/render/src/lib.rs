//! Chart rendering via QuickChart.
//!
//! No rendering happens locally: the Chart.js config is either encoded into a
//! `GET /chart` URL or stored server-side through `POST /chart/create`, and
//! either way the caller gets back a URL that serves the image.

mod kind;

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, instrument};
use url::Url;

use chartsync_shared::{ChartConfig, ChartSeries, ChartSyncError, HttpConfig, Result};

pub use kind::ChartKind;

/// User-Agent string for QuickChart requests.
const USER_AGENT: &str = concat!("chartsync/", env!("CARGO_PKG_VERSION"));

/// Output image format.
const FORMAT: &str = "png";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Chart appearance and endpoint.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub base_url: String,
    pub dataset_label: String,
    pub width: u32,
    pub height: u32,
    pub background: String,
    pub device_pixel_ratio: f32,
    pub short_url: bool,
    pub timeout_secs: u64,
}

impl RenderSettings {
    pub fn from_config(chart: &ChartConfig, http: &HttpConfig) -> Self {
        Self {
            base_url: chart.base_url.clone(),
            dataset_label: chart.dataset_label.clone(),
            width: chart.width,
            height: chart.height,
            background: chart.background.clone(),
            device_pixel_ratio: chart.device_pixel_ratio,
            short_url: chart.short_url,
            timeout_secs: http.timeout_secs,
        }
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self::from_config(&ChartConfig::default(), &HttpConfig::default())
    }
}

/// `POST /chart/create` request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest<'a> {
    chart: &'a Value,
    width: u32,
    height: u32,
    background_color: &'a str,
    device_pixel_ratio: f32,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    url: Option<String>,
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Turns a [`ChartSeries`] into a URL serving the chart image.
pub struct ChartRenderer {
    settings: RenderSettings,
    client: Client,
}

impl ChartRenderer {
    pub fn new(settings: RenderSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ChartSyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { settings, client })
    }

    /// Render `series` as a `chart_type` chart and return the image URL.
    ///
    /// Empty series and non-finite values are rejected instead of producing
    /// an empty or broken chart.
    #[instrument(skip_all, fields(chart_type = %chart_type, points = series.len()))]
    pub async fn render(&self, series: &ChartSeries, chart_type: &str) -> Result<Url> {
        let kind: ChartKind = chart_type.parse()?;
        validate(series)?;

        let url = if self.settings.short_url {
            self.short_url(series, kind).await?
        } else {
            self.chart_url(series, kind)?
        };

        info!(%kind, url_len = url.as_str().len(), "chart rendered");
        Ok(url)
    }

    /// Chart.js config for one dataset of `series`.
    pub fn chart_spec(&self, series: &ChartSeries, kind: ChartKind) -> Value {
        json!({
            "type": kind.as_str(),
            "data": {
                "labels": series.labels(),
                "datasets": [{
                    "label": self.settings.dataset_label,
                    "data": series.values(),
                }],
            },
        })
    }

    /// `GET /chart` URL with the config encoded in the query string.
    pub fn chart_url(&self, series: &ChartSeries, kind: ChartKind) -> Result<Url> {
        let spec = self.chart_spec(series, kind);
        let endpoint = format!("{}/chart", self.base_url());

        Url::parse_with_params(
            &endpoint,
            &[
                ("c", spec.to_string()),
                ("w", self.settings.width.to_string()),
                ("h", self.settings.height.to_string()),
                ("devicePixelRatio", self.settings.device_pixel_ratio.to_string()),
                ("f", FORMAT.to_string()),
                ("bkg", self.settings.background.clone()),
            ],
        )
        .map_err(|e| ChartSyncError::render(format!("GET {endpoint}"), e.to_string()))
    }

    /// Store the chart server-side and return its short URL.
    pub async fn short_url(&self, series: &ChartSeries, kind: ChartKind) -> Result<Url> {
        let spec = self.chart_spec(series, kind);
        let call = "POST /chart/create";
        let body = CreateRequest {
            chart: &spec,
            width: self.settings.width,
            height: self.settings.height,
            background_color: &self.settings.background,
            device_pixel_ratio: self.settings.device_pixel_ratio,
            format: FORMAT,
        };

        debug!(call, "requesting short chart url");
        let response = self
            .client
            .post(format!("{}/chart/create", self.base_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChartSyncError::render(call, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChartSyncError::render(call, format!("HTTP {status}")));
        }

        let created: CreateResponse = response
            .json()
            .await
            .map_err(|e| ChartSyncError::render(call, format!("malformed response body: {e}")))?;

        match created.url {
            Some(url) if created.success => Url::parse(&url)
                .map_err(|e| ChartSyncError::render(call, format!("invalid url '{url}': {e}"))),
            _ => Err(ChartSyncError::render(call, "chart service reported failure")),
        }
    }

    fn base_url(&self) -> &str {
        self.settings.base_url.trim_end_matches('/')
    }
}

fn validate(series: &ChartSeries) -> Result<()> {
    if series.is_empty() {
        return Err(ChartSyncError::render(
            "chart spec",
            "series is empty; refusing to render an empty chart",
        ));
    }
    if let Some(i) = series.values().iter().position(|v| !v.is_finite()) {
        return Err(ChartSyncError::render(
            "chart spec",
            format!("value for '{}' is not a finite number", series.labels()[i]),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn series() -> ChartSeries {
        ChartSeries::new(vec!["Ann".into(), "Ben".into()], vec![3.0, 9.5]).unwrap()
    }

    fn query_map(url: &Url) -> std::collections::HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    #[test]
    fn spec_has_single_scores_dataset() {
        let renderer = ChartRenderer::new(RenderSettings::default()).unwrap();
        let spec = renderer.chart_spec(&series(), ChartKind::Pie);
        assert_eq!(spec["type"], "pie");
        assert_eq!(spec["data"]["labels"], json!(["Ann", "Ben"]));
        assert_eq!(spec["data"]["datasets"][0]["label"], "Scores");
        assert_eq!(spec["data"]["datasets"][0]["data"], json!([3.0, 9.5]));
        assert_eq!(spec["data"]["datasets"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn chart_url_encodes_dimensions_and_background() {
        let renderer = ChartRenderer::new(RenderSettings::default()).unwrap();
        let url = renderer.chart_url(&series(), ChartKind::Bar).unwrap();
        assert_eq!(url.host_str(), Some("quickchart.io"));
        assert_eq!(url.path(), "/chart");

        let params = query_map(&url);
        assert_eq!(params["w"], "800");
        assert_eq!(params["h"], "400");
        assert_eq!(params["bkg"], "transparent");
        assert_eq!(params["f"], "png");
        assert_eq!(params["devicePixelRatio"], "1");

        let config: Value = serde_json::from_str(&params["c"]).unwrap();
        assert_eq!(config["type"], "bar");
        assert_eq!(config["data"]["labels"][1], "Ben");
    }

    #[tokio::test]
    async fn render_rejects_empty_series() {
        let renderer = ChartRenderer::new(RenderSettings::default()).unwrap();
        let err = renderer
            .render(&ChartSeries::default(), "bar")
            .await
            .unwrap_err();
        assert!(matches!(err, ChartSyncError::Render { .. }));
        assert!(err.to_string().contains("empty"));
    }

    #[tokio::test]
    async fn render_rejects_non_finite_values() {
        let renderer = ChartRenderer::new(RenderSettings::default()).unwrap();
        let bad = ChartSeries::new(vec!["x".into()], vec![f64::NAN]).unwrap();
        let err = renderer.render(&bad, "line").await.unwrap_err();
        assert!(err.to_string().contains("'x'"));
    }

    #[tokio::test]
    async fn render_rejects_unknown_type() {
        let renderer = ChartRenderer::new(RenderSettings::default()).unwrap();
        let err = renderer.render(&series(), "sparkline").await.unwrap_err();
        assert!(matches!(err, ChartSyncError::Render { .. }));
    }

    #[tokio::test]
    async fn short_url_mode_posts_config() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chart/create"))
            .and(body_partial_json(json!({
                "width": 800,
                "height": 400,
                "backgroundColor": "transparent",
                "chart": { "type": "doughnut" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "url": "https://quickchart.io/chart/render/zf-abc123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let settings = RenderSettings {
            base_url: server.uri(),
            short_url: true,
            ..RenderSettings::default()
        };
        let renderer = ChartRenderer::new(settings).unwrap();
        let url = renderer.render(&series(), "doughnut").await.unwrap();
        assert_eq!(url.as_str(), "https://quickchart.io/chart/render/zf-abc123");
    }

    #[tokio::test]
    async fn short_url_failure_is_a_render_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chart/create"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": false })))
            .mount(&server)
            .await;

        let settings = RenderSettings {
            base_url: server.uri(),
            short_url: true,
            ..RenderSettings::default()
        };
        let err = ChartRenderer::new(settings)
            .unwrap()
            .render(&series(), "bar")
            .await
            .unwrap_err();
        assert_eq!(err.call(), Some("POST /chart/create"));
    }
}
