//! Imgur rehosting of rendered charts.
//!
//! Imgur fetches the chart from its source URL and returns a stable link,
//! which is what ends up embedded in the document.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{info, instrument};
use url::Url;

use chartsync_shared::{ChartSyncError, HttpConfig, ImgurConfig, Result};

/// User-Agent string for Imgur requests.
const USER_AGENT: &str = concat!("chartsync/", env!("CARGO_PKG_VERSION"));

/// Upload endpoint path, also used to name the call in errors.
const UPLOAD_PATH: &str = "/3/image";

#[derive(Clone)]
pub struct RehostSettings {
    pub base_url: String,
    pub client_id: String,
    pub timeout_secs: u64,
}

impl RehostSettings {
    pub fn from_config(imgur: &ImgurConfig, http: &HttpConfig, client_id: String) -> Self {
        Self {
            base_url: imgur.base_url.clone(),
            client_id,
            timeout_secs: http.timeout_secs,
        }
    }
}

impl std::fmt::Debug for RehostSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RehostSettings")
            .field("base_url", &self.base_url)
            .field("client_id", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    data: UploadData,
    #[serde(default = "assume_success")]
    success: bool,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    link: Option<String>,
}

fn assume_success() -> bool {
    true
}

/// Uploads an image by URL and returns its public link.
pub struct ImageRehoster {
    client: Client,
    endpoint: String,
    client_id: String,
}

impl ImageRehoster {
    pub fn new(settings: RehostSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ChartSyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}{UPLOAD_PATH}", settings.base_url.trim_end_matches('/')),
            client_id: settings.client_id,
        })
    }

    /// Upload the image behind `source` and return the hosted link.
    ///
    /// Any non-2xx status, `success: false`, or a body without `data.link`
    /// is an error.
    #[instrument(skip_all, fields(source_len = source.as_str().len()))]
    pub async fn rehost(&self, source: &Url) -> Result<Url> {
        let call = format!("POST {UPLOAD_PATH}");

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Client-ID {}", self.client_id),
            )
            .form(&[("image", source.as_str()), ("type", "url")])
            .send()
            .await
            .map_err(|e| ChartSyncError::rehost(&call, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChartSyncError::rehost(
                &call,
                format!("HTTP {status}: {}", truncate(&body, 200)),
            ));
        }

        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| ChartSyncError::rehost(&call, format!("malformed response body: {e}")))?;

        let link = match upload.data.link {
            Some(link) if upload.success => link,
            _ => {
                return Err(ChartSyncError::rehost(
                    &call,
                    "response carried no data.link",
                ));
            }
        };

        let url = Url::parse(&link)
            .map_err(|e| ChartSyncError::rehost(&call, format!("invalid link '{link}': {e}")))?;

        info!(%url, "chart rehosted");
        Ok(url)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
