//! Application configuration for chartsync.
//!
//! User config lives at `~/.chartsync/chartsync.toml`.
//! CLI flags override config file values, which override defaults.
//! Credentials are never stored in the file: it names the env vars that
//! hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ChartSyncError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "chartsync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".chartsync";

// ---------------------------------------------------------------------------
// Config structs (matching chartsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Notion database and page settings.
    #[serde(default)]
    pub notion: NotionConfig,

    /// Imgur settings.
    #[serde(default)]
    pub imgur: ImgurConfig,

    /// Chart appearance and QuickChart endpoint.
    #[serde(default)]
    pub chart: ChartConfig,

    /// Block reconciliation policy.
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// HTTP client settings shared by every component.
    #[serde(default)]
    pub http: HttpConfig,
}

/// `[notion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionConfig {
    /// Name of the env var holding the integration token.
    #[serde(default = "default_notion_key_env")]
    pub api_key_env: String,

    /// API base URL.
    #[serde(default = "default_notion_base_url")]
    pub base_url: String,

    /// Value of the `Notion-Version` header.
    #[serde(default = "default_notion_version")]
    pub version: String,

    /// Database to read records from (id or URL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_id: Option<String>,

    /// Page whose image blocks are replaced (id or URL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,

    /// Database property holding the chart label.
    #[serde(default = "default_label_property")]
    pub label_property: String,

    /// Database property holding the chart value.
    #[serde(default = "default_score_property")]
    pub score_property: String,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_notion_key_env(),
            base_url: default_notion_base_url(),
            version: default_notion_version(),
            database_id: None,
            page_id: None,
            label_property: default_label_property(),
            score_property: default_score_property(),
        }
    }
}

fn default_notion_key_env() -> String {
    "NOTION_API_KEY".into()
}
fn default_notion_base_url() -> String {
    "https://api.notion.com".into()
}
fn default_notion_version() -> String {
    "2022-06-28".into()
}
fn default_label_property() -> String {
    "Name".into()
}
fn default_score_property() -> String {
    "Score".into()
}

/// `[imgur]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImgurConfig {
    /// Name of the env var holding the Imgur client id.
    #[serde(default = "default_imgur_client_id_env")]
    pub client_id_env: String,

    /// API base URL.
    #[serde(default = "default_imgur_base_url")]
    pub base_url: String,
}

impl Default for ImgurConfig {
    fn default() -> Self {
        Self {
            client_id_env: default_imgur_client_id_env(),
            base_url: default_imgur_base_url(),
        }
    }
}

fn default_imgur_client_id_env() -> String {
    "IMGUR_CLIENT_ID".into()
}
fn default_imgur_base_url() -> String {
    "https://api.imgur.com".into()
}

/// `[chart]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    /// Chart.js chart type (`bar`, `pie`, ...).
    #[serde(default = "default_chart_type")]
    pub chart_type: String,

    /// Label of the single dataset.
    #[serde(default = "default_dataset_label")]
    pub dataset_label: String,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// Background color; `transparent` or any CSS color.
    #[serde(default = "default_background")]
    pub background: String,

    #[serde(default = "default_device_pixel_ratio")]
    pub device_pixel_ratio: f32,

    /// QuickChart base URL.
    #[serde(default = "default_quickchart_base_url")]
    pub base_url: String,

    /// Ask QuickChart for a short stored URL instead of encoding the
    /// chart config into the query string.
    #[serde(default)]
    pub short_url: bool,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            chart_type: default_chart_type(),
            dataset_label: default_dataset_label(),
            width: default_width(),
            height: default_height(),
            background: default_background(),
            device_pixel_ratio: default_device_pixel_ratio(),
            base_url: default_quickchart_base_url(),
            short_url: false,
        }
    }
}

fn default_chart_type() -> String {
    "bar".into()
}
fn default_dataset_label() -> String {
    "Scores".into()
}
fn default_width() -> u32 {
    800
}
fn default_height() -> u32 {
    400
}
fn default_background() -> String {
    "transparent".into()
}
fn default_device_pixel_ratio() -> f32 {
    1.0
}
fn default_quickchart_base_url() -> String {
    "https://quickchart.io".into()
}

/// What to do when the number of new images differs from the number of
/// image blocks in the section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MismatchPolicy {
    /// Refuse to touch the section.
    #[default]
    Strict,
    /// Drop unfilled image slots and append surplus images at the end.
    Lenient,
}

impl std::str::FromStr for MismatchPolicy {
    type Err = ChartSyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            other => Err(ChartSyncError::config(format!(
                "unknown mismatch policy '{other}': expected 'strict' or 'lenient'"
            ))),
        }
    }
}

/// `[reconcile]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default)]
    pub on_mismatch: MismatchPolicy,
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Concurrent property lookups while fetching records (1 = sequential).
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            fetch_concurrency: default_fetch_concurrency(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_fetch_concurrency() -> usize {
    1
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.chartsync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ChartSyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.chartsync/chartsync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ChartSyncError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ChartSyncError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ChartSyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ChartSyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ChartSyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a credential from the env var named in the config.
///
/// Only presence is checked; the value itself is passed through untouched.
pub fn read_secret(var_name: &str, what: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
        _ => Err(ChartSyncError::config(format!(
            "{what} not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("NOTION_API_KEY"));
        assert!(toml_str.contains("IMGUR_CLIENT_ID"));
        assert!(toml_str.contains("on_mismatch = \"strict\""));
    }

    #[test]
    fn defaults_match_dashboard_chart() {
        let config = AppConfig::default();
        assert_eq!(config.chart.width, 800);
        assert_eq!(config.chart.height, 400);
        assert_eq!(config.chart.background, "transparent");
        assert_eq!(config.chart.dataset_label, "Scores");
        assert_eq!(config.notion.label_property, "Name");
        assert_eq!(config.notion.score_property, "Score");
        assert_eq!(config.http.fetch_concurrency, 1);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let toml_str = r#"
[notion]
database_id = "0123abcd456789abcdef0123456789ab"
score_property = "Points"

[chart]
chart_type = "pie"

[reconcile]
on_mismatch = "lenient"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(
            config.notion.database_id.as_deref(),
            Some("0123abcd456789abcdef0123456789ab")
        );
        assert_eq!(config.notion.score_property, "Points");
        assert_eq!(config.notion.label_property, "Name");
        assert_eq!(config.chart.chart_type, "pie");
        assert_eq!(config.chart.width, 800);
        assert_eq!(config.reconcile.on_mismatch, MismatchPolicy::Lenient);
    }

    #[test]
    fn load_config_from_file() {
        let dir = std::env::temp_dir().join(format!("chartsync-config-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[http]\ntimeout_secs = 5\n").unwrap();

        let config = load_config_from(&path).expect("load");
        assert_eq!(config.http.timeout_secs, 5);

        std::fs::write(&path, "[http\n").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn mismatch_policy_parses() {
        assert_eq!("Strict".parse::<MismatchPolicy>().unwrap(), MismatchPolicy::Strict);
        assert_eq!("lenient".parse::<MismatchPolicy>().unwrap(), MismatchPolicy::Lenient);
        assert!("pad".parse::<MismatchPolicy>().is_err());
    }

    #[test]
    fn missing_secret_is_reported() {
        // Use a unique env var name to avoid interfering with other tests
        let result = read_secret("CHARTSYNC_TEST_NONEXISTENT_KEY_12345", "Notion API key");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Notion API key not found"));
        assert!(err.to_string().contains("CHARTSYNC_TEST_NONEXISTENT_KEY_12345"));
    }
}
