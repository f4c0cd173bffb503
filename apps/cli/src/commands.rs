//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use chartsync_core::{
    ProgressReporter, RefreshConfig, RefreshReport, may_have_mutated, refresh,
};
use chartsync_imghost::RehostSettings;
use chartsync_notion::NotionSettings;
use chartsync_render::RenderSettings;
use chartsync_shared::{
    AppConfig, BlockSpec, MismatchPolicy, init_config, load_config, load_config_from,
    normalize_id, read_secret,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// chartsync: keep a Notion page's chart in step with a Notion database.
#[derive(Parser)]
#[command(
    name = "chartsync",
    version,
    about = "Render a Notion database as a chart and replace the images on a Notion page with it.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.chartsync/chartsync.toml.
    #[arg(long, global = true, env = "CHARTSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Chart the database and replace the page's image blocks with it.
    Refresh {
        /// Database id or URL (defaults to notion.database_id).
        #[arg(long, env = "NOTION_DATABASE_ID")]
        database_id: Option<String>,

        /// Page or block id/URL whose images are replaced (defaults to notion.page_id).
        #[arg(long, env = "NOTION_PAGE_ID")]
        page_id: Option<String>,

        /// Chart.js chart type: bar, line, pie, doughnut, ... (defaults to chart.chart_type).
        #[arg(short = 't', long)]
        chart_type: Option<String>,

        /// strict or lenient handling of image count mismatches.
        #[arg(long)]
        on_mismatch: Option<MismatchPolicy>,

        /// Fetch, render and plan only; nothing is uploaded or changed.
        #[arg(long)]
        dry_run: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "chartsync=info",
        1 => "chartsync=debug",
        _ => "chartsync=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Refresh {
            database_id,
            page_id,
            chart_type,
            on_mismatch,
            dry_run,
        } => {
            let args = RefreshArgs {
                database_id,
                page_id,
                chart_type,
                on_mismatch,
                dry_run,
            };
            let config = resolve_config(cli.config.as_ref())?;
            cmd_refresh(&config, args).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => {
                let config = resolve_config(cli.config.as_ref())?;
                cmd_config_show(&config).await
            }
        },
    }
}

fn resolve_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// refresh
// ---------------------------------------------------------------------------

/// Flag values for `refresh`; `None` falls back to the config file.
struct RefreshArgs {
    database_id: Option<String>,
    page_id: Option<String>,
    chart_type: Option<String>,
    on_mismatch: Option<MismatchPolicy>,
    dry_run: bool,
}

/// Credentials read from the environment.
struct Secrets {
    notion_api_key: String,
    /// Only read for a real run.
    imgur_client_id: Option<String>,
}

/// Read the env vars the config names. The image host is only contacted on a real run.
fn read_secrets(config: &AppConfig, dry_run: bool) -> Result<Secrets> {
    let notion_api_key = read_secret(&config.notion.api_key_env, "Notion API key")?;
    let imgur_client_id = if dry_run {
        None
    } else {
        Some(read_secret(&config.imgur.client_id_env, "Imgur client id")?)
    };
    Ok(Secrets {
        notion_api_key,
        imgur_client_id,
    })
}

/// Merge flags over the config file.
fn build_refresh_config(
    config: &AppConfig,
    args: RefreshArgs,
    secrets: Secrets,
) -> Result<RefreshConfig> {
    let database_id = args
        .database_id
        .or_else(|| config.notion.database_id.clone())
        .ok_or_else(|| eyre!("no database id: pass --database-id or set notion.database_id"))?;
    let page_id = args
        .page_id
        .or_else(|| config.notion.page_id.clone())
        .ok_or_else(|| eyre!("no page id: pass --page-id or set notion.page_id"))?;

    let rehost = match (args.dry_run, secrets.imgur_client_id) {
        (true, _) => None,
        (false, Some(client_id)) => Some(RehostSettings::from_config(
            &config.imgur,
            &config.http,
            client_id,
        )),
        (false, None) => return Err(eyre!("a real run needs an Imgur client id")),
    };
    let api_key = secrets.notion_api_key;

    Ok(RefreshConfig {
        database_id: normalize_id(&database_id)?,
        page_id: normalize_id(&page_id)?,
        chart_type: args
            .chart_type
            .unwrap_or_else(|| config.chart.chart_type.clone()),
        dry_run: args.dry_run,
        notion: NotionSettings::from_config(&config.notion, &config.http, api_key),
        render: RenderSettings::from_config(&config.chart, &config.http),
        rehost,
        label_property: config.notion.label_property.clone(),
        score_property: config.notion.score_property.clone(),
        fetch_concurrency: config.http.fetch_concurrency,
        on_mismatch: args.on_mismatch.unwrap_or(config.reconcile.on_mismatch),
    })
}

async fn cmd_refresh(config: &AppConfig, args: RefreshArgs) -> Result<()> {
    let secrets = read_secrets(config, args.dry_run)?;
    let refresh_config = build_refresh_config(config, args, secrets)?;

    info!(
        database_id = %refresh_config.database_id,
        page_id = %refresh_config.page_id,
        chart_type = %refresh_config.chart_type,
        dry_run = refresh_config.dry_run,
        "refreshing chart"
    );

    let reporter = CliProgress::new();

    let report = match refresh(&refresh_config, &reporter).await {
        Ok(report) => report,
        Err(e) => {
            reporter.fail();
            if may_have_mutated(&e) {
                error!("the page may now hold both the new blocks and some originals");
            }
            return Err(e.into());
        }
    };

    print_report(&report);
    Ok(())
}

fn print_report(report: &RefreshReport) {
    let reconcile = &report.reconcile;

    println!();
    if report.dry_run {
        println!("  Dry run: nothing was uploaded or changed.");
    } else if reconcile.applied {
        println!("  Chart refreshed!");
    } else {
        println!("  No image blocks to replace; page left as is.");
    }
    println!("  Run:      {}", report.run_id);
    println!("  Records:  {} charted, {} skipped", report.charted, report.skipped.len());
    for skip in &report.skipped {
        println!("            - {}: {}", skip.record_id, skip.reason);
    }
    println!("  Chart:    {}", report.chart_url);
    if let Some(image_url) = &report.image_url {
        println!("  Image:    {image_url}");
    }
    println!(
        "  Blocks:   {} before, {} after",
        reconcile.blocks_before,
        if reconcile.applied {
            reconcile.blocks.len()
        } else {
            reconcile.plan.children.len()
        }
    );
    println!("  Series:   {}", report.series_fingerprint);
    println!("  Time:     {:.1}s", report.elapsed.as_secs_f64());

    if report.dry_run {
        println!();
        println!("  Planned section:");
        for (index, child) in reconcile.plan.children.iter().enumerate() {
            match child {
                BlockSpec::ExternalImage { url } => println!("    {index:>3}  image  <- {url}"),
                BlockSpec::Preserved { kind, .. } => println!("    {index:>3}  {kind}"),
            }
        }
        if reconcile.plan.slots_dropped > 0 {
            println!("    ({} image block(s) dropped)", reconcile.plan.slots_dropped);
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn fail(&self) {
        self.spinner.abandon_with_message("refresh failed");
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _report: &RefreshReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> RefreshArgs {
        RefreshArgs {
            database_id: None,
            page_id: None,
            chart_type: None,
            on_mismatch: None,
            dry_run: true,
        }
    }

    fn secrets(imgur_client_id: Option<&str>) -> Secrets {
        Secrets {
            notion_api_key: "secret_test".into(),
            imgur_client_id: imgur_client_id.map(String::from),
        }
    }

    #[test]
    fn cli_parses_refresh_flags() {
        let cli = Cli::try_parse_from([
            "chartsync",
            "refresh",
            "--database-id",
            "abc",
            "--chart-type",
            "pie",
            "--on-mismatch",
            "lenient",
            "--dry-run",
        ])
        .unwrap();

        match cli.command {
            Command::Refresh {
                database_id,
                chart_type,
                on_mismatch,
                dry_run,
                ..
            } => {
                assert_eq!(database_id.as_deref(), Some("abc"));
                assert_eq!(chart_type.as_deref(), Some("pie"));
                assert_eq!(on_mismatch, Some(MismatchPolicy::Lenient));
                assert!(dry_run);
            }
            Command::Config { .. } => panic!("expected refresh"),
        }
    }

    #[test]
    fn flags_override_config_values() {
        let mut config = AppConfig::default();
        config.notion.database_id = Some("11111111111111111111111111111111".into());
        config.notion.page_id = Some("22222222222222222222222222222222".into());

        let mut flags = args();
        flags.database_id = Some("https://www.notion.so/ws/Scores-33333333333333333333333333333333?v=1".into());
        flags.chart_type = Some("line".into());

        let refresh = build_refresh_config(&config, flags, secrets(None)).unwrap();
        assert_eq!(refresh.database_id, "33333333-3333-3333-3333-333333333333");
        assert_eq!(refresh.page_id, "22222222-2222-2222-2222-222222222222");
        assert_eq!(refresh.chart_type, "line");
        assert_eq!(refresh.on_mismatch, MismatchPolicy::Strict);
        assert_eq!(refresh.notion.api_key, "secret_test");
        assert!(refresh.rehost.is_none());
    }

    #[test]
    fn missing_page_id_is_reported() {
        let mut config = AppConfig::default();
        config.notion.database_id = Some("11111111111111111111111111111111".into());

        let err = build_refresh_config(&config, args(), secrets(None)).unwrap_err();
        assert!(err.to_string().contains("--page-id"));
    }

    #[test]
    fn real_run_uses_imgur_client_id() {
        let mut config = AppConfig::default();
        config.notion.database_id = Some("11111111111111111111111111111111".into());
        config.notion.page_id = Some("22222222222222222222222222222222".into());

        let mut flags = args();
        flags.dry_run = false;
        let refresh = build_refresh_config(&config, flags, secrets(Some("cid"))).unwrap();
        let rehost = refresh.rehost.unwrap();
        assert_eq!(rehost.client_id, "cid");
        assert_eq!(rehost.base_url, "https://api.imgur.com");

        let mut flags = args();
        flags.dry_run = false;
        let err = build_refresh_config(&config, flags, secrets(None)).unwrap_err();
        assert!(err.to_string().contains("Imgur client id"));
    }

    #[test]
    fn unset_secret_names_its_variable() {
        let mut config = AppConfig::default();
        config.notion.api_key_env = "CHARTSYNC_TEST_UNSET_NOTION_KEY".into();

        let err = read_secrets(&config, true).err().unwrap();
        assert!(err.to_string().contains("CHARTSYNC_TEST_UNSET_NOTION_KEY"));
    }
}
