//! sdsync - incremental Schedules Direct guide sync.

/// Application configuration (TOML).
mod config;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use sdsync_api::{LocalSdApi, SdClient};
use sdsync_db::SqliteStore;
use sdsync_sync::{ChannelFilter, SyncPipeline, XmltvOptions, write_xmltv};
use serde::Serialize;
use tracing::instrument;
use tracing_subscriber::filter::EnvFilter;
#[cfg(not(feature = "otel"))]
use tracing_subscriber::fmt;
#[cfg(feature = "otel")]
use tracing_subscriber::layer::SubscriberExt;
#[cfg(feature = "otel")]
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{AppConfig, resolve_config_path, resolve_output_path};

/// User-Agent sent to Schedules Direct.
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Version string shown by `--version`.
const APP_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (rev:", env!("GIT_HASH"), ")");

/// CLI argument parser.
#[derive(Parser)]
#[command(name = "sdsync", about, version = APP_VERSION)]
struct Cli {
    /// Override config/data directory.
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Schedules Direct user name.
    #[arg(long, global = true, env = "SD_USERNAME")]
    username: Option<String>,

    /// Schedules Direct password.
    #[arg(long, global = true, env = "SD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Fetch changed guide data and write XMLTV.
    Sync(SyncArgs),
    /// Show account, system and lineup status.
    Status,
    /// Fetch everything and dump merged records as JSON.
    Dump(DumpArgs),
    /// Forget stored change state so the next sync fetches everything.
    Reset,
}

/// Arguments for the `sync` subcommand.
#[derive(clap::Args)]
struct SyncArgs {
    /// XMLTV destination. Falls back to the config output path, then `{dir}/xmltv.xml`.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Comma-separated channel numbers or call signs. Falls back to config channels if omitted.
    #[arg(long, value_delimiter = ',')]
    channels: Option<Vec<String>>,

    /// Clear stored change state before syncing.
    #[arg(long)]
    full: bool,
}

/// Arguments for the `dump` subcommand.
#[derive(clap::Args)]
struct DumpArgs {
    /// Directory for the JSON files (default: current directory).
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Comma-separated channel numbers or call signs. Falls back to config channels if omitted.
    #[arg(long, value_delimiter = ',')]
    channels: Option<Vec<String>>,
}

/// Schedules Direct login.
struct Credentials {
    username: String,
    password: String,
}

/// Picks credentials from flags or the `SD_USERNAME` / `SD_PASSWORD`
/// environment (clap merges both into the same fields).
///
/// # Errors
///
/// Returns an error if either value is missing or empty.
fn resolve_credentials(username: Option<&str>, password: Option<&str>) -> Result<Credentials> {
    match (
        username.filter(|u| !u.is_empty()),
        password.filter(|p| !p.is_empty()),
    ) {
        (Some(username), Some(password)) => Ok(Credentials {
            username: String::from(username),
            password: String::from(password),
        }),
        _ => bail!("No credentials. Set SD_USERNAME and SD_PASSWORD."),
    }
}

/// Loads `config.toml` from `--dir` or the default location.
///
/// # Errors
///
/// Returns an error if the config path cannot be resolved or the file is invalid.
fn load_config(dir: Option<&PathBuf>) -> Result<AppConfig> {
    let path = resolve_config_path(dir)?;
    tracing::debug!(path = %path.display(), "loading config");
    AppConfig::load(&path)
}

/// Builds an `SdClient` and logs in.
///
/// # Errors
///
/// Returns an error if the base URL is invalid, the client fails to build,
/// or login fails.
#[instrument(skip_all)]
async fn build_client(config: &AppConfig, credentials: &Credentials) -> Result<SdClient> {
    let mut builder = SdClient::builder().user_agent(USER_AGENT);
    if let Some(ref raw) = config.api.base_url {
        let url = url::Url::parse(raw).with_context(|| format!("invalid api.base_url {raw}"))?;
        builder = builder.base_url(url);
    }
    let client = builder.build().context("failed to build API client")?;
    client
        .login(&credentials.username, &credentials.password)
        .await
        .context("login failed")?;
    Ok(client)
}

/// Runs the `sync` subcommand.
///
/// # Errors
///
/// Returns an error if login, the sync, or writing XMLTV fails.
#[instrument(skip_all)]
async fn run_sync(args: &SyncArgs, cli: &Cli) -> Result<()> {
    let dir = cli.dir.as_ref();
    let config = load_config(dir)?;
    let credentials = resolve_credentials(cli.username.as_deref(), cli.password.as_deref())?;
    let client = build_client(&config, &credentials).await?;

    let store = SqliteStore::open(dir).context("failed to open change database")?;
    if args.full {
        store.clear().context("failed to clear change state")?;
        tracing::info!("Change state cleared, fetching everything");
    }

    let channels = args
        .channels
        .clone()
        .unwrap_or_else(|| config.sync.channels.clone());
    let output = SyncPipeline::new(client, store)
        .with_channel_filter(ChannelFilter::new(&channels))
        .sync()
        .await
        .context("sync failed")?;

    if output.lineups.is_empty() && output.programs.is_empty() {
        tracing::info!("No changes since last sync, XMLTV not written");
        return Ok(());
    }

    let path = resolve_output_path(args.output.clone(), config.output.path.as_ref(), dir);
    let options = XmltvOptions {
        languages: config.sync.languages_or_default(),
        ..XmltvOptions::default()
    };
    let file =
        File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
    let summary = write_xmltv(
        BufWriter::new(file),
        &output.lineups,
        &output.programs,
        &options,
    )
    .with_context(|| format!("failed to write {}", path.display()))?;

    tracing::info!(
        path = %path.display(),
        lineups = output.lineups.len(),
        schedules = output.schedules.len(),
        programs = output.programs.len(),
        programmes = summary.programmes,
        "Sync complete"
    );
    Ok(())
}

/// Runs the `status` subcommand.
///
/// # Errors
///
/// Returns an error if login or the status request fails.
#[instrument(skip_all)]
async fn run_status(cli: &Cli) -> Result<()> {
    let config = load_config(cli.dir.as_ref())?;
    let credentials = resolve_credentials(cli.username.as_deref(), cli.password.as_deref())?;
    let client = build_client(&config, &credentials).await?;

    let status = client.status().await.context("failed to fetch status")?;

    if let Some(ref account) = status.account {
        tracing::info!(
            expires = account.expires.as_deref().unwrap_or("-"),
            max_lineups = account.max_lineups.unwrap_or_default(),
            "Account"
        );
    }
    for system in &status.system_status {
        tracing::info!(
            status = %system.status,
            message = system.message.as_deref().unwrap_or("-"),
            "System"
        );
    }
    tracing::info!("Lineup\t\t\tModified\t\tDeleted");
    for lineup in &status.lineups {
        tracing::info!(
            "{}\t\t{}\t{}",
            lineup.lineup,
            lineup.modified,
            lineup.is_deleted
        );
    }
    tracing::info!(
        last_update = status.last_data_update.as_deref().unwrap_or("-"),
        "Total: {} lineups",
        status.lineups.len()
    );
    Ok(())
}

/// Runs the `dump` subcommand.
///
/// # Errors
///
/// Returns an error if login, the sync, or writing JSON fails.
#[instrument(skip_all)]
async fn run_dump(args: &DumpArgs, cli: &Cli) -> Result<()> {
    let config = load_config(cli.dir.as_ref())?;
    let credentials = resolve_credentials(cli.username.as_deref(), cli.password.as_deref())?;
    let client = build_client(&config, &credentials).await?;

    let channels = args
        .channels
        .clone()
        .unwrap_or_else(|| config.sync.channels.clone());
    let output = SyncPipeline::new(client, sdsync_db::NullStore)
        .with_channel_filter(ChannelFilter::new(&channels))
        .sync()
        .await
        .context("sync failed")?;

    let out_dir = args.out_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("failed to create directory {}", out_dir.display()))?;
    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");

    let lineups_path = out_dir.join(format!("lineups-{stamp}.json"));
    write_json(&lineups_path, &output.lineups)?;
    let programs_path = out_dir.join(format!("programs-{stamp}.json"));
    write_json(&programs_path, &output.programs)?;

    tracing::info!(
        lineups = output.lineups.len(),
        programs = output.programs.len(),
        dir = %out_dir.display(),
        "Dump complete"
    );
    Ok(())
}

/// Writes `value` as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the file cannot be created or serialization fails.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Runs the `reset` subcommand.
///
/// # Errors
///
/// Returns an error if the change database cannot be opened or cleared.
fn run_reset(dir: Option<&PathBuf>) -> Result<()> {
    let store = SqliteStore::open(dir).context("failed to open change database")?;
    store.clear().context("failed to clear change state")?;
    tracing::info!("Change state cleared");
    Ok(())
}

/// Entry point.
///
/// # Errors
///
/// Returns an error if subcommand execution fails.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    #[cfg(not(feature = "otel"))]
    {
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_target(false)
            .init();
    }

    #[cfg(feature = "otel")]
    {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);

        let otel_layer = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .ok()
            .and_then(|_| {
                let exporter = opentelemetry_otlp::SpanExporter::builder()
                    .with_http()
                    .build()
                    .ok()?;

                let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
                    .with_simple_exporter(exporter)
                    .build();

                let tracer = opentelemetry::trace::TracerProvider::tracer(
                    &tracer_provider,
                    env!("CARGO_PKG_NAME"),
                );
                opentelemetry::global::set_tracer_provider(tracer_provider);

                Some(tracing_opentelemetry::layer().with_tracer(tracer))
            });

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .init();
    }

    let cli = Cli::parse();
    match cli.command {
        Commands::Sync(ref args) => run_sync(args, &cli).await,
        Commands::Status => run_status(&cli).await,
        Commands::Dump(ref args) => run_dump(args, &cli).await,
        Commands::Reset => run_reset(cli.dir.as_ref()),
    }
}
