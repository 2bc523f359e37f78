#![forbid(unsafe_code)]

//! `nts-radio`: operator tooling for the NTS radio session supervisor.
//!
//! Validates configuration and credentials, prints what the stations are
//! playing, and runs the decoder reaper by hand.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use nts_radio::config::GlobalConfig;
use nts_radio::process::reaper::{validate_pattern, ProcessReaper};
use nts_radio::process::table::Discovery;
use nts_radio::radio::now_playing::{NowPlayingClient, NowPlayingSource};
use nts_radio::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "nts-radio", about = "NTS radio session supervisor tooling", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load and validate configuration, resolve the bot token, print a summary.
    Check,
    /// Print what is live on one station, or on all of them.
    NowPlaying {
        /// Station number; all configured stations when omitted.
        #[arg(long)]
        channel: Option<u8>,
    },
    /// Terminate matching decoder processes once and report the outcome.
    Reap {
        /// Process name glob; defaults to `playback.decoder_pattern`.
        #[arg(long)]
        pattern: Option<String>,
        /// Search every process instead of this process's descendants.
        #[arg(long)]
        system_wide: bool,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    info!("configuration loaded");

    match args.command {
        Command::Check => check(config).await,
        Command::NowPlaying { channel } => now_playing(&config, channel).await,
        Command::Reap {
            pattern,
            system_wide,
        } => reap(&config, pattern, system_wide).await,
    }
}

async fn check(mut config: GlobalConfig) -> Result<()> {
    config.load_credentials().await?;
    let settings = config.supervisor_settings();
    let reap = config.reap_settings();

    println!("configuration OK");
    println!(
        "  supervisor: tick {}s, idle timeout {}s",
        settings.tick_interval.as_secs(),
        settings.idle_timeout.as_secs()
    );
    println!(
        "  reaper: pattern `{}`, {:?}, wait budget {}ms",
        config.playback.decoder_pattern,
        reap.discovery,
        reap.wait_budget().as_millis()
    );
    for station in &config.stations {
        println!(
            "  station {}: {} (volume {})",
            station.number, station.stream_url, station.volume
        );
    }
    println!("  bot token: present");
    Ok(())
}

async fn now_playing(config: &GlobalConfig, channel: Option<u8>) -> Result<()> {
    let client = NowPlayingClient::new(config.nts.api_url.clone(), config.request_timeout())?;

    let numbers: Vec<u8> = match channel {
        Some(n) => {
            if config.station(n).is_none() {
                return Err(AppError::NotFound(format!("station {n}")));
            }
            vec![n]
        }
        None => config.stations.iter().map(|s| s.number).collect(),
    };

    println!("{}", config.nts.header);
    for number in numbers {
        println!("{}", client.describe(number).await);
    }
    Ok(())
}

async fn reap(config: &GlobalConfig, pattern: Option<String>, system_wide: bool) -> Result<()> {
    let mut settings = config.reap_settings();
    if system_wide {
        settings.discovery = Discovery::SystemWide;
    }
    let pattern = pattern.unwrap_or_else(|| config.playback.decoder_pattern.clone());
    validate_pattern(&pattern)?;
    let reaper = ProcessReaper::system(settings);

    let report = tokio::select! {
        report = reaper.reap(&pattern) => report,
        () = shutdown_signal() => {
            warn!("interrupted before reaping finished");
            return Ok(());
        }
    };

    if report.used_fallback {
        println!("enumeration failed; ran kill-by-name fallback for `{pattern}`");
    }
    println!("{} process(es) matched `{pattern}`", report.matched());
    for (entry, outcome) in &report.outcomes {
        println!("  {} {}: {outcome:?}", entry.pid, entry.name);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
