//! adsb-track: multi-feed ADS-B tracker.
//!
//! Reads Mode S frames (hex, AVR, AVR+MLAT) from files or stdin, runs them
//! through the engine, and prints decoded messages, a track table, or a
//! live JSON change feed.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use adsb_engine::config::{self, EngineConfig};
use adsb_engine::{decode, Aggregator, Coordinates, FrameValidator, RawFrame, SourceId};

mod feed;
mod logging;
mod output;
mod pipeline;

use feed::{now_secs, parse_line, FeedLine, MlatClock};
use pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "adsb-track", version, about = "Multi-feed ADS-B decoder and tracker")]
struct Cli {
    /// Config file (RON); defaults to ~/.adsb-track/config.ron
    #[arg(long, global = true, env = "ADSB_TRACK_CONFIG")]
    config: Option<PathBuf>,

    /// Evict aircraft not heard from for this many seconds
    #[arg(long, global = true, env = "ADSB_TRACK_EXPIRY")]
    expiry: Option<f64>,

    /// Seconds between expiry sweeps
    #[arg(long, global = true, env = "ADSB_TRACK_SWEEP_INTERVAL")]
    sweep_interval: Option<f64>,

    /// Receiver location as LAT,LON (reference for surface positions)
    #[arg(long, global = true, value_parser = parse_receiver, allow_hyphen_values = true)]
    receiver: Option<Coordinates>,

    /// More log output (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode frames from a file and print each message (no tracking)
    Decode {
        /// Frame file, one frame per line ("-" for stdin)
        file: PathBuf,

        /// Print messages as JSON lines instead of debug output
        #[arg(short, long)]
        json: bool,
    },

    /// Track aircraft from one or more capture files, one feed per file
    Track {
        /// Frame files; each one is read concurrently as its own source
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Track frames from stdin and print change events as JSON lines
    Live,

    /// Write the effective configuration as RON
    InitConfig {
        /// Destination; defaults to ~/.adsb-track/config.ron
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn parse_receiver(s: &str) -> std::result::Result<Coordinates, String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON, got {s:?}"))?;
    let lat: f64 = lat.trim().parse().map_err(|e| format!("latitude: {e}"))?;
    let lon: f64 = lon.trim().parse().map_err(|e| format!("longitude: {e}"))?;
    Ok(Coordinates::new(lat, lon))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = effective_config(&cli)?;

    match cli.command {
        Commands::Decode { file, json } => cmd_decode(&file, json, &config),
        Commands::Track { files } => run_async(cmd_track(files, config)),
        Commands::Live => run_async(cmd_live(config)),
        Commands::InitConfig { path, force } => cmd_init_config(path, force, &config),
    }
}

/// Drive `task` to completion on a fresh runtime. The runtime is torn down
/// without waiting on blocking reads still parked on stdin.
fn run_async(task: impl std::future::Future<Output = Result<()>>) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    let result = rt.block_on(task);
    rt.shutdown_background();
    result
}

/// Config file plus command-line overrides, validated.
fn effective_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = config::load_config(cli.config.as_deref()).context("failed to load config")?;
    if let Some(expiry) = cli.expiry {
        config.expiry_secs = expiry;
    }
    if let Some(interval) = cli.sweep_interval {
        config.sweep_interval_secs = interval;
    }
    if let Some(receiver) = cli.receiver {
        config.cpr.receiver = Some(receiver);
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn open_lines(file: &Path) -> Result<Box<dyn BufRead>> {
    if file.to_str() == Some("-") {
        return Ok(Box::new(io::stdin().lock()));
    }
    let f = File::open(file).with_context(|| format!("cannot open {}", file.display()))?;
    Ok(Box::new(BufReader::new(f)))
}

fn cmd_decode(file: &Path, json: bool, config: &EngineConfig) -> Result<()> {
    let validator = FrameValidator::new(config.validator.correct_errors);
    let mut clock = MlatClock::new();
    let (mut frames, mut decoded, mut skipped) = (0u64, 0u64, 0u64);

    for line in open_lines(file)?.lines() {
        let line = line.context("read failed")?;
        let (bytes, mlat_ticks) = match parse_line(&line) {
            FeedLine::Frame { bytes, mlat_ticks } => (bytes, mlat_ticks),
            FeedLine::Empty => continue,
            FeedLine::Garbage => {
                skipped += 1;
                continue;
            }
        };
        frames += 1;

        let wall = now_secs();
        let timestamp = mlat_ticks.map_or(wall, |t| clock.timestamp(t, wall));
        let validated = match validator.validate(RawFrame::new(bytes, timestamp, SourceId(0))) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("{}: {e}", line.trim());
                continue;
            }
        };

        match decode(&validated) {
            Ok(msg) => {
                decoded += 1;
                if json {
                    println!("{}", serde_json::to_string(&msg)?);
                } else {
                    println!("{msg:?}");
                }
            }
            Err(e) => tracing::debug!("{}: {e}", line.trim()),
        }
    }

    eprintln!("Frames: {frames} parsed, {decoded} decoded, {skipped} lines skipped");
    Ok(())
}

async fn cmd_track(files: Vec<PathBuf>, config: EngineConfig) -> Result<()> {
    let aggregator = Arc::new(Aggregator::new(&config));
    let mut pipeline = Pipeline::start(
        aggregator.clone(),
        Duration::from_secs_f64(config.sweep_interval_secs),
    );

    for path in &files {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("cannot open {}", path.display()))?;
        pipeline.add_source(path.display().to_string(), tokio::io::BufReader::new(file));
    }

    let reports = pipeline.wait_sources().await;
    pipeline.shutdown().await;

    let snapshot = aggregator.repository().snapshot();
    output::print_snapshot(&snapshot, now_secs(), &config.staleness);
    output::print_stats(&aggregator.stats().snapshot(), &reports);

    if reports.iter().all(|r| r.error.is_some()) {
        bail!("every feed source failed");
    }
    Ok(())
}

async fn cmd_live(config: EngineConfig) -> Result<()> {
    let aggregator = Arc::new(Aggregator::new(&config));
    let mut events = aggregator.subscribe();

    let printer_stop = CancellationToken::new();
    let printer = {
        let stop = printer_stop.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    Some(event) = events.recv() => print_event(&event),
                    _ = stop.cancelled() => break,
                }
            }
            // Whatever was emitted before shutdown completed
            while let Ok(event) = events.try_recv() {
                print_event(&event);
            }
        })
    };

    let mut pipeline = Pipeline::start(
        aggregator.clone(),
        Duration::from_secs_f64(config.sweep_interval_secs),
    );
    pipeline.add_source("stdin", tokio::io::BufReader::new(tokio::io::stdin()));
    info!("reading frames from stdin, Ctrl-C to stop");

    let mut reports = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            Vec::new()
        }
        reports = pipeline.wait_sources() => reports,
    };
    reports.extend(pipeline.shutdown().await);

    printer_stop.cancel();
    if let Err(e) = printer.await {
        warn!("event printer failed: {e}");
    }

    output::print_snapshot(
        &aggregator.repository().snapshot(),
        now_secs(),
        &config.staleness,
    );
    output::print_stats(&aggregator.stats().snapshot(), &reports);
    Ok(())
}

fn print_event(event: &adsb_engine::TrackEvent) {
    match output::event_line(event) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(seq = event.seq, "cannot serialize event: {e}"),
    }
}

fn cmd_init_config(path: Option<PathBuf>, force: bool, config: &EngineConfig) -> Result<()> {
    let path = path.unwrap_or_else(config::config_file);
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    config::save_config(config, &path)
        .with_context(|| format!("cannot write {}", path.display()))?;
    eprintln!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_receiver() {
        let c = parse_receiver("51.99, 4.375").unwrap();
        assert_eq!(c, Coordinates::new(51.99, 4.375));
        assert_eq!(parse_receiver("-33.9,151.2").unwrap().lat, -33.9);
        assert!(parse_receiver("51.99").is_err());
        assert!(parse_receiver("north,4").is_err());
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::try_parse_from([
            "adsb-track",
            "--config",
            "/nonexistent/adsb-track.ron",
            "--expiry",
            "120",
            "--receiver",
            "52.3,4.76",
            "live",
        ])
        .unwrap();
        let config = effective_config(&cli).unwrap();
        assert_eq!(config.expiry_secs, 120.0);
        assert_eq!(config.cpr.receiver, Some(Coordinates::new(52.3, 4.76)));
        assert_eq!(config.sweep_interval_secs, 1.0);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let cli = Cli::try_parse_from([
            "adsb-track",
            "--config",
            "/nonexistent/adsb-track.ron",
            "--expiry",
            "0.5",
            "--sweep-interval",
            "2",
            "live",
        ])
        .unwrap();
        assert!(effective_config(&cli).is_err());
    }
}
