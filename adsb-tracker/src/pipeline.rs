//! Multi-feed ingest pipeline.
//!
//! One task per feed source reads lines, stamps them, and hands each frame
//! straight to the shared `Aggregator`; a separate task sweeps expired
//! tracks on a fixed interval. Shutdown: stop intake, let the source tasks
//! finish the frame in hand, then stop the sweep.

use std::sync::Arc;
use std::time::Duration;

use adsb_engine::{Aggregator, RawFrame, SourceId};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::feed::{now_secs, parse_line, FeedLine, MlatClock};

/// What one source task did before it ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub source: u32,
    pub name: String,
    pub lines: u64,
    pub frames: u64,
    pub skipped: u64,
    pub error: Option<String>,
}

pub struct Pipeline {
    aggregator: Arc<Aggregator>,
    intake: CancellationToken,
    sweep_stop: CancellationToken,
    sources: JoinSet<SourceReport>,
    sweep: Option<JoinHandle<()>>,
    next_source: u32,
}

impl Pipeline {
    /// Start the sweep task. Must be called inside a tokio runtime.
    pub fn start(aggregator: Arc<Aggregator>, sweep_interval: Duration) -> Self {
        let sweep_stop = CancellationToken::new();
        let sweep = tokio::spawn(run_sweep(
            aggregator.clone(),
            sweep_interval,
            sweep_stop.clone(),
        ));

        Pipeline {
            aggregator,
            intake: CancellationToken::new(),
            sweep_stop,
            sources: JoinSet::new(),
            sweep: Some(sweep),
            next_source: 0,
        }
    }

    /// Spawn a task reading `reader` until EOF or shutdown.
    pub fn add_source<R>(&mut self, name: impl Into<String>, reader: R) -> SourceId
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let source = SourceId(self.next_source);
        self.next_source += 1;

        let name = name.into();
        info!(%source, name = %name, "feed source started");
        self.sources.spawn(run_source(
            self.aggregator.clone(),
            source,
            name,
            reader,
            self.intake.clone(),
        ));
        source
    }

    /// Wait until every source has ended on its own (EOF or error).
    pub async fn wait_sources(&mut self) -> Vec<SourceReport> {
        let mut reports = Vec::new();
        while let Some(joined) = self.sources.join_next().await {
            match joined {
                Ok(report) => {
                    debug!(source = report.source, lines = report.lines, "feed source ended");
                    reports.push(report);
                }
                Err(e) => warn!("feed source task failed: {e}"),
            }
        }
        reports.sort_by_key(|r| r.source);
        reports
    }

    /// Cooperative shutdown. Returns the reports of sources still running.
    pub async fn shutdown(mut self) -> Vec<SourceReport> {
        self.intake.cancel();
        let reports = self.wait_sources().await;

        self.sweep_stop.cancel();
        if let Some(sweep) = self.sweep.take() {
            if let Err(e) = sweep.await {
                warn!("sweep task failed: {e}");
            }
        }
        info!("pipeline stopped");
        reports
    }
}

async fn run_source<R>(
    aggregator: Arc<Aggregator>,
    source: SourceId,
    name: String,
    reader: R,
    intake: CancellationToken,
) -> SourceReport
where
    R: AsyncBufRead + Unpin,
{
    let mut report = SourceReport {
        source: source.0,
        name,
        ..Default::default()
    };
    let mut clock = MlatClock::new();
    let mut lines = reader.lines();

    loop {
        let line = tokio::select! {
            biased;
            _ = intake.cancelled() => break,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(%source, "read failed: {e}");
                report.error = Some(e.to_string());
                break;
            }
        };
        report.lines += 1;

        let wall = now_secs();
        match parse_line(&line) {
            FeedLine::Frame { bytes, mlat_ticks } => {
                let timestamp = match mlat_ticks {
                    Some(ticks) => clock.timestamp(ticks, wall),
                    None => wall,
                };
                report.frames += 1;
                aggregator.process(RawFrame::new(bytes, timestamp, source));
            }
            FeedLine::Empty => {}
            FeedLine::Garbage => report.skipped += 1,
        }
    }
    report
}

async fn run_sweep(aggregator: Arc<Aggregator>, period: Duration, stop: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                let evicted = aggregator.sweep(now_secs());
                if !evicted.is_empty() {
                    debug!(count = evicted.len(), "sweep evicted tracks");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
