//! Terminal output: snapshot table, statistics summary, event lines.

use adsb_engine::config::StalenessWindows;
use adsb_engine::track::FieldState;
use adsb_engine::{Resolution, StatsSnapshot, TrackEvent, TrackSnapshot};
use comfy_table::{Cell, Table};

use crate::pipeline::SourceReport;

fn or_dash<T>(value: Option<T>, fmt: impl Fn(T) -> String) -> String {
    value.map(fmt).unwrap_or("-".into())
}

/// Build the aircraft table for a snapshot as of `now`.
pub fn snapshot_table(snapshot: &TrackSnapshot, now: f64, windows: &StalenessWindows) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "ICAO", "Callsign", "Squawk", "Alt (ft)", "Speed (kts)", "Hdg", "VRate", "Lat", "Lon",
        "Pos", "Gnd", "Seen (s)",
    ]);

    for track in &snapshot.tracks {
        let freshness = track.freshness(now, windows);
        let position = track.position.as_ref().map(|p| p.value);
        let velocity = track.velocity.as_ref().map(|v| v.value);

        let pos_state = match (freshness.position, position.map(|p| p.resolution)) {
            (FieldState::Absent, _) | (_, None) => "-".to_string(),
            (FieldState::Stale, _) => "stale".to_string(),
            (FieldState::Current, Some(Resolution::Global)) => "global".to_string(),
            (FieldState::Current, Some(Resolution::Local)) => "local".to_string(),
        };

        table.add_row(vec![
            Cell::new(track.icao_hex()),
            Cell::new(or_dash(track.callsign.as_ref(), |c| c.value.clone())),
            Cell::new(or_dash(track.squawk.as_ref(), |s| s.value.clone())),
            Cell::new(or_dash(track.altitude.as_ref(), |a| a.value.feet.to_string())),
            Cell::new(or_dash(velocity.and_then(|v| v.speed_kts), |s| format!("{s:.0}"))),
            Cell::new(or_dash(velocity.and_then(|v| v.heading_deg), |h| format!("{h:.1}"))),
            Cell::new(or_dash(velocity.and_then(|v| v.vertical_rate_fpm), |v| format!("{v:+}"))),
            Cell::new(or_dash(position, |p| format!("{:.4}", p.lat))),
            Cell::new(or_dash(position, |p| format!("{:.4}", p.lon))),
            Cell::new(pos_state),
            Cell::new(or_dash(track.on_ground.as_ref(), |g| {
                let label = if g.value { "yes" } else { "no" };
                label.to_string()
            })),
            Cell::new(format!("{:.0}", track.age(now).max(0.0))),
        ]);
    }
    table
}

pub fn print_snapshot(snapshot: &TrackSnapshot, now: f64, windows: &StalenessWindows) {
    println!();
    println!("{} aircraft (as of event #{})", snapshot.len(), snapshot.last_seq);
    println!();
    if snapshot.is_empty() {
        return;
    }
    println!("{}", snapshot_table(snapshot, now, windows));
}

pub fn print_stats(stats: &StatsSnapshot, sources: &[SourceReport]) {
    println!();
    if !sources.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Source", "Name", "Lines", "Frames", "Skipped", "Error"]);
        for s in sources {
            table.add_row(vec![
                Cell::new(s.source),
                Cell::new(&s.name),
                Cell::new(s.lines),
                Cell::new(s.frames),
                Cell::new(s.skipped),
                Cell::new(s.error.as_deref().unwrap_or("-")),
            ]);
        }
        println!("{table}");
        println!();
    }

    println!("Statistics:");
    println!(
        "  Frames:     {} received, {} accepted ({} corrected), {} dropped",
        stats.frames_received,
        stats.frames_accepted,
        stats.frames_corrected,
        stats.frames_dropped()
    );
    println!(
        "  Dropped:    {} unknown DF, {} bad length, {} CRC, {} unsupported, {} malformed",
        stats.dropped_unknown_format,
        stats.dropped_invalid_length,
        stats.dropped_integrity,
        stats.dropped_unsupported,
        stats.dropped_malformed
    );
    println!(
        "  Tracks:     {} created, {} updates, {} evicted",
        stats.tracks_created, stats.tracks_updated, stats.tracks_evicted
    );
    println!(
        "  Ignored:    {} stale, {} pending position, {} duplicate, {} unknown aircraft",
        stats.ignored_stale,
        stats.ignored_pending,
        stats.ignored_duplicate,
        stats.ignored_unknown_aircraft
    );
    println!(
        "  CPR:        {} global, {} local, {} failed",
        stats.cpr_global,
        stats.cpr_local,
        stats.cpr_failures()
    );
    println!();
}

/// One change event as a single JSON line.
pub fn event_line(event: &TrackEvent) -> serde_json::Result<String> {
    serde_json::to_string(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use adsb_engine::{Aggregator, EngineConfig, RawFrame, SourceId};

    fn feed(agg: &Aggregator, hex: &str, ts: f64) {
        agg.process(RawFrame::from_hex(hex, ts, SourceId(0)).unwrap());
    }

    #[test]
    fn test_snapshot_table_rows() {
        let config = EngineConfig::default();
        let agg = Aggregator::new(&config);
        feed(&agg, "8D4840D6202CC371C32CE0576098", 100.0);
        feed(&agg, "8D40621D58C382D690C8AC2863A7", 100.0);
        feed(&agg, "8D40621D58C386435CC412692AD6", 102.0);

        let snap = agg.repository().snapshot();
        let rendered = snapshot_table(&snap, 110.0, &config.staleness).to_string();
        assert!(rendered.contains("4840D6"), "{rendered}");
        assert!(rendered.contains("KLM1023"), "{rendered}");
        assert!(rendered.contains("52.2658"), "{rendered}");
        assert!(rendered.contains("global"), "{rendered}");

        // Position older than its window shows as stale
        let rendered = snapshot_table(&snap, 500.0, &config.staleness).to_string();
        assert!(rendered.contains("stale"), "{rendered}");
    }

    #[test]
    fn test_event_line_is_single_json_object() {
        let agg = Aggregator::new(&EngineConfig::default());
        let mut rx = agg.subscribe();
        feed(&agg, "8D4840D6202CC371C32CE0576098", 1.0);

        let line = event_line(&rx.try_recv().unwrap()).unwrap();
        assert!(!line.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["seq"], 1);
        assert_eq!(value["icao"], "4840D6");
        assert_eq!(value["change"]["kind"], "Created");
    }
}
