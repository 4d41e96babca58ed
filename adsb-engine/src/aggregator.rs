//! Merge decoded messages into per-aircraft tracks.
//!
//! Rules applied to every message:
//! - A field is overwritten only by a message at least as recent as the one
//!   that last set it, so arrival order does not matter.
//! - `last_seen` always advances to the newest message time.
//! - Positions come only from a resolved CPR pair (global) or a single
//!   sample near a recent reference (local), never from a lone sample.
//! - Addresses recovered from parity only touch aircraft already tracked.

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::cpr::{Coordinates, CprResolver, CprSample};
use crate::decode::decode;
use crate::frame::{FrameValidator, RawFrame};
use crate::repository::{TrackEvent, TrackRepository};
use crate::stats::Stats;
use crate::track::*;
use crate::types::*;

/// Why a message left the track untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IgnoreReason {
    /// Every field it carries already holds newer data.
    StaleField,
    /// A CPR sample was cached but no position could be resolved yet.
    PositionPending,
    /// Exactly what is already stored.
    Duplicate,
    /// Parity-derived address with no existing track.
    UnknownAircraft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AggregationOutcome {
    Created,
    Updated,
    Ignored(IgnoreReason),
}

/// Accumulated effect of one message on a track.
#[derive(Debug, Default, Clone, Copy)]
struct Effect {
    changed: bool,
    stale: bool,
    pending: bool,
}

impl Effect {
    fn field(&mut self, offer: Offer) {
        match offer {
            Offer::Applied => self.changed = true,
            Offer::Stale => self.stale = true,
            Offer::Unchanged => {}
        }
    }

    fn outcome(self) -> AggregationOutcome {
        if self.changed {
            AggregationOutcome::Updated
        } else if self.pending {
            AggregationOutcome::Ignored(IgnoreReason::PositionPending)
        } else if self.stale {
            AggregationOutcome::Ignored(IgnoreReason::StaleField)
        } else {
            AggregationOutcome::Ignored(IgnoreReason::Duplicate)
        }
    }
}

fn opposite(format: CprFormat) -> CprFormat {
    match format {
        CprFormat::Even => CprFormat::Odd,
        CprFormat::Odd => CprFormat::Even,
    }
}

/// Owns the track repository and applies messages to it. Shared by
/// reference (or `Arc`) across all feed tasks.
#[derive(Debug)]
pub struct Aggregator {
    repository: TrackRepository,
    resolver: CprResolver,
    validator: FrameValidator,
    local_reference_max_age: f64,
    receiver: Option<Coordinates>,
    expiry_secs: f64,
    stats: Stats,
}

impl Aggregator {
    pub fn new(config: &EngineConfig) -> Self {
        Aggregator {
            repository: TrackRepository::new(),
            resolver: CprResolver::new(&config.cpr),
            validator: FrameValidator::new(config.validator.correct_errors),
            local_reference_max_age: config.cpr.local_reference_max_age_secs,
            receiver: config.cpr.receiver,
            expiry_secs: config.expiry_secs,
            stats: Stats::new(),
        }
    }

    pub fn repository(&self) -> &TrackRepository {
        &self.repository
    }

    pub fn subscribe(&self) -> tokio::sync::mpsc::UnboundedReceiver<TrackEvent> {
        self.repository.subscribe()
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Validate, decode and apply one raw frame. Rejected frames are
    /// counted and yield `None`.
    pub fn process(&self, frame: RawFrame) -> Option<AggregationOutcome> {
        self.stats.record_received();
        let source = frame.source;

        let validated = match self.validator.validate(frame) {
            Ok(v) => v,
            Err(err) => {
                self.stats.record_frame_error(&err);
                trace!(%source, reason = err.kind(), "dropped frame: {err}");
                return None;
            }
        };
        self.stats.record_accepted(validated.corrected);

        match decode(&validated) {
            Ok(msg) => Some(self.apply(msg)),
            Err(err) => {
                self.stats.record_decode_error(&err);
                trace!(
                    %source,
                    icao = %icao_to_string(&validated.icao),
                    reason = err.kind(),
                    "dropped message: {err}"
                );
                None
            }
        }
    }

    /// Apply one decoded message.
    pub fn apply(&self, msg: DecodedMsg) -> AggregationOutcome {
        let icao = *msg.icao();
        let create_at = msg.has_verified_address().then(|| msg.timestamp());

        let touched = self.repository.with_track(icao, create_at, |track| {
            let effect = self.merge(track, &msg);
            (effect, effect.changed)
        });

        let outcome = match touched {
            None => AggregationOutcome::Ignored(IgnoreReason::UnknownAircraft),
            Some(t) if t.created => {
                debug!(icao = %icao_to_string(&icao), kind = msg.kind(), "new aircraft");
                AggregationOutcome::Created
            }
            Some(t) => t.result.outcome(),
        };
        self.record_outcome(outcome);
        outcome
    }

    /// Evict tracks not seen within the expiry threshold of `now`.
    pub fn sweep(&self, now: f64) -> Vec<Icao> {
        let evicted = self.repository.evict_expired(now, self.expiry_secs);
        if !evicted.is_empty() {
            self.stats.record_evicted(evicted.len());
            for icao in &evicted {
                debug!(icao = %icao_to_string(icao), "evicted aircraft");
            }
        }
        evicted
    }

    fn record_outcome(&self, outcome: AggregationOutcome) {
        match outcome {
            AggregationOutcome::Created => self.stats.record_created(),
            AggregationOutcome::Updated => self.stats.record_updated(),
            AggregationOutcome::Ignored(IgnoreReason::StaleField) => {
                self.stats.record_ignored_stale()
            }
            AggregationOutcome::Ignored(IgnoreReason::PositionPending) => {
                self.stats.record_ignored_pending()
            }
            AggregationOutcome::Ignored(IgnoreReason::Duplicate) => {
                self.stats.record_ignored_duplicate()
            }
            AggregationOutcome::Ignored(IgnoreReason::UnknownAircraft) => {
                self.stats.record_ignored_unknown()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Field merge
    // -----------------------------------------------------------------------

    fn merge(&self, track: &mut AircraftTrack, msg: &DecodedMsg) -> Effect {
        let ts = msg.timestamp();
        track.observe(ts);
        let mut e = Effect::default();

        match msg {
            DecodedMsg::Identification(m) => {
                let callsign = m.callsign.trim_end().to_string();
                e.field(offer(&mut track.callsign, callsign, ts));
                e.field(offer(&mut track.category, m.category, ts));
            }
            DecodedMsg::AirbornePosition(m) => {
                if let Some(feet) = m.altitude_ft {
                    let altitude = Altitude {
                        feet,
                        source: m.altitude_source,
                    };
                    e.field(offer(&mut track.altitude, altitude, ts));
                }
                e.field(offer(
                    &mut track.surveillance_status,
                    m.surveillance_status,
                    ts,
                ));
                e.field(offer(&mut track.on_ground, false, ts));
                let sample = CprSample {
                    format: m.cpr_format,
                    lat: m.cpr_lat,
                    lon: m.cpr_lon,
                    timestamp: ts,
                    surface: false,
                };
                self.merge_position(track, sample, &mut e);
            }
            DecodedMsg::SurfacePosition(m) => {
                e.field(offer(&mut track.on_ground, true, ts));
                if m.ground_speed_kts.is_some() || m.track_deg.is_some() {
                    let velocity = Velocity {
                        speed_kts: m.ground_speed_kts,
                        heading_deg: m.track_deg,
                        vertical_rate_fpm: None,
                        speed_type: SpeedType::Ground,
                    };
                    e.field(offer(&mut track.velocity, velocity, ts));
                }
                let sample = CprSample {
                    format: m.cpr_format,
                    lat: m.cpr_lat,
                    lon: m.cpr_lon,
                    timestamp: ts,
                    surface: true,
                };
                self.merge_position(track, sample, &mut e);
            }
            DecodedMsg::Velocity(m) => {
                let velocity = Velocity {
                    speed_kts: m.speed_kts,
                    heading_deg: m.heading_deg,
                    vertical_rate_fpm: m.vertical_rate_fpm,
                    speed_type: m.speed_type,
                };
                e.field(offer(&mut track.velocity, velocity, ts));
            }
            DecodedMsg::TargetState(m) => {
                e.field(offer(&mut track.target_state, m.state.clone(), ts));
            }
            DecodedMsg::OperationalStatus(m) => {
                e.field(offer(
                    &mut track.operational_status,
                    m.status.clone(),
                    ts,
                ));
            }
            DecodedMsg::Altitude(m) => {
                if let Some(feet) = m.altitude_ft {
                    let altitude = Altitude {
                        feet,
                        source: AltitudeSource::Barometric,
                    };
                    e.field(offer(&mut track.altitude, altitude, ts));
                }
                if let Some(on_ground) = m.on_ground {
                    e.field(offer(&mut track.on_ground, on_ground, ts));
                }
            }
            DecodedMsg::Squawk(m) => {
                e.field(offer(&mut track.squawk, m.squawk.clone(), ts));
                if let Some(on_ground) = m.on_ground {
                    e.field(offer(&mut track.on_ground, on_ground, ts));
                }
            }
            DecodedMsg::AllCall(m) => {
                if let Some(on_ground) = m.on_ground {
                    e.field(offer(&mut track.on_ground, on_ground, ts));
                }
            }
        }

        e
    }

    // -----------------------------------------------------------------------
    // CPR pairing
    // -----------------------------------------------------------------------

    /// Cache the sample, then try a global decode against the cached sample
    /// of the other parity, falling back to a local decode.
    fn merge_position(&self, track: &mut AircraftTrack, sample: CprSample, e: &mut Effect) {
        let slot = track.cpr.slot_mut(sample.format);
        if let Some(existing) = slot {
            if existing.sample == sample {
                return;
            }
            if existing.sample.timestamp > sample.timestamp {
                e.stale = true;
                return;
            }
        }
        *slot = Some(CprSlot {
            sample,
            consumed: false,
        });

        let other = track
            .cpr
            .slot(opposite(sample.format))
            .filter(|o| !o.consumed)
            .map(|o| o.sample);

        if let Some(other) = other {
            let (even, odd) = match sample.format {
                CprFormat::Even => (sample, other),
                CprFormat::Odd => (other, sample),
            };
            let reference = self.reference_for(track, &sample);

            match self.resolver.resolve_global(&even, &odd, reference) {
                Ok(coords) => {
                    self.stats.record_cpr_global();
                    for format in [CprFormat::Even, CprFormat::Odd] {
                        if let Some(slot) = track.cpr.slot_mut(format) {
                            slot.consumed = true;
                        }
                    }
                    let position = Position {
                        lat: coords.lat,
                        lon: coords.lon,
                        surface: sample.surface,
                        resolution: Resolution::Global,
                    };
                    let ts = even.timestamp.max(odd.timestamp);
                    e.field(offer(&mut track.position, position, ts));
                    return;
                }
                Err(err) => {
                    self.stats.record_cpr_error(&err);
                    debug!(icao = %track.icao_hex(), reason = err.kind(), "global CPR decode failed: {err}");
                    if matches!(
                        err,
                        CprError::Ambiguous | CprError::PairTooOld { .. } | CprError::MismatchedPair
                    ) {
                        let older = if sample.timestamp >= other.timestamp {
                            other.format
                        } else {
                            sample.format
                        };
                        *track.cpr.slot_mut(older) = None;
                    }
                }
            }
        }

        let Some(reference) = self.reference_for(track, &sample) else {
            e.pending = true;
            return;
        };

        match self.resolver.resolve_local(reference, &sample) {
            Ok(coords) => {
                self.stats.record_cpr_local();
                let position = Position {
                    lat: coords.lat,
                    lon: coords.lon,
                    surface: sample.surface,
                    resolution: Resolution::Local,
                };
                e.field(offer(&mut track.position, position, sample.timestamp));
            }
            Err(err) => {
                self.stats.record_cpr_error(&err);
                debug!(icao = %track.icao_hex(), reason = err.kind(), "local CPR decode failed: {err}");
                e.pending = true;
            }
        }
    }

    /// The track's own position if recent enough relative to the sample,
    /// else the receiver location for surface samples.
    fn reference_for(&self, track: &AircraftTrack, sample: &CprSample) -> Option<Coordinates> {
        if let Some(pos) = &track.position {
            if (sample.timestamp - pos.updated).abs() <= self.local_reference_max_age {
                return Some(pos.value.coordinates());
            }
        }
        if sample.surface {
            self.receiver
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
