//! Aggregated per-aircraft track record.
//!
//! Every field carries the timestamp of the message that last wrote it, so
//! updates can be ordered by message time rather than arrival order.

use serde::Serialize;

use crate::config::StalenessWindows;
use crate::cpr::{Coordinates, CprSample};
use crate::types::*;

// ---------------------------------------------------------------------------
// Stamped fields
// ---------------------------------------------------------------------------

/// A field value together with the message timestamp that set it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stamped<T> {
    pub value: T,
    pub updated: f64,
}

/// Result of offering a value to a stamped field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Stored (new value or newer timestamp).
    Applied,
    /// Same value at the same timestamp; nothing changed.
    Unchanged,
    /// Older than what is stored; rejected.
    Stale,
}

/// Last writer wins by message time: overwrite when `timestamp` is not older
/// than the stored one.
pub fn offer<T: PartialEq>(slot: &mut Option<Stamped<T>>, value: T, timestamp: f64) -> Offer {
    match slot {
        Some(cur) if timestamp < cur.updated => Offer::Stale,
        Some(cur) if timestamp == cur.updated && cur.value == value => Offer::Unchanged,
        _ => {
            *slot = Some(Stamped {
                value,
                updated: timestamp,
            });
            Offer::Applied
        }
    }
}

// ---------------------------------------------------------------------------
// Field payloads
// ---------------------------------------------------------------------------

/// How a position was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Resolution {
    Global,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    pub surface: bool,
    pub resolution: Resolution,
}

impl Position {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Altitude {
    pub feet: i32,
    pub source: AltitudeSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Velocity {
    pub speed_kts: Option<f64>,
    pub heading_deg: Option<f64>,
    pub vertical_rate_fpm: Option<i32>,
    pub speed_type: SpeedType,
}

// ---------------------------------------------------------------------------
// CPR sample cache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CprSlot {
    pub sample: CprSample,
    /// Already used in a global decode; kept only to recognize duplicates.
    pub consumed: bool,
}

/// Most recent even and odd samples for one aircraft.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct CprCache {
    pub even: Option<CprSlot>,
    pub odd: Option<CprSlot>,
}

impl CprCache {
    pub fn slot_mut(&mut self, format: CprFormat) -> &mut Option<CprSlot> {
        match format {
            CprFormat::Even => &mut self.even,
            CprFormat::Odd => &mut self.odd,
        }
    }

    pub fn slot(&self, format: CprFormat) -> Option<&CprSlot> {
        match format {
            CprFormat::Even => self.even.as_ref(),
            CprFormat::Odd => self.odd.as_ref(),
        }
    }
}

// ---------------------------------------------------------------------------
// AircraftTrack
// ---------------------------------------------------------------------------

/// Aggregated state of one aircraft. The address never changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AircraftTrack {
    #[serde(serialize_with = "serialize_icao")]
    icao: Icao,
    pub first_seen: f64,
    pub last_seen: f64,
    pub callsign: Option<Stamped<String>>,
    pub category: Option<Stamped<EmitterCategory>>,
    pub position: Option<Stamped<Position>>,
    pub altitude: Option<Stamped<Altitude>>,
    pub velocity: Option<Stamped<Velocity>>,
    pub squawk: Option<Stamped<String>>,
    pub on_ground: Option<Stamped<bool>>,
    pub surveillance_status: Option<Stamped<SurveillanceStatus>>,
    pub target_state: Option<Stamped<TargetState>>,
    pub operational_status: Option<Stamped<OperationalStatus>>,
    #[serde(skip)]
    pub(crate) cpr: CprCache,
}

impl AircraftTrack {
    pub fn new(icao: Icao, timestamp: f64) -> Self {
        AircraftTrack {
            icao,
            first_seen: timestamp,
            last_seen: timestamp,
            callsign: None,
            category: None,
            position: None,
            altitude: None,
            velocity: None,
            squawk: None,
            on_ground: None,
            surveillance_status: None,
            target_state: None,
            operational_status: None,
            cpr: CprCache::default(),
        }
    }

    pub fn icao(&self) -> Icao {
        self.icao
    }

    pub fn icao_hex(&self) -> String {
        icao_to_string(&self.icao)
    }

    /// Keep first/last seen spanning every message observed.
    pub fn observe(&mut self, timestamp: f64) {
        self.last_seen = self.last_seen.max(timestamp);
        self.first_seen = self.first_seen.min(timestamp);
    }

    pub fn has_position(&self) -> bool {
        self.position.is_some()
    }

    /// Seconds since the position was last updated.
    pub fn position_age(&self, now: f64) -> Option<f64> {
        self.position.as_ref().map(|p| now - p.updated)
    }

    pub fn age(&self, now: f64) -> f64 {
        now - self.last_seen
    }

    pub fn is_expired(&self, now: f64, expiry_secs: f64) -> bool {
        self.age(now) > expiry_secs
    }

    /// Per-field currency relative to `now`.
    pub fn freshness(&self, now: f64, windows: &StalenessWindows) -> TrackFreshness {
        fn state<T>(field: &Option<Stamped<T>>, now: f64, window: f64) -> FieldState {
            match field {
                None => FieldState::Absent,
                Some(s) if now - s.updated > window => FieldState::Stale,
                Some(_) => FieldState::Current,
            }
        }

        TrackFreshness {
            position: state(&self.position, now, windows.position),
            position_age: self.position_age(now),
            velocity: state(&self.velocity, now, windows.velocity),
            altitude: state(&self.altitude, now, windows.altitude),
            identity: state(&self.callsign, now, windows.identity),
            squawk: state(&self.squawk, now, windows.squawk),
            target_state: state(&self.target_state, now, windows.target_state),
            operational_status: state(
                &self.operational_status,
                now,
                windows.operational_status,
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldState {
    Current,
    Stale,
    Absent,
}

/// Freshness report for one track. A stale position keeps its coordinates;
/// consumers get its age instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackFreshness {
    pub position: FieldState,
    pub position_age: Option<f64>,
    pub velocity: FieldState,
    pub altitude: FieldState,
    pub identity: FieldState,
    pub squawk: FieldState,
    pub target_state: FieldState,
    pub operational_status: FieldState,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_last_writer_wins() {
        let mut slot = None;
        assert_eq!(offer(&mut slot, 100, 10.0), Offer::Applied);
        assert_eq!(offer(&mut slot, 200, 12.0), Offer::Applied);
        assert_eq!(offer(&mut slot, 150, 11.0), Offer::Stale);
        assert_eq!(slot.as_ref().map(|s| s.value), Some(200));
        assert_eq!(slot.as_ref().map(|s| s.updated), Some(12.0));
    }

    #[test]
    fn test_offer_same_value() {
        let mut slot = None;
        offer(&mut slot, "KLM1023".to_string(), 5.0);
        assert_eq!(
            offer(&mut slot, "KLM1023".to_string(), 5.0),
            Offer::Unchanged
        );
        // Same value, newer message refreshes the timestamp
        assert_eq!(
            offer(&mut slot, "KLM1023".to_string(), 6.0),
            Offer::Applied
        );
        assert_eq!(slot.unwrap().updated, 6.0);
    }

    #[test]
    fn test_offer_equal_timestamp_overwrites() {
        let mut slot = None;
        offer(&mut slot, 1, 5.0);
        assert_eq!(offer(&mut slot, 2, 5.0), Offer::Applied);
        assert_eq!(slot.unwrap().value, 2);
    }

    #[test]
    fn test_observe_spans_messages() {
        let mut track = AircraftTrack::new([0xAB, 0xCD, 0xEF], 10.0);
        track.observe(12.0);
        track.observe(8.0);
        track.observe(11.0);
        assert_eq!(track.first_seen, 8.0);
        assert_eq!(track.last_seen, 12.0);
        assert_eq!(track.icao_hex(), "ABCDEF");
    }

    #[test]
    fn test_expiry() {
        let track = AircraftTrack::new([1, 2, 3], 100.0);
        assert!(!track.is_expired(400.0, 300.0));
        assert!(track.is_expired(400.1, 300.0));
    }

    #[test]
    fn test_freshness() {
        let windows = StalenessWindows::default();
        let mut track = AircraftTrack::new([1, 2, 3], 0.0);
        offer(
            &mut track.position,
            Position {
                lat: 52.0,
                lon: 4.0,
                surface: false,
                resolution: Resolution::Global,
            },
            0.0,
        );
        offer(&mut track.callsign, "KLM1023".to_string(), 0.0);

        let f = track.freshness(30.0, &windows);
        assert_eq!(f.position, FieldState::Current);
        assert_eq!(f.identity, FieldState::Current);
        assert_eq!(f.velocity, FieldState::Absent);
        assert_eq!(f.position_age, Some(30.0));

        let f = track.freshness(90.0, &windows);
        assert_eq!(f.position, FieldState::Stale);
        assert_eq!(f.identity, FieldState::Current);
        // Stale positions keep their coordinates
        assert!(track.has_position());
    }

    #[test]
    fn test_cpr_cache_slots() {
        let mut cache = CprCache::default();
        let sample = CprSample {
            format: CprFormat::Odd,
            lat: 1,
            lon: 2,
            timestamp: 3.0,
            surface: false,
        };
        *cache.slot_mut(CprFormat::Odd) = Some(CprSlot {
            sample,
            consumed: false,
        });
        assert!(cache.slot(CprFormat::Even).is_none());
        assert_eq!(cache.slot(CprFormat::Odd).map(|s| s.sample), Some(sample));
    }
}
