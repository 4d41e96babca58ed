//! Concurrent track store and change feed.
//!
//! Tracks live in a `DashMap` keyed by address, so writers for different
//! aircraft only contend on the same shard. Cross-aircraft reads (bulk
//! snapshot) take the write side of `gate`, which waits for in-flight
//! per-aircraft updates and gives a view consistent with the event
//! sequence number.
//!
//! Events are published while the shard holding the track is still locked,
//! so per-aircraft event order matches update order.

use std::sync::{Mutex, RwLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::track::AircraftTrack;
use crate::types::*;

// ---------------------------------------------------------------------------
// Change feed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "track")]
pub enum TrackChange {
    Created(AircraftTrack),
    Updated(AircraftTrack),
    /// Last state before eviction.
    Removed(AircraftTrack),
}

/// One change-feed entry. `seq` increases by one per emitted event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackEvent {
    pub seq: u64,
    #[serde(serialize_with = "serialize_icao")]
    pub icao: Icao,
    pub change: TrackChange,
}

#[derive(Debug, Default)]
struct FeedState {
    next_seq: u64,
    subscribers: Vec<mpsc::UnboundedSender<TrackEvent>>,
}

/// Fan-out of track events to any number of subscribers, in emission order.
#[derive(Debug, Default)]
pub struct ChangeFeed {
    inner: Mutex<FeedState>,
}

impl ChangeFeed {
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<TrackEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(tx);
        rx
    }

    /// Sequence number of the most recently emitted event (0 before any).
    pub fn last_seq(&self) -> u64 {
        self.lock().next_seq
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Assign the next sequence number and deliver. The change is only
    /// built when someone is listening. Closed subscribers are dropped.
    fn publish(&self, icao: Icao, change: impl FnOnce() -> TrackChange) {
        let mut state = self.lock();
        state.next_seq += 1;
        if state.subscribers.is_empty() {
            return;
        }

        let event = TrackEvent {
            seq: state.next_seq,
            icao,
            change: change(),
        };
        state
            .subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FeedState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// Immutable copy of all tracks at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct TrackSnapshot {
    /// Most recently seen first.
    pub tracks: Vec<AircraftTrack>,
    /// Every event up to and including this sequence number is reflected.
    pub last_seq: u64,
}

impl TrackSnapshot {
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, icao: &Icao) -> Option<&AircraftTrack> {
        self.tracks.iter().find(|t| &t.icao() == icao)
    }
}

/// Result of [`TrackRepository::with_track`].
pub(crate) struct Touched<R> {
    pub result: R,
    pub created: bool,
}

#[derive(Debug, Default)]
pub struct TrackRepository {
    tracks: DashMap<Icao, AircraftTrack>,
    gate: RwLock<()>,
    feed: ChangeFeed,
}

impl TrackRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point query.
    pub fn get(&self, icao: &Icao) -> Option<AircraftTrack> {
        self.tracks.get(icao).map(|t| t.value().clone())
    }

    pub fn contains(&self, icao: &Icao) -> bool {
        self.tracks.contains_key(icao)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<TrackEvent> {
        self.feed.subscribe()
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Consistent copy of every track, sorted by last seen (newest first).
    pub fn snapshot(&self) -> TrackSnapshot {
        let _exclusive = self.gate.write().unwrap_or_else(|e| e.into_inner());
        let mut tracks: Vec<AircraftTrack> =
            self.tracks.iter().map(|t| t.value().clone()).collect();
        tracks.sort_by(|a, b| {
            b.last_seen
                .total_cmp(&a.last_seen)
                .then_with(|| a.icao().cmp(&b.icao()))
        });
        TrackSnapshot {
            tracks,
            last_seq: self.feed.last_seq(),
        }
    }

    /// Run `update` on the track for `icao` under its shard lock.
    ///
    /// An absent track is created at `create_at` first when given, else
    /// nothing happens and `None` is returned. `update` reports whether the
    /// track changed; `Created`/`Updated` events are emitted accordingly.
    pub(crate) fn with_track<R>(
        &self,
        icao: Icao,
        create_at: Option<f64>,
        update: impl FnOnce(&mut AircraftTrack) -> (R, bool),
    ) -> Option<Touched<R>> {
        let _shared = self.gate.read().unwrap_or_else(|e| e.into_inner());

        match self.tracks.entry(icao) {
            Entry::Occupied(mut entry) => {
                let track = entry.get_mut();
                let (result, changed) = update(track);
                debug_assert_eq!(track.icao(), icao, "track address changed");
                if changed {
                    self.feed
                        .publish(icao, || TrackChange::Updated(track.clone()));
                }
                Some(Touched {
                    result,
                    created: false,
                })
            }
            Entry::Vacant(entry) => {
                let timestamp = create_at?;
                let mut track = AircraftTrack::new(icao, timestamp);
                let (result, _) = update(&mut track);
                debug_assert_eq!(track.icao(), icao, "track address changed");
                let track = entry.insert(track);
                self.feed
                    .publish(icao, || TrackChange::Created(track.value().clone()));
                Some(Touched {
                    result,
                    created: true,
                })
            }
        }
    }

    /// Remove every track not seen within `expiry_secs` of `now`, emitting
    /// a `Removed` event for each. Returns the evicted addresses.
    pub(crate) fn evict_expired(&self, now: f64, expiry_secs: f64) -> Vec<Icao> {
        let _shared = self.gate.read().unwrap_or_else(|e| e.into_inner());

        let mut evicted = Vec::new();
        self.tracks.retain(|icao, track| {
            if !track.is_expired(now, expiry_secs) {
                return true;
            }
            self.feed
                .publish(*icao, || TrackChange::Removed(track.clone()));
            evicted.push(*icao);
            false
        });
        evicted
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
