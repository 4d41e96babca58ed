//! Engine-wide counters.
//!
//! Updated from every feed task without locking; read through
//! [`Stats::snapshot`] for logging and the CLI summary.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::types::{CprError, DecodeError, FrameError};

/// Lock-free engine counters.
#[derive(Debug, Default)]
pub struct Stats {
    frames_received: AtomicU64,
    frames_accepted: AtomicU64,
    frames_corrected: AtomicU64,
    dropped_unknown_format: AtomicU64,
    dropped_invalid_length: AtomicU64,
    dropped_integrity: AtomicU64,
    dropped_unsupported: AtomicU64,
    dropped_malformed: AtomicU64,
    tracks_created: AtomicU64,
    tracks_updated: AtomicU64,
    tracks_evicted: AtomicU64,
    ignored_stale: AtomicU64,
    ignored_pending: AtomicU64,
    ignored_duplicate: AtomicU64,
    ignored_unknown_aircraft: AtomicU64,
    cpr_global: AtomicU64,
    cpr_local: AtomicU64,
    cpr_ambiguous: AtomicU64,
    cpr_pair_too_old: AtomicU64,
    cpr_no_reference: AtomicU64,
    cpr_out_of_range: AtomicU64,
    cpr_invalid: AtomicU64,
}

/// Point-in-time copy of [`Stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames_received: u64,
    pub frames_accepted: u64,
    pub frames_corrected: u64,
    pub dropped_unknown_format: u64,
    pub dropped_invalid_length: u64,
    pub dropped_integrity: u64,
    pub dropped_unsupported: u64,
    pub dropped_malformed: u64,
    pub tracks_created: u64,
    pub tracks_updated: u64,
    pub tracks_evicted: u64,
    pub ignored_stale: u64,
    pub ignored_pending: u64,
    pub ignored_duplicate: u64,
    pub ignored_unknown_aircraft: u64,
    pub cpr_global: u64,
    pub cpr_local: u64,
    pub cpr_ambiguous: u64,
    pub cpr_pair_too_old: u64,
    pub cpr_no_reference: u64,
    pub cpr_out_of_range: u64,
    pub cpr_invalid: u64,
}

impl StatsSnapshot {
    pub fn frames_dropped(&self) -> u64 {
        self.dropped_unknown_format
            + self.dropped_invalid_length
            + self.dropped_integrity
            + self.dropped_unsupported
            + self.dropped_malformed
    }

    pub fn cpr_failures(&self) -> u64 {
        self.cpr_ambiguous
            + self.cpr_pair_too_old
            + self.cpr_no_reference
            + self.cpr_out_of_range
            + self.cpr_invalid
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        bump(&self.frames_received);
    }

    pub fn record_accepted(&self, corrected: bool) {
        bump(&self.frames_accepted);
        if corrected {
            bump(&self.frames_corrected);
        }
    }

    pub fn record_frame_error(&self, err: &FrameError) {
        bump(match err {
            FrameError::UnknownFormat(_) => &self.dropped_unknown_format,
            FrameError::InvalidLength { .. } => &self.dropped_invalid_length,
            FrameError::IntegrityCheckFailed(_) => &self.dropped_integrity,
        });
    }

    pub fn record_decode_error(&self, err: &DecodeError) {
        bump(match err {
            DecodeError::UnsupportedType { .. } => &self.dropped_unsupported,
            DecodeError::Malformed(_) => &self.dropped_malformed,
        });
    }

    pub fn record_cpr_error(&self, err: &CprError) {
        bump(match err {
            CprError::Ambiguous => &self.cpr_ambiguous,
            CprError::PairTooOld { .. } => &self.cpr_pair_too_old,
            CprError::NoReference => &self.cpr_no_reference,
            CprError::OutOfRange { .. } => &self.cpr_out_of_range,
            CprError::MismatchedPair | CprError::InvalidLatitude(_) => &self.cpr_invalid,
        });
    }

    pub(crate) fn record_cpr_global(&self) {
        bump(&self.cpr_global);
    }

    pub(crate) fn record_cpr_local(&self) {
        bump(&self.cpr_local);
    }

    pub(crate) fn record_created(&self) {
        bump(&self.tracks_created);
    }

    pub(crate) fn record_updated(&self) {
        bump(&self.tracks_updated);
    }

    pub(crate) fn record_evicted(&self, count: usize) {
        self.tracks_evicted
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_ignored_stale(&self) {
        bump(&self.ignored_stale);
    }

    pub(crate) fn record_ignored_pending(&self) {
        bump(&self.ignored_pending);
    }

    pub(crate) fn record_ignored_duplicate(&self) {
        bump(&self.ignored_duplicate);
    }

    pub(crate) fn record_ignored_unknown(&self) {
        bump(&self.ignored_unknown_aircraft);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            frames_received: get(&self.frames_received),
            frames_accepted: get(&self.frames_accepted),
            frames_corrected: get(&self.frames_corrected),
            dropped_unknown_format: get(&self.dropped_unknown_format),
            dropped_invalid_length: get(&self.dropped_invalid_length),
            dropped_integrity: get(&self.dropped_integrity),
            dropped_unsupported: get(&self.dropped_unsupported),
            dropped_malformed: get(&self.dropped_malformed),
            tracks_created: get(&self.tracks_created),
            tracks_updated: get(&self.tracks_updated),
            tracks_evicted: get(&self.tracks_evicted),
            ignored_stale: get(&self.ignored_stale),
            ignored_pending: get(&self.ignored_pending),
            ignored_duplicate: get(&self.ignored_duplicate),
            ignored_unknown_aircraft: get(&self.ignored_unknown_aircraft),
            cpr_global: get(&self.cpr_global),
            cpr_local: get(&self.cpr_local),
            cpr_ambiguous: get(&self.cpr_ambiguous),
            cpr_pair_too_old: get(&self.cpr_pair_too_old),
            cpr_no_reference: get(&self.cpr_no_reference),
            cpr_out_of_range: get(&self.cpr_out_of_range),
            cpr_invalid: get(&self.cpr_invalid),
        }
    }
}
