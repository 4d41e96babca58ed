//! adsb-engine: Mode S / ADS-B decoding and aircraft track aggregation.
//!
//! Frames go through `frame` (integrity) and `decode` (typed messages), then
//! into the `Aggregator`, which resolves CPR positions and merges everything
//! into a concurrent `TrackRepository` with a change feed. No async runtime
//! and no I/O besides config files; the host drives it from its own tasks.

pub mod aggregator;
pub mod config;
pub mod cpr;
pub mod crc;
pub mod decode;
pub mod frame;
pub mod repository;
pub mod stats;
pub mod track;
pub mod types;

// Re-export commonly used types at crate root
pub use aggregator::{AggregationOutcome, Aggregator, IgnoreReason};
pub use config::{load_config, EngineConfig};
pub use cpr::{Coordinates, CprResolver, CprSample};
pub use decode::decode;
pub use frame::{validate, Correction, FrameValidator, RawFrame, ValidatedFrame};
pub use repository::{TrackChange, TrackEvent, TrackRepository, TrackSnapshot};
pub use stats::{Stats, StatsSnapshot};
pub use track::{AircraftTrack, FieldState, Position, Resolution, Stamped};
pub use types::*;
