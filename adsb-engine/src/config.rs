//! Engine configuration.
//!
//! Reads/writes `~/.adsb-track/config.ron` with CPR pairing policy,
//! per-field staleness windows, expiry/sweep timing and frame validation
//! settings. Every field has a default, so a partial file is valid.

use std::path::{Path, PathBuf};

use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};

use crate::cpr::Coordinates;
use crate::frame::Correction;
use crate::types::{EngineError, Result};

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cpr: CprConfig,
    pub staleness: StalenessWindows,
    /// Tracks not seen for this long are evicted by the sweep.
    pub expiry_secs: f64,
    pub sweep_interval_secs: f64,
    pub validator: ValidatorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CprConfig {
    /// Maximum time between an even and odd sample for global decode.
    pub pair_window_secs: f64,
    /// How recent a track position must be to serve as a local reference.
    pub local_reference_max_age_secs: f64,
    pub max_airborne_range_nm: f64,
    pub max_surface_range_nm: f64,
    /// Receiver location, used to disambiguate surface positions.
    pub receiver: Option<Coordinates>,
}

/// Per-field windows (seconds) after which a field is reported stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StalenessWindows {
    pub position: f64,
    pub velocity: f64,
    pub altitude: f64,
    pub identity: f64,
    pub squawk: f64,
    pub target_state: f64,
    pub operational_status: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub correct_errors: Correction,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            cpr: CprConfig::default(),
            staleness: StalenessWindows::default(),
            expiry_secs: 300.0,
            sweep_interval_secs: 1.0,
            validator: ValidatorConfig::default(),
        }
    }
}

impl Default for CprConfig {
    fn default() -> Self {
        CprConfig {
            pair_window_secs: 10.0,
            local_reference_max_age_secs: 30.0,
            max_airborne_range_nm: 180.0,
            max_surface_range_nm: 45.0,
            receiver: None,
        }
    }
}

impl Default for StalenessWindows {
    fn default() -> Self {
        StalenessWindows {
            position: 60.0,
            velocity: 60.0,
            altitude: 60.0,
            identity: 300.0,
            squawk: 300.0,
            target_state: 60.0,
            operational_status: 600.0,
        }
    }
}

impl EngineConfig {
    /// Check that all windows are positive and the sweep runs at least
    /// once per expiry period.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("cpr.pair_window_secs", self.cpr.pair_window_secs),
            (
                "cpr.local_reference_max_age_secs",
                self.cpr.local_reference_max_age_secs,
            ),
            ("cpr.max_airborne_range_nm", self.cpr.max_airborne_range_nm),
            ("cpr.max_surface_range_nm", self.cpr.max_surface_range_nm),
            ("staleness.position", self.staleness.position),
            ("staleness.velocity", self.staleness.velocity),
            ("staleness.altitude", self.staleness.altitude),
            ("staleness.identity", self.staleness.identity),
            ("staleness.squawk", self.staleness.squawk),
            ("staleness.target_state", self.staleness.target_state),
            (
                "staleness.operational_status",
                self.staleness.operational_status,
            ),
            ("expiry_secs", self.expiry_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(EngineError::Config(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }

        if self.sweep_interval_secs > self.expiry_secs {
            return Err(EngineError::Config(format!(
                "sweep_interval_secs ({}) must not exceed expiry_secs ({})",
                self.sweep_interval_secs, self.expiry_secs
            )));
        }

        if let Some(r) = &self.cpr.receiver {
            if !(-90.0..=90.0).contains(&r.lat) || !(-180.0..=180.0).contains(&r.lon) {
                return Err(EngineError::Config(format!(
                    "receiver position ({}, {}) is out of range",
                    r.lat, r.lon
                )));
            }
        }

        Ok(())
    }
}

/// Get the config directory path (`~/.adsb-track/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".adsb-track")
}

/// Get the default config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.ron")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `path`, or from the default location when `None`.
///
/// A missing file yields the defaults; an unreadable, malformed or
/// invalid one is an error.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_file);
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(EngineConfig::default());
    }

    let text = std::fs::read_to_string(&path)?;
    let config = parse_config(&text)
        .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Parse and validate RON config text.
pub fn parse_config(text: &str) -> Result<EngineConfig> {
    let config: EngineConfig =
        ron::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Write config as pretty RON, creating parent directories.
pub fn save_config(config: &EngineConfig, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let text = ron::ser::to_string_pretty(config, PrettyConfig::default())
        .map_err(|e| EngineError::Config(e.to_string()))?;
    std::fs::write(path, text)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
