//! Shared types, error enums, and decoded message types for adsb-engine.

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a raw frame was rejected before decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("unrecognized downlink format: {0}")]
    UnknownFormat(u8),
    #[error("invalid frame length for DF{df}: expected {expected} bits, got {actual}")]
    InvalidLength {
        df: u8,
        expected: usize,
        actual: usize,
    },
    #[error("integrity check failed (syndrome {0:06X})")]
    IntegrityCheckFailed(u32),
}

impl FrameError {
    /// Short label used for drop counters and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FrameError::UnknownFormat(_) => "unknown_format",
            FrameError::InvalidLength { .. } => "invalid_length",
            FrameError::IntegrityCheckFailed(_) => "integrity_check_failed",
        }
    }
}

/// Why a validated frame could not be turned into a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unsupported message type: DF{df} TC{type_code:?}")]
    UnsupportedType { df: u8, type_code: Option<u8> },
    #[error("malformed {0} field")]
    Malformed(&'static str),
}

impl DecodeError {
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::UnsupportedType { .. } => "unsupported_type",
            DecodeError::Malformed(_) => "malformed",
        }
    }
}

/// CPR resolution failures. None of these mutate the track position.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CprError {
    #[error("even/odd samples imply different latitude zones")]
    Ambiguous,
    #[error("samples {age:.1}s apart exceed the pairing window")]
    PairTooOld { age: f64 },
    #[error("samples are not an even/odd pair of the same kind")]
    MismatchedPair,
    #[error("resolved latitude {0:.4} is out of range")]
    InvalidLatitude(f64),
    #[error("no reference position available")]
    NoReference,
    #[error("resolved position is {distance_nm:.1} NM from the reference")]
    OutOfRange { distance_nm: f64 },
}

impl CprError {
    pub fn kind(&self) -> &'static str {
        match self {
            CprError::Ambiguous => "ambiguous",
            CprError::PairTooOld { .. } => "pair_too_old",
            CprError::MismatchedPair => "mismatched_pair",
            CprError::InvalidLatitude(_) => "invalid_latitude",
            CprError::NoReference => "no_reference",
            CprError::OutOfRange { .. } => "out_of_range",
        }
    }
}

/// Errors outside the per-frame path (configuration, I/O).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

// ---------------------------------------------------------------------------
// Downlink formats
// ---------------------------------------------------------------------------

/// Frame length and label of a handled downlink format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DfInfo {
    pub name: &'static str,
    pub bits: usize,
}

const SHORT: usize = 56;
const LONG: usize = 112;

/// `None` for formats the engine does not handle.
pub const fn df_info(df: u8) -> Option<DfInfo> {
    let (name, bits) = match df {
        0 => ("Short air-air surveillance", SHORT),
        4 => ("Surveillance altitude reply", SHORT),
        5 => ("Surveillance identity reply", SHORT),
        11 => ("All-call reply", SHORT),
        16 => ("Long air-air surveillance", LONG),
        17 => ("Extended squitter", LONG),
        18 => ("Extended squitter (non-transponder)", LONG),
        20 => ("Comm-B altitude reply", LONG),
        21 => ("Comm-B identity reply", LONG),
        _ => return None,
    };
    Some(DfInfo { name, bits })
}

// ---------------------------------------------------------------------------
// Addresses and feeds
// ---------------------------------------------------------------------------

/// 24-bit aircraft address, most significant byte first.
pub type Icao = [u8; 3];

pub fn icao_to_string(icao: &Icao) -> String {
    hex_encode(icao)
}

/// Parse exactly six hex digits.
pub fn icao_from_hex(hex: &str) -> Option<Icao> {
    match hex_decode(hex)?.as_slice() {
        &[a, b, c] => Some([a, b, c]),
        _ => None,
    }
}

pub fn icao_to_u32(icao: &Icao) -> u32 {
    u32::from_be_bytes([0, icao[0], icao[1], icao[2]])
}

/// Low 24 bits of `val`.
pub fn icao_from_u32(val: u32) -> Icao {
    let [_, a, b, c] = val.to_be_bytes();
    [a, b, c]
}

/// Serialize an address as its hex string rather than a byte array.
pub fn serialize_icao<S: Serializer>(icao: &Icao, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&icao_to_string(icao))
}

/// Identifier of the feed a frame arrived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub u32);

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "source-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Hex
// ---------------------------------------------------------------------------

/// Bytes from an even-length hex string, either case. Surrounding
/// whitespace is ignored.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    let digits = hex.trim().as_bytes();
    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks_exact(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            Some((hi << 4 | lo) as u8)
        })
        .collect()
}

/// Uppercase hex.
pub fn hex_encode(data: &[u8]) -> String {
    use std::fmt::Write;

    data.iter().fold(String::with_capacity(data.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02X}");
        out
    })
}

/// 6-bit identification alphabet; `#` marks unassigned codes.
pub const CALLSIGN_CHARSET: &[u8; 64] =
    b"#ABCDEFGHIJKLMNOPQRSTUVWXYZ##### ###############0123456789######";

// ---------------------------------------------------------------------------
// Field enums
// ---------------------------------------------------------------------------

/// CPR format flag (F bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CprFormat {
    Even,
    Odd,
}

impl CprFormat {
    pub fn from_bit(odd: bool) -> Self {
        if odd {
            CprFormat::Odd
        } else {
            CprFormat::Even
        }
    }

    pub fn is_odd(self) -> bool {
        self == CprFormat::Odd
    }
}

/// Speed type for velocity messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpeedType {
    Ground,
    IAS,
    TAS,
}

impl std::fmt::Display for SpeedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpeedType::Ground => write!(f, "ground"),
            SpeedType::IAS => write!(f, "IAS"),
            SpeedType::TAS => write!(f, "TAS"),
        }
    }
}

/// Where an altitude or vertical rate was measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AltitudeSource {
    Barometric,
    Gnss,
}

/// Surveillance status from airborne position messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SurveillanceStatus {
    NoCondition,
    PermanentAlert,
    TemporaryAlert,
    Spi,
}

impl SurveillanceStatus {
    pub fn from_bits(ss: u8) -> Self {
        match ss & 0x03 {
            1 => SurveillanceStatus::PermanentAlert,
            2 => SurveillanceStatus::TemporaryAlert,
            3 => SurveillanceStatus::Spi,
            _ => SurveillanceStatus::NoCondition,
        }
    }
}

/// Emitter category: set A-D (from TC 4..1) plus the 3-bit category code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EmitterCategory {
    pub set: char,
    pub code: u8,
}

impl std::fmt::Display for EmitterCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.set, self.code)
    }
}

// ---------------------------------------------------------------------------
// Decoded message types
// ---------------------------------------------------------------------------

/// TC 1-4: Aircraft identification (callsign).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentificationMsg {
    #[serde(serialize_with = "serialize_icao")]
    pub icao: Icao,
    pub callsign: String,
    pub category: EmitterCategory,
    pub timestamp: f64,
}

/// TC 9-18 (barometric) or TC 20-22 (GNSS): airborne CPR-encoded position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AirbornePositionMsg {
    #[serde(serialize_with = "serialize_icao")]
    pub icao: Icao,
    pub altitude_ft: Option<i32>,
    pub altitude_source: AltitudeSource,
    pub cpr_lat: u32,
    pub cpr_lon: u32,
    pub cpr_format: CprFormat,
    pub surveillance_status: SurveillanceStatus,
    pub timestamp: f64,
}

/// TC 5-8: surface CPR-encoded position with movement and ground track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurfacePositionMsg {
    #[serde(serialize_with = "serialize_icao")]
    pub icao: Icao,
    pub cpr_lat: u32,
    pub cpr_lon: u32,
    pub cpr_format: CprFormat,
    pub ground_speed_kts: Option<f64>,
    pub track_deg: Option<f64>,
    pub timestamp: f64,
}

/// TC 19: Airborne velocity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VelocityMsg {
    #[serde(serialize_with = "serialize_icao")]
    pub icao: Icao,
    pub speed_kts: Option<f64>,
    pub heading_deg: Option<f64>,
    pub vertical_rate_fpm: Option<i32>,
    pub vertical_rate_source: AltitudeSource,
    pub speed_type: SpeedType,
    /// GNSS height minus barometric altitude.
    pub geo_minus_baro_ft: Option<i32>,
    pub timestamp: f64,
}

/// Autopilot/FMS data source indicator (target state version 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TargetSource {
    Unavailable,
    Autopilot,
    Holding,
    Fms,
}

impl TargetSource {
    pub fn from_bits(v: u8) -> Self {
        match v & 0x03 {
            1 => TargetSource::Autopilot,
            2 => TargetSource::Holding,
            3 => TargetSource::Fms,
            _ => TargetSource::Unavailable,
        }
    }
}

/// Vertical/horizontal mode indicator (target state version 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TargetMode {
    Unknown,
    Acquiring,
    Maintaining,
    Reserved,
}

impl TargetMode {
    pub fn from_bits(v: u8) -> Self {
        match v & 0x03 {
            1 => TargetMode::Acquiring,
            2 => TargetMode::Maintaining,
            3 => TargetMode::Reserved,
            _ => TargetMode::Unknown,
        }
    }
}

/// Target state and status, DO-260A layout (TC 29 subtype 0).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetStateV1 {
    pub vertical_source: TargetSource,
    /// True when the target altitude is referenced to MSL rather than a flight level.
    pub altitude_is_msl: bool,
    pub target_altitude_ft: Option<i32>,
    pub vertical_mode: TargetMode,
    pub horizontal_source: TargetSource,
    pub target_heading_deg: Option<f64>,
    /// True when `target_heading_deg` is a track angle rather than a heading.
    pub heading_is_track: bool,
    pub horizontal_mode: TargetMode,
    pub nac_p: u8,
    pub nic_baro: bool,
    pub sil: u8,
    pub tcas_ra_capable: u8,
    pub emergency_state: u8,
}

/// Autopilot mode flags (target state version 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AutopilotModes {
    pub autopilot: bool,
    pub vnav: bool,
    pub altitude_hold: bool,
    pub approach: bool,
    pub lnav: bool,
}

/// Target state and status, DO-260B layout (TC 29 subtype 1).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetStateV2 {
    pub selected_altitude_ft: Option<i32>,
    /// True when the selected altitude comes from the FMS rather than the MCP/FCU.
    pub selected_altitude_fms: bool,
    pub baro_setting_mb: Option<f64>,
    pub selected_heading_deg: Option<f64>,
    pub nac_p: u8,
    pub nic_baro: bool,
    pub sil: u8,
    pub modes: Option<AutopilotModes>,
    pub tcas_operational: bool,
}

/// Versioned target state payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "version")]
pub enum TargetState {
    Version1(TargetStateV1),
    Version2(TargetStateV2),
}

impl TargetState {
    /// Selected/target altitude regardless of version.
    pub fn altitude_ft(&self) -> Option<i32> {
        match self {
            TargetState::Version1(v) => v.target_altitude_ft,
            TargetState::Version2(v) => v.selected_altitude_ft,
        }
    }

    /// Selected/target heading regardless of version.
    pub fn heading_deg(&self) -> Option<f64> {
        match self {
            TargetState::Version1(v) => v.target_heading_deg,
            TargetState::Version2(v) => v.selected_heading_deg,
        }
    }
}

/// TC 29: Target state and status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetStateMsg {
    #[serde(serialize_with = "serialize_icao")]
    pub icao: Icao,
    pub state: TargetState,
    pub timestamp: f64,
}

/// Capability and mode flags from an operational status message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationalStatus {
    pub surface: bool,
    pub version: u8,
    pub capability_class: u16,
    pub operational_mode: u16,
    pub acas_operational: bool,
    pub tcas_ra_active: bool,
    pub ident_active: bool,
    pub nac_p: u8,
    pub sil: u8,
    /// NIC baro for airborne, track/heading reference for surface.
    pub baro_or_heading_flag: bool,
}

/// TC 31: Aircraft operational status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationalStatusMsg {
    #[serde(serialize_with = "serialize_icao")]
    pub icao: Icao,
    pub status: OperationalStatus,
    pub timestamp: f64,
}

/// DF0/4/16/20: Altitude reply. Address recovered from parity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AltitudeMsg {
    #[serde(serialize_with = "serialize_icao")]
    pub icao: Icao,
    pub altitude_ft: Option<i32>,
    pub on_ground: Option<bool>,
    pub timestamp: f64,
}

/// DF5/21: Identity reply (squawk code). Address recovered from parity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SquawkMsg {
    #[serde(serialize_with = "serialize_icao")]
    pub icao: Icao,
    pub squawk: String,
    pub on_ground: Option<bool>,
    pub timestamp: f64,
}

/// DF11: All-call reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllCallMsg {
    #[serde(serialize_with = "serialize_icao")]
    pub icao: Icao,
    pub capability: u8,
    pub on_ground: Option<bool>,
    pub timestamp: f64,
}

/// Union type for all decoded messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum DecodedMsg {
    Identification(IdentificationMsg),
    AirbornePosition(AirbornePositionMsg),
    SurfacePosition(SurfacePositionMsg),
    Velocity(VelocityMsg),
    TargetState(TargetStateMsg),
    OperationalStatus(OperationalStatusMsg),
    Altitude(AltitudeMsg),
    Squawk(SquawkMsg),
    AllCall(AllCallMsg),
}

impl DecodedMsg {
    /// Get the ICAO address from any message type.
    pub fn icao(&self) -> &Icao {
        match self {
            DecodedMsg::Identification(m) => &m.icao,
            DecodedMsg::AirbornePosition(m) => &m.icao,
            DecodedMsg::SurfacePosition(m) => &m.icao,
            DecodedMsg::Velocity(m) => &m.icao,
            DecodedMsg::TargetState(m) => &m.icao,
            DecodedMsg::OperationalStatus(m) => &m.icao,
            DecodedMsg::Altitude(m) => &m.icao,
            DecodedMsg::Squawk(m) => &m.icao,
            DecodedMsg::AllCall(m) => &m.icao,
        }
    }

    /// Get the timestamp from any message type.
    pub fn timestamp(&self) -> f64 {
        match self {
            DecodedMsg::Identification(m) => m.timestamp,
            DecodedMsg::AirbornePosition(m) => m.timestamp,
            DecodedMsg::SurfacePosition(m) => m.timestamp,
            DecodedMsg::Velocity(m) => m.timestamp,
            DecodedMsg::TargetState(m) => m.timestamp,
            DecodedMsg::OperationalStatus(m) => m.timestamp,
            DecodedMsg::Altitude(m) => m.timestamp,
            DecodedMsg::Squawk(m) => m.timestamp,
            DecodedMsg::AllCall(m) => m.timestamp,
        }
    }

    /// True when the address came from an explicit AA field protected by
    /// CRC. Parity-derived addresses may only update known aircraft.
    pub fn has_verified_address(&self) -> bool {
        !matches!(self, DecodedMsg::Altitude(_) | DecodedMsg::Squawk(_))
    }

    /// Short label for logs and counters.
    pub fn kind(&self) -> &'static str {
        match self {
            DecodedMsg::Identification(_) => "identification",
            DecodedMsg::AirbornePosition(_) => "airborne_position",
            DecodedMsg::SurfacePosition(_) => "surface_position",
            DecodedMsg::Velocity(_) => "velocity",
            DecodedMsg::TargetState(_) => "target_state",
            DecodedMsg::OperationalStatus(_) => "operational_status",
            DecodedMsg::Altitude(_) => "altitude",
            DecodedMsg::Squawk(_) => "squawk",
            DecodedMsg::AllCall(_) => "all_call",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
