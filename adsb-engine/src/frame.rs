//! Raw frames and integrity validation.
//!
//! Responsibilities:
//! - Classify Downlink Format (DF) from the first 5 bits
//! - Check the frame length against the DF (56 or 112 bits)
//! - Verify CRC-24 parity for explicit-address formats (DF11/17/18)
//! - Recover the address from the parity residual for DF0/4/5/16/20/21
//! - Optionally repair 1-2 bit errors in DF17/18

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::crc;
use crate::types::{df_info, hex_decode, icao_from_u32, FrameError, Icao, SourceId};

// DFs where ICAO is explicit in bytes 1-3
const DF_EXPLICIT_ICAO: &[u8] = &[11, 17, 18];

// ---------------------------------------------------------------------------
// RawFrame
// ---------------------------------------------------------------------------

/// A frame as handed over by a feed reader. Consumed once by validation.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub bytes: Vec<u8>,
    /// Wall-clock arrival time, Unix seconds. Orders updates.
    pub timestamp: f64,
    /// Monotonic arrival instant, used for pipeline latency.
    pub received_at: Instant,
    pub source: SourceId,
}

impl RawFrame {
    pub fn new(bytes: Vec<u8>, timestamp: f64, source: SourceId) -> Self {
        RawFrame {
            bytes,
            timestamp,
            received_at: Instant::now(),
            source,
        }
    }

    /// Build a frame from a hex string (14 or 28 hex digits).
    pub fn from_hex(hex: &str, timestamp: f64, source: SourceId) -> Option<Self> {
        hex_decode(hex).map(|bytes| RawFrame::new(bytes, timestamp, source))
    }
}

// ---------------------------------------------------------------------------
// ValidatedFrame
// ---------------------------------------------------------------------------

/// How the ICAO address of a frame was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AddressSource {
    /// AA field protected by a zero-syndrome CRC.
    Explicit,
    /// Recovered from the parity residual; unverifiable on its own.
    Parity,
}

/// A frame that passed integrity validation.
#[derive(Debug, Clone)]
pub struct ValidatedFrame {
    /// Downlink Format (0-24)
    pub df: u8,
    /// 3-byte ICAO address
    pub icao: Icao,
    pub address_source: AddressSource,
    /// Full message bytes (after any correction)
    pub raw: Vec<u8>,
    pub timestamp: f64,
    pub received_at: Instant,
    pub source: SourceId,
    /// Message length in bits (56 or 112)
    pub msg_bits: usize,
    /// True if error correction was applied
    pub corrected: bool,
}

impl ValidatedFrame {
    /// Human-readable Downlink Format name.
    pub fn df_name(&self) -> &'static str {
        df_info(self.df).map(|info| info.name).unwrap_or("Unknown")
    }

    /// True for DF17/18 extended squitters.
    pub fn is_extended_squitter(&self) -> bool {
        self.df == 17 || self.df == 18
    }

    /// True if this is a 112-bit (long) message.
    pub fn is_long(&self) -> bool {
        self.msg_bits == 112
    }

    /// Message Extended field (bytes 4-10, 56 bits) for DF17/18.
    /// Returns empty slice for short frames.
    pub fn me(&self) -> &[u8] {
        if self.is_long() && self.raw.len() >= 11 {
            &self.raw[4..11]
        } else {
            &[]
        }
    }

    /// ME field as the low 56 bits of a u64. ME bit k (1-indexed) sits at
    /// shift `56 - k`.
    pub fn me_bits(&self) -> Option<u64> {
        let me = self.me();
        if me.len() < 7 {
            return None;
        }
        let mut buf = [0u8; 8];
        buf[1..8].copy_from_slice(me);
        Some(u64::from_be_bytes(buf))
    }

    /// ADS-B Type Code (first 5 bits of ME field). None for non-ADS-B.
    pub fn type_code(&self) -> Option<u8> {
        if !self.is_extended_squitter() || !self.is_long() || self.raw.len() < 5 {
            return None;
        }
        Some((self.raw[4] >> 3) & 0x1F)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// How aggressively DF17/18 frames with a non-zero syndrome are repaired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Correction {
    #[default]
    None,
    Single,
    Double,
}

impl Correction {
    fn max_flips(self) -> usize {
        match self {
            Correction::None => 0,
            Correction::Single => 1,
            Correction::Double => 2,
        }
    }
}

/// Integrity checker. Pure: the same input always gives the same output,
/// so one instance can be shared freely across feed tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameValidator {
    correction: Correction,
}

impl FrameValidator {
    pub fn new(correction: Correction) -> Self {
        FrameValidator { correction }
    }

    /// Validate a raw frame and extract its DF and address.
    pub fn validate(&self, frame: RawFrame) -> Result<ValidatedFrame, FrameError> {
        let RawFrame {
            bytes,
            timestamp,
            received_at,
            source,
        } = frame;

        let msg_bits = bytes.len() * 8;
        if msg_bits != 56 && msg_bits != 112 {
            return Err(FrameError::InvalidLength {
                df: bytes.first().map(|b| (b >> 3) & 0x1F).unwrap_or(0),
                expected: 56,
                actual: msg_bits,
            });
        }

        let df = (bytes[0] >> 3) & 0x1F;
        let info = df_info(df).ok_or(FrameError::UnknownFormat(df))?;
        if msg_bits != info.bits {
            return Err(FrameError::InvalidLength {
                df,
                expected: info.bits,
                actual: msg_bits,
            });
        }

        let remainder = crc::syndrome(&bytes);
        let mut raw = bytes;
        let mut corrected = false;

        let (icao, address_source) = if DF_EXPLICIT_ICAO.contains(&df) {
            let ok = if df == 11 {
                // DF11 parity may carry an interrogator code in the low 7 bits.
                remainder & 0xFFFF80 == 0
            } else {
                remainder == 0
            };

            if !ok {
                let max_flips = self.correction.max_flips();
                match crc::repair(&raw, max_flips) {
                    Some(fixed) if df != 11 && max_flips > 0 => {
                        raw = fixed;
                        corrected = true;
                    }
                    _ => return Err(FrameError::IntegrityCheckFailed(remainder)),
                }
            }

            ([raw[1], raw[2], raw[3]], AddressSource::Explicit)
        } else {
            (icao_from_u32(remainder), AddressSource::Parity)
        };

        Ok(ValidatedFrame {
            df,
            icao,
            address_source,
            raw,
            timestamp,
            received_at,
            source,
            msg_bits,
            corrected,
        })
    }
}

/// Validate with default settings (no error correction).
pub fn validate(frame: RawFrame) -> Result<ValidatedFrame, FrameError> {
    FrameValidator::default().validate(frame)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
