//! Feed line parsing.
//!
//! Accepted line formats:
//! - bare hex: `8D4840D6202CC371C32CE0576098`
//! - AVR: `*8D4840D6202CC371C32CE0576098;`
//! - AVR with MLAT counter: `@0000A1B2C3D48D4840D6202CC371C32CE0576098;`
//!
//! Blank lines and `#` comments are skipped silently; anything else that is
//! not a 56/112-bit frame is counted as skipped by the caller.

use std::time::{SystemTime, UNIX_EPOCH};

use adsb_engine::hex_decode;

/// MLAT counter frequency of AVR receivers.
const MLAT_TICKS_PER_SEC: f64 = 12_000_000.0;
/// Width of the MLAT counter in hex digits.
const MLAT_DIGITS: usize = 12;

/// Result of reading one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedLine {
    Frame {
        bytes: Vec<u8>,
        mlat_ticks: Option<u64>,
    },
    /// Blank or comment.
    Empty,
    /// Not a frame.
    Garbage,
}

pub fn parse_line(line: &str) -> FeedLine {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return FeedLine::Empty;
    }

    if let Some(body) = line.strip_prefix('@').and_then(|l| l.strip_suffix(';')) {
        if body.len() <= MLAT_DIGITS || !body.is_char_boundary(MLAT_DIGITS) {
            return FeedLine::Garbage;
        }
        let (ticks, hex) = body.split_at(MLAT_DIGITS);
        return match (u64::from_str_radix(ticks, 16), frame_bytes(hex)) {
            (Ok(ticks), Some(bytes)) => FeedLine::Frame {
                bytes,
                mlat_ticks: Some(ticks),
            },
            _ => FeedLine::Garbage,
        };
    }

    let hex = line
        .strip_prefix('*')
        .and_then(|l| l.strip_suffix(';'))
        .unwrap_or(line);
    match frame_bytes(hex) {
        Some(bytes) => FeedLine::Frame {
            bytes,
            mlat_ticks: None,
        },
        None => FeedLine::Garbage,
    }
}

fn frame_bytes(hex: &str) -> Option<Vec<u8>> {
    if hex.len() != 14 && hex.len() != 28 {
        return None;
    }
    hex_decode(hex)
}

/// Wall clock as Unix seconds.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Turns MLAT counters into wall-clock seconds, anchored at the wall time
/// of the first counter seen on the feed.
#[derive(Debug, Default)]
pub struct MlatClock {
    anchor: Option<(u64, f64)>,
}

impl MlatClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timestamp(&mut self, ticks: u64, wall: f64) -> f64 {
        let (first, base) = *self.anchor.get_or_insert((ticks, wall));
        base + (ticks as f64 - first as f64) / MLAT_TICKS_PER_SEC
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: &str = "8D4840D6202CC371C32CE0576098";

    fn bytes() -> Vec<u8> {
        hex_decode(FRAME).unwrap()
    }

    #[test]
    fn test_parse_bare_hex() {
        assert_eq!(
            parse_line(FRAME),
            FeedLine::Frame {
                bytes: bytes(),
                mlat_ticks: None
            }
        );
        assert_eq!(
            parse_line("  8d4840d6202cc371c32ce0576098 "),
            FeedLine::Frame {
                bytes: bytes(),
                mlat_ticks: None
            }
        );
    }

    #[test]
    fn test_parse_avr() {
        assert_eq!(
            parse_line("*8D4840D6202CC371C32CE0576098;"),
            FeedLine::Frame {
                bytes: bytes(),
                mlat_ticks: None
            }
        );
        assert_eq!(
            parse_line("*5D4840D6DEADBE;"),
            FeedLine::Frame {
                bytes: vec![0x5D, 0x48, 0x40, 0xD6, 0xDE, 0xAD, 0xBE],
                mlat_ticks: None
            }
        );
    }

    #[test]
    fn test_parse_avr_mlat() {
        assert_eq!(
            parse_line("@00000000002A8D4840D6202CC371C32CE0576098;"),
            FeedLine::Frame {
                bytes: bytes(),
                mlat_ticks: Some(42)
            }
        );
    }

    #[test]
    fn test_parse_skips() {
        assert_eq!(parse_line(""), FeedLine::Empty);
        assert_eq!(parse_line("   "), FeedLine::Empty);
        assert_eq!(parse_line("# recorded at EHAM"), FeedLine::Empty);
        assert_eq!(parse_line("hello"), FeedLine::Garbage);
        assert_eq!(parse_line("*8D4840D6;"), FeedLine::Garbage);
        assert_eq!(parse_line("8D4840D6202CC371C32CE057609Z"), FeedLine::Garbage);
        assert_eq!(parse_line("@0000;"), FeedLine::Garbage);
        assert_eq!(parse_line("@ZZZZZZZZZZZZ8D4840D6202CC371C32CE0576098;"), FeedLine::Garbage);
    }

    #[test]
    fn test_mlat_clock() {
        let mut clock = MlatClock::new();
        assert_eq!(clock.timestamp(12_000_000, 1000.0), 1000.0);
        // Later wall times do not move the anchor
        assert_eq!(clock.timestamp(18_000_000, 1200.0), 1000.5);
        assert_eq!(clock.timestamp(6_000_000, 1300.0), 999.5);
    }
}
