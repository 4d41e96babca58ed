//! Mode S parity: CRC-24 with generator 0xFFF409.
//!
//! Extended squitter and all-call replies carry the bare CRC in their last
//! 24 bits, so an intact frame has a zero syndrome. Surveillance replies
//! overlay the CRC with the aircraft address, which makes the syndrome of
//! an intact frame equal to that address.

use std::collections::HashMap;
use std::sync::LazyLock;

const GENERATOR: u32 = 0xFFF409;
const MASK: u32 = 0xFF_FFFF;
/// Bits 1-5 hold the downlink format and are never repaired.
const DF_BITS: usize = 5;
const LONG_BITS: usize = 112;

/// Remainder of each leading byte, shifted through eight generator steps.
static REMAINDERS: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut byte = 0;
    while byte < 256 {
        let mut rem = (byte as u32) << 16;
        let mut step = 0;
        while step < 8 {
            let carry = rem & 0x80_0000 != 0;
            rem = (rem << 1) & MASK;
            if carry {
                rem ^= GENERATOR;
            }
            step += 1;
        }
        table[byte] = rem;
        byte += 1;
    }
    table
};

fn checksum(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0, |rem, &b| {
        let lead = ((rem >> 16) as u8 ^ b) as usize;
        ((rem << 8) & MASK) ^ REMAINDERS[lead]
    })
}

fn split(frame: &[u8]) -> Option<(&[u8], u32)> {
    let cut = frame.len().checked_sub(3)?;
    let (payload, parity) = frame.split_at(cut);
    let parity = parity.iter().fold(0, |acc, &b| (acc << 8) | b as u32);
    Some((payload, parity))
}

/// CRC of the payload XOR'd with the transmitted parity field.
pub fn syndrome(frame: &[u8]) -> u32 {
    match split(frame) {
        Some((payload, parity)) => checksum(payload) ^ parity,
        None => frame.iter().fold(0, |acc, &b| (acc << 8) | b as u32) & MASK,
    }
}

/// Parity a transmitter would append to this frame's payload. The last
/// three bytes of `frame` are ignored.
pub fn payload_parity(frame: &[u8]) -> u32 {
    split(frame).map_or(0, |(payload, _)| checksum(payload))
}

// ---------------------------------------------------------------------------
// Repair
// ---------------------------------------------------------------------------

/// Bit positions (0 = first transmitted bit) that explain a syndrome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flips {
    One(u8),
    Two(u8, u8),
}

impl Flips {
    fn count(self) -> usize {
        match self {
            Flips::One(_) => 1,
            Flips::Two(..) => 2,
        }
    }

    fn apply(self, frame: &mut [u8]) {
        let mut flip = |bit: u8| {
            let bit = bit as usize;
            frame[bit / 8] ^= 0x80 >> (bit % 8);
        };
        match self {
            Flips::One(a) => flip(a),
            Flips::Two(a, b) => {
                flip(a);
                flip(b);
            }
        }
    }
}

/// Syndrome of every 1- and 2-bit error pattern in a long frame, skipping
/// patterns that touch the DF bits. The CRC is linear, so the syndrome of a
/// damaged frame equals the syndrome of its error pattern alone.
static LONG_REPAIRS: LazyLock<HashMap<u32, Flips>> = LazyLock::new(|| {
    let pattern_syndrome = |bits: &[usize]| {
        let mut frame = [0u8; LONG_BITS / 8];
        for &bit in bits {
            frame[bit / 8] ^= 0x80 >> (bit % 8);
        }
        syndrome(&frame)
    };

    let mut table = HashMap::new();
    for a in DF_BITS..LONG_BITS {
        table
            .entry(pattern_syndrome(&[a]))
            .or_insert(Flips::One(a as u8));
    }
    for a in DF_BITS..LONG_BITS {
        for b in a + 1..LONG_BITS {
            table
                .entry(pattern_syndrome(&[a, b]))
                .or_insert(Flips::Two(a as u8, b as u8));
        }
    }
    table
});

/// Repair up to `max_flips` bit errors in a 112-bit frame.
///
/// Returns the repaired bytes, or `None` when the frame is intact, short,
/// or damaged beyond what `max_flips` allows.
pub fn repair(frame: &[u8], max_flips: usize) -> Option<Vec<u8>> {
    if frame.len() * 8 != LONG_BITS {
        return None;
    }
    let s = syndrome(frame);
    if s == 0 {
        return None;
    }

    let flips = *LONG_REPAIRS.get(&s)?;
    if flips.count() > max_flips {
        return None;
    }

    let mut fixed = frame.to_vec();
    flips.apply(&mut fixed);
    (syndrome(&fixed) == 0).then_some(fixed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::hex_decode;

    const INTACT: &[&str] = &[
        "8D4840D6202CC371C32CE0576098",
        "8D40621D58C382D690C8AC2863A7",
        "8D485020994409940838175B284F",
        "8DABCDEF58C382D690C8AC448FA7",
    ];

    #[test]
    fn test_remainder_table() {
        assert_eq!(REMAINDERS[0], 0);
        // Lowest bit reaches the top on the last step
        assert_eq!(REMAINDERS[1], GENERATOR);
    }

    #[test]
    fn test_intact_extended_squitter() {
        for hex in INTACT {
            let frame = hex_decode(hex).unwrap();
            assert_eq!(syndrome(&frame), 0, "{hex}");
            let parity = payload_parity(&frame);
            assert_eq!(&parity.to_be_bytes()[1..], &frame[11..], "{hex}");
        }
    }

    #[test]
    fn test_syndrome_is_overlaid_address() {
        // DF5 identity reply from 0xABCDEF, squawk 7700
        let frame = hex_decode("28000AAAE16926").unwrap();
        assert_eq!(syndrome(&frame), 0xABCDEF);
    }

    #[test]
    fn test_every_single_bit_flip_detected() {
        for hex in INTACT {
            let frame = hex_decode(hex).unwrap();
            for bit in 0..frame.len() * 8 {
                let mut bad = frame.clone();
                bad[bit / 8] ^= 0x80 >> (bit % 8);
                assert_ne!(syndrome(&bad), 0, "flip of bit {bit} in {hex} not detected");
            }
        }
    }

    #[test]
    fn test_repair_intact_is_noop() {
        let frame = hex_decode(INTACT[0]).unwrap();
        assert!(repair(&frame, 2).is_none());
    }

    #[test]
    fn test_repair_single_flip() {
        let frame = hex_decode(INTACT[0]).unwrap();
        let mut bad = frame.clone();
        bad[5] ^= 0x01;
        assert_eq!(repair(&bad, 1), Some(frame));
    }

    #[test]
    fn test_repair_limited_by_max_flips() {
        let frame = hex_decode(INTACT[1]).unwrap();
        let mut bad = frame.clone();
        bad[6] ^= 0x10;
        bad[9] ^= 0x02;
        assert!(repair(&bad, 1).is_none());
        assert_eq!(repair(&bad, 2), Some(frame));
    }

    #[test]
    fn test_repair_never_touches_df() {
        let mut frame = hex_decode(INTACT[0]).unwrap();
        frame[0] ^= 0x80;
        assert_ne!(repair(&frame, 2).map(|f| f[0] >> 3), Some(17));
    }

    #[test]
    fn test_short_frames_not_repaired() {
        let mut frame = hex_decode("5D4840D6DEADBE").unwrap();
        frame[4] ^= 0x01;
        assert!(repair(&frame, 2).is_none());
    }
}
