//! Decode validated Mode S frames into typed aircraft messages.
//!
//! Handles these Downlink Formats and ADS-B Type Codes:
//! - DF17/18 TC 1-4:   Aircraft identification (callsign, emitter category)
//! - DF17/18 TC 5-8:   Surface position (movement, ground track, CPR)
//! - DF17/18 TC 9-18:  Airborne position (barometric alt + CPR lat/lon)
//! - DF17/18 TC 19:    Airborne velocity (ground speed or airspeed + heading)
//! - DF17/18 TC 20-22: Airborne position (GNSS altitude)
//! - DF17/18 TC 29:    Target state and status (version 1 and 2)
//! - DF17/18 TC 31:    Aircraft operational status
//! - DF0/4/16/20:      Altitude replies
//! - DF5/21:           Identity replies (squawk)
//! - DF11:             All-call reply
//!
//! Every decoder is a pure function of the frame; CPR coordinates are left
//! as raw 17-bit integers for the aggregator to resolve.

use crate::frame::ValidatedFrame;
use crate::types::*;
use std::result::Result;

/// Extract ME bits `first..=last` (1-indexed, as numbered in the ADS-B
/// documents) from the 56-bit ME word.
fn field(me: u64, first: u32, last: u32) -> u32 {
    let width = last - first + 1;
    ((me >> (56 - last)) & ((1u64 << width) - 1)) as u32
}

fn flag(me: u64, bit: u32) -> bool {
    field(me, bit, bit) == 1
}

// ---------------------------------------------------------------------------
// Altitude decoding
// ---------------------------------------------------------------------------

/// Decode 12-bit altitude code from DF17 airborne position.
///
/// The Q-bit (bit 4) selects the encoding mode:
/// - Q=1: 25-ft resolution
/// - Q=0: 100-ft Gillham gray code
pub fn decode_altitude(alt_code: u32) -> Option<i32> {
    if alt_code == 0 {
        return None;
    }

    let q_bit = (alt_code >> 4) & 1;

    if q_bit == 1 {
        let n = ((alt_code >> 5) << 4) | (alt_code & 0x0F);
        Some(n as i32 * 25 - 1000)
    } else {
        // Re-insert the M bit position so the 13-bit Gillham layout applies.
        let code13 = ((alt_code & 0x0FC0) << 1) | (alt_code & 0x003F);
        decode_gillham_altitude(code13)
    }
}

/// Decode 100-ft Gillham gray code from a 13-bit AC field
/// (C1 A1 C2 A2 C4 A4 M B1 Q B2 D2 B4 D4).
fn decode_gillham_altitude(code: u32) -> Option<i32> {
    let bit = |n: u32| (code >> n) & 1;
    let (c1, a1, c2, a2, c4, a4) = (bit(12), bit(11), bit(10), bit(9), bit(8), bit(7));
    let (b1, b2, d2, b4, d4) = (bit(5), bit(3), bit(2), bit(1), bit(0));

    // 500-ft gray code: D2 D4 A1 A2 A4 B1 B2 B4
    let gray500 = (d2 << 7) | (d4 << 6) | (a1 << 5) | (a2 << 4) | (a4 << 3) | (b1 << 2) | (b2 << 1) | b4;
    let mut n500 = gray500;
    n500 ^= n500 >> 4;
    n500 ^= n500 >> 2;
    n500 ^= n500 >> 1;

    // 100-ft gray code: C1 C2 C4
    let gray100 = (c1 << 2) | (c2 << 1) | c4;
    let mut n100 = gray100;
    n100 ^= n100 >> 2;
    n100 ^= n100 >> 1;

    if n100 == 0 || n100 == 5 || n100 == 6 {
        return None;
    }
    if n100 == 7 {
        n100 = 5;
    }
    if n500 % 2 == 1 {
        n100 = 6 - n100;
    }

    let altitude = n500 as i32 * 500 + n100 as i32 * 100 - 1300;
    if !(-1200..=126750).contains(&altitude) {
        return None;
    }
    Some(altitude)
}

/// Decode 13-bit altitude code from DF0/4/16/20.
///
/// M-bit and Q-bit select the mode:
/// - M=0, Q=1: 25-ft increments
/// - M=0, Q=0: 100-ft Gillham gray code
/// - M=1: metric altitude (not decoded)
pub fn decode_altitude_13bit(alt_code_13: u32) -> Option<i32> {
    if alt_code_13 == 0 {
        return None;
    }

    let m_bit = (alt_code_13 >> 6) & 1;
    let q_bit = (alt_code_13 >> 4) & 1;

    if m_bit == 1 {
        return None;
    }

    if q_bit == 1 {
        let n =
            ((alt_code_13 & 0x1F80) >> 2) | ((alt_code_13 & 0x0020) >> 1) | (alt_code_13 & 0x000F);
        Some(n as i32 * 25 - 1000)
    } else {
        decode_gillham_altitude(alt_code_13)
    }
}

// ---------------------------------------------------------------------------
// Squawk decoding
// ---------------------------------------------------------------------------

/// Decode 13-bit identity code into 4-digit octal squawk.
///
/// Bits are labeled C1 A1 C2 A2 C4 A4 _ B1 D1 B2 D2 B4 D4
pub fn decode_squawk(id_code: u32) -> String {
    let bit = |n: u32| (id_code >> n) & 1;
    let a = bit(7) * 4 + bit(9) * 2 + bit(11);
    let b = bit(1) * 4 + bit(3) * 2 + bit(5);
    let c = bit(8) * 4 + bit(10) * 2 + bit(12);
    let d = bit(0) * 4 + bit(2) * 2 + bit(4);
    format!("{a}{b}{c}{d}")
}

/// Flight status (DF4/5/20/21) to on-ground flag.
fn flight_status_on_ground(fs: u8) -> Option<bool> {
    match fs {
        0 | 2 => Some(false),
        1 | 3 => Some(true),
        _ => None,
    }
}

/// Capability field (DF11/17) to on-ground flag.
fn capability_on_ground(ca: u8) -> Option<bool> {
    match ca {
        4 => Some(true),
        5 => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Extended squitter decoders
// ---------------------------------------------------------------------------

fn me_word(frame: &ValidatedFrame) -> Result<u64, DecodeError> {
    frame.me_bits().ok_or(DecodeError::Malformed("ME"))
}

/// Decode TC 1-4: Aircraft identification (callsign).
pub fn decode_identification(frame: &ValidatedFrame) -> Result<IdentificationMsg, DecodeError> {
    let me = me_word(frame)?;
    let tc = field(me, 1, 5) as u8;
    if !(1..=4).contains(&tc) {
        return Err(DecodeError::UnsupportedType {
            df: frame.df,
            type_code: Some(tc),
        });
    }

    let mut callsign = String::with_capacity(8);
    for i in 0..8 {
        let first = 9 + i * 6;
        let idx = field(me, first, first + 5) as usize;
        match CALLSIGN_CHARSET[idx] {
            b'#' => return Err(DecodeError::Malformed("callsign")),
            c => callsign.push(c as char),
        }
    }

    let set = match tc {
        4 => 'A',
        3 => 'B',
        2 => 'C',
        _ => 'D',
    };

    Ok(IdentificationMsg {
        icao: frame.icao,
        callsign,
        category: EmitterCategory {
            set,
            code: field(me, 6, 8) as u8,
        },
        timestamp: frame.timestamp,
    })
}

/// Decode TC 9-18 / 20-22: airborne position.
pub fn decode_airborne_position(frame: &ValidatedFrame) -> Result<AirbornePositionMsg, DecodeError> {
    let me = me_word(frame)?;
    let tc = field(me, 1, 5) as u8;
    let altitude_source = match tc {
        9..=18 => AltitudeSource::Barometric,
        20..=22 => AltitudeSource::Gnss,
        _ => {
            return Err(DecodeError::UnsupportedType {
                df: frame.df,
                type_code: Some(tc),
            })
        }
    };

    // GNSS height shares the AC12 coding of barometric altitude
    let altitude_ft = decode_altitude(field(me, 9, 20));

    Ok(AirbornePositionMsg {
        icao: frame.icao,
        altitude_ft,
        altitude_source,
        cpr_lat: field(me, 23, 39),
        cpr_lon: field(me, 40, 56),
        cpr_format: CprFormat::from_bit(flag(me, 22)),
        surveillance_status: SurveillanceStatus::from_bits(field(me, 6, 7) as u8),
        timestamp: frame.timestamp,
    })
}

/// Ground speed in knots from the 7-bit surface movement field.
pub fn decode_movement(movement: u32) -> Option<f64> {
    let m = movement as f64;
    match movement {
        1 => Some(0.0),
        2..=8 => Some(0.125 * (m - 1.0)),
        9..=12 => Some(1.0 + (m - 9.0) * 0.25),
        13..=38 => Some(2.0 + (m - 13.0) * 0.5),
        39..=93 => Some(15.0 + (m - 39.0)),
        94..=108 => Some(70.0 + (m - 94.0) * 2.0),
        109..=123 => Some(100.0 + (m - 109.0) * 5.0),
        124 => Some(175.0),
        _ => None,
    }
}

/// Decode TC 5-8: surface position.
pub fn decode_surface_position(frame: &ValidatedFrame) -> Result<SurfacePositionMsg, DecodeError> {
    let me = me_word(frame)?;
    let tc = field(me, 1, 5) as u8;
    if !(5..=8).contains(&tc) {
        return Err(DecodeError::UnsupportedType {
            df: frame.df,
            type_code: Some(tc),
        });
    }

    let track_deg = if flag(me, 13) {
        Some(round2(field(me, 14, 20) as f64 * 360.0 / 128.0))
    } else {
        None
    };

    Ok(SurfacePositionMsg {
        icao: frame.icao,
        cpr_lat: field(me, 23, 39),
        cpr_lon: field(me, 40, 56),
        cpr_format: CprFormat::from_bit(flag(me, 22)),
        ground_speed_kts: decode_movement(field(me, 6, 12)),
        track_deg,
        timestamp: frame.timestamp,
    })
}

/// Decode TC 19: airborne velocity, subtypes 1-4.
pub fn decode_velocity(frame: &ValidatedFrame) -> Result<VelocityMsg, DecodeError> {
    let me = me_word(frame)?;
    if field(me, 1, 5) != 19 {
        return Err(DecodeError::UnsupportedType {
            df: frame.df,
            type_code: Some(field(me, 1, 5) as u8),
        });
    }

    let subtype = field(me, 6, 8);
    let scale = match subtype {
        1 | 3 => 1.0,
        2 | 4 => 4.0,
        _ => return Err(DecodeError::Malformed("velocity subtype")),
    };

    let (speed_kts, heading_deg, speed_type) = if subtype <= 2 {
        let ew_vel = field(me, 15, 24) as i32 - 1;
        let ns_vel = field(me, 26, 35) as i32 - 1;
        if ew_vel >= 0 && ns_vel >= 0 {
            let vx = if flag(me, 14) { -ew_vel } else { ew_vel } as f64 * scale;
            let vy = if flag(me, 25) { -ns_vel } else { ns_vel } as f64 * scale;
            let spd = (vx * vx + vy * vy).sqrt();
            let hdg = vx.atan2(vy).to_degrees().rem_euclid(360.0);
            (Some(round2(spd)), Some(round2(hdg)), SpeedType::Ground)
        } else {
            (None, None, SpeedType::Ground)
        }
    } else {
        let heading = flag(me, 14).then(|| round2(field(me, 15, 24) as f64 * 360.0 / 1024.0));
        let raw_speed = field(me, 26, 35);
        let speed = (raw_speed > 0).then(|| (raw_speed - 1) as f64 * scale);
        let speed_type = if flag(me, 25) {
            SpeedType::TAS
        } else {
            SpeedType::IAS
        };
        (speed, heading, speed_type)
    };

    let vr_raw = field(me, 38, 46);
    let vertical_rate_fpm = (vr_raw > 0).then(|| {
        let rate = (vr_raw as i32 - 1) * 64;
        if flag(me, 37) {
            -rate
        } else {
            rate
        }
    });

    let diff_raw = field(me, 50, 56);
    let geo_minus_baro_ft = (diff_raw > 0).then(|| {
        let diff = (diff_raw as i32 - 1) * 25;
        if flag(me, 49) {
            -diff
        } else {
            diff
        }
    });

    Ok(VelocityMsg {
        icao: frame.icao,
        speed_kts,
        heading_deg,
        vertical_rate_fpm,
        vertical_rate_source: if flag(me, 36) {
            AltitudeSource::Barometric
        } else {
            AltitudeSource::Gnss
        },
        speed_type,
        geo_minus_baro_ft,
        timestamp: frame.timestamp,
    })
}

/// Decode TC 29: target state and status, dispatching on the version subtype.
pub fn decode_target_state(frame: &ValidatedFrame) -> Result<TargetStateMsg, DecodeError> {
    let me = me_word(frame)?;
    if field(me, 1, 5) != 29 {
        return Err(DecodeError::UnsupportedType {
            df: frame.df,
            type_code: Some(field(me, 1, 5) as u8),
        });
    }

    let state = match field(me, 6, 7) {
        0 => TargetState::Version1(decode_target_state_v1(me)),
        1 => TargetState::Version2(decode_target_state_v2(me)),
        _ => return Err(DecodeError::Malformed("target state subtype")),
    };

    Ok(TargetStateMsg {
        icao: frame.icao,
        state,
        timestamp: frame.timestamp,
    })
}

fn decode_target_state_v1(me: u64) -> TargetStateV1 {
    let vertical_source = TargetSource::from_bits(field(me, 8, 9) as u8);
    let alt_raw = field(me, 16, 25);
    let target_altitude_ft = (vertical_source != TargetSource::Unavailable && alt_raw <= 1010)
        .then(|| alt_raw as i32 * 100 - 1000);

    let horizontal_source = TargetSource::from_bits(field(me, 26, 27) as u8);
    let hdg_raw = field(me, 28, 36);
    let target_heading_deg =
        (horizontal_source != TargetSource::Unavailable && hdg_raw < 360).then_some(hdg_raw as f64);

    TargetStateV1 {
        vertical_source,
        altitude_is_msl: flag(me, 10),
        target_altitude_ft,
        vertical_mode: TargetMode::from_bits(field(me, 14, 15) as u8),
        horizontal_source,
        target_heading_deg,
        heading_is_track: flag(me, 37),
        horizontal_mode: TargetMode::from_bits(field(me, 38, 39) as u8),
        nac_p: field(me, 40, 43) as u8,
        nic_baro: flag(me, 44),
        sil: field(me, 45, 46) as u8,
        tcas_ra_capable: field(me, 52, 53) as u8,
        emergency_state: field(me, 54, 56) as u8,
    }
}

fn decode_target_state_v2(me: u64) -> TargetStateV2 {
    let alt_raw = field(me, 10, 20);
    let baro_raw = field(me, 21, 29);
    let selected_heading_deg = flag(me, 30)
        .then(|| round2(field(me, 31, 39) as f64 * 180.0 / 256.0));

    let modes = flag(me, 47).then(|| AutopilotModes {
        autopilot: flag(me, 48),
        vnav: flag(me, 49),
        altitude_hold: flag(me, 50),
        approach: flag(me, 52),
        lnav: flag(me, 54),
    });

    TargetStateV2 {
        selected_altitude_ft: (alt_raw > 0).then(|| (alt_raw as i32 - 1) * 32),
        selected_altitude_fms: flag(me, 9),
        baro_setting_mb: (baro_raw > 0).then(|| round2(800.0 + (baro_raw - 1) as f64 * 0.8)),
        selected_heading_deg,
        nac_p: field(me, 40, 43) as u8,
        nic_baro: flag(me, 44),
        sil: field(me, 45, 46) as u8,
        modes,
        tcas_operational: flag(me, 53),
    }
}

/// Decode TC 31: aircraft operational status (airborne or surface).
pub fn decode_operational_status(
    frame: &ValidatedFrame,
) -> Result<OperationalStatusMsg, DecodeError> {
    let me = me_word(frame)?;
    if field(me, 1, 5) != 31 {
        return Err(DecodeError::UnsupportedType {
            df: frame.df,
            type_code: Some(field(me, 1, 5) as u8),
        });
    }

    let surface = match field(me, 6, 8) {
        0 => false,
        1 => true,
        _ => return Err(DecodeError::Malformed("operational status subtype")),
    };

    let status = OperationalStatus {
        surface,
        version: field(me, 41, 43) as u8,
        capability_class: field(me, 9, 24) as u16,
        operational_mode: field(me, 25, 40) as u16,
        acas_operational: !surface && flag(me, 11),
        tcas_ra_active: !surface && flag(me, 27),
        ident_active: flag(me, 28),
        nac_p: field(me, 45, 48) as u8,
        sil: field(me, 51, 52) as u8,
        baro_or_heading_flag: flag(me, 53),
    };

    Ok(OperationalStatusMsg {
        icao: frame.icao,
        status,
        timestamp: frame.timestamp,
    })
}

// ---------------------------------------------------------------------------
// Short / Comm-B replies
// ---------------------------------------------------------------------------

/// Decode DF0/4/16/20: altitude from surveillance replies.
pub fn decode_df_altitude(frame: &ValidatedFrame) -> Result<AltitudeMsg, DecodeError> {
    if frame.raw.len() < 4 {
        return Err(DecodeError::Malformed("AC"));
    }

    let alt_code = ((frame.raw[2] as u32 & 0x1F) << 8) | frame.raw[3] as u32;
    let on_ground = match frame.df {
        // VS bit: 1 = on ground
        0 | 16 => Some(frame.raw[0] & 0x04 != 0),
        _ => flight_status_on_ground(frame.raw[0] & 0x07),
    };

    Ok(AltitudeMsg {
        icao: frame.icao,
        altitude_ft: decode_altitude_13bit(alt_code),
        on_ground,
        timestamp: frame.timestamp,
    })
}

/// Decode DF5/21: identity (squawk) from surveillance replies.
pub fn decode_df_squawk(frame: &ValidatedFrame) -> Result<SquawkMsg, DecodeError> {
    if frame.raw.len() < 4 {
        return Err(DecodeError::Malformed("ID"));
    }

    let id_code = ((frame.raw[2] as u32 & 0x1F) << 8) | frame.raw[3] as u32;

    Ok(SquawkMsg {
        icao: frame.icao,
        squawk: decode_squawk(id_code),
        on_ground: flight_status_on_ground(frame.raw[0] & 0x07),
        timestamp: frame.timestamp,
    })
}

/// Decode DF11: all-call reply.
pub fn decode_all_call(frame: &ValidatedFrame) -> Result<AllCallMsg, DecodeError> {
    let capability = frame.raw.first().ok_or(DecodeError::Malformed("CA"))? & 0x07;
    Ok(AllCallMsg {
        icao: frame.icao,
        capability,
        on_ground: capability_on_ground(capability),
        timestamp: frame.timestamp,
    })
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Decode a validated frame into the appropriate typed message.
///
/// Routes on DF first, then on the ES type code.
pub fn decode(frame: &ValidatedFrame) -> Result<DecodedMsg, DecodeError> {
    match frame.df {
        17 | 18 => {
            // DF18 control field: 0 = ES/NT with ICAO address, 1 = non-ICAO
            // address, 6 = ADS-R. Other CF values are TIS-B payloads.
            let cf = frame.raw.first().ok_or(DecodeError::Malformed("CF"))? & 0x07;
            if frame.df == 18 && !matches!(cf, 0 | 1 | 6) {
                return Err(DecodeError::UnsupportedType {
                    df: 18,
                    type_code: frame.type_code(),
                });
            }
            let tc = frame.type_code().ok_or(DecodeError::Malformed("ME"))?;
            match tc {
                1..=4 => decode_identification(frame).map(DecodedMsg::Identification),
                5..=8 => decode_surface_position(frame).map(DecodedMsg::SurfacePosition),
                9..=18 | 20..=22 => {
                    decode_airborne_position(frame).map(DecodedMsg::AirbornePosition)
                }
                19 => decode_velocity(frame).map(DecodedMsg::Velocity),
                29 => decode_target_state(frame).map(DecodedMsg::TargetState),
                31 => decode_operational_status(frame).map(DecodedMsg::OperationalStatus),
                _ => Err(DecodeError::UnsupportedType {
                    df: frame.df,
                    type_code: Some(tc),
                }),
            }
        }
        0 | 4 | 16 | 20 => decode_df_altitude(frame).map(DecodedMsg::Altitude),
        5 | 21 => decode_df_squawk(frame).map(DecodedMsg::Squawk),
        11 => decode_all_call(frame).map(DecodedMsg::AllCall),
        df => Err(DecodeError::UnsupportedType {
            df,
            type_code: None,
        }),
    }
}

/// Round to 2 decimal places.
fn round2(val: f64) -> f64 {
    (val * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{validate, RawFrame};

    fn parse(hex: &str) -> ValidatedFrame {
        let raw = RawFrame::from_hex(hex, 1.0, SourceId(0)).expect("hex");
        validate(raw).expect("valid frame")
    }

    fn decode_hex(hex: &str) -> DecodedMsg {
        decode(&parse(hex)).expect("decodable")
    }

    // -- Identification --

    #[test]
    fn test_decode_identification_klm() {
        let msg = decode_identification(&parse("8D4840D6202CC371C32CE0576098")).unwrap();
        assert_eq!(msg.callsign, "KLM1023 ");
        assert_eq!(icao_to_string(&msg.icao), "4840D6");
        assert_eq!(msg.category.to_string(), "A0");
    }

    #[test]
    fn test_decode_identification_ezy() {
        let msg = decode_identification(&parse("8D406B902015A678D4D220AA4BDA")).unwrap();
        assert_eq!(msg.callsign, "EZY85MH ");
        assert_eq!(icao_to_string(&msg.icao), "406B90");
    }

    // -- Airborne position --

    #[test]
    fn test_decode_position_even() {
        let msg = decode_airborne_position(&parse("8D40621D58C382D690C8AC2863A7")).unwrap();
        assert_eq!(msg.altitude_ft, Some(38000));
        assert_eq!(msg.altitude_source, AltitudeSource::Barometric);
        assert_eq!(msg.cpr_format, CprFormat::Even);
        assert_eq!(msg.cpr_lat, 93000);
        assert_eq!(msg.cpr_lon, 51372);
        assert_eq!(msg.surveillance_status, SurveillanceStatus::NoCondition);
    }

    #[test]
    fn test_decode_position_odd() {
        let msg = decode_airborne_position(&parse("8DABCDEF58C386435CC41205C6D6")).unwrap();
        assert_eq!(msg.icao, [0xAB, 0xCD, 0xEF]);
        assert_eq!(msg.altitude_ft, Some(38000));
        assert_eq!(msg.cpr_format, CprFormat::Odd);
        assert_eq!(msg.cpr_lat, 74158);
        assert_eq!(msg.cpr_lon, 50194);
    }

    #[test]
    fn test_decode_position_gnss_altitude() {
        // TC 20 with the same AC12 field as the barometric reference frame
        let msg = decode_airborne_position(&parse("8D40621DA0C382D690C8AC5C84CA")).unwrap();
        assert_eq!(msg.altitude_source, AltitudeSource::Gnss);
        assert_eq!(msg.altitude_ft, Some(38000));
        assert_eq!(msg.cpr_lat, 93000);
        assert!(matches!(
            decode_hex("8D40621DA0C382D690C8AC5C84CA"),
            DecodedMsg::AirbornePosition(_)
        ));
    }

    // -- Surface position --

    #[test]
    fn test_decode_surface_position() {
        let msg = decode_surface_position(&parse("8C4841753AAB238733C8CD4020B1")).unwrap();
        assert_eq!(icao_to_string(&msg.icao), "484175");
        assert_eq!(msg.cpr_format, CprFormat::Even);
        assert_eq!(msg.cpr_lat, 115609);
        assert_eq!(msg.cpr_lon, 116941);
        // movement code 42 -> 15 + 3 kt
        assert_eq!(msg.ground_speed_kts, Some(18.0));
        assert_eq!(msg.track_deg, Some(140.63));
    }

    #[test]
    fn test_decode_movement_table() {
        assert_eq!(decode_movement(0), None);
        assert_eq!(decode_movement(1), Some(0.0));
        assert_eq!(decode_movement(2), Some(0.125));
        assert_eq!(decode_movement(9), Some(1.0));
        assert_eq!(decode_movement(13), Some(2.0));
        assert_eq!(decode_movement(39), Some(15.0));
        assert_eq!(decode_movement(94), Some(70.0));
        assert_eq!(decode_movement(109), Some(100.0));
        assert_eq!(decode_movement(124), Some(175.0));
        assert_eq!(decode_movement(125), None);
    }

    // -- Velocity --

    #[test]
    fn test_decode_velocity_ground() {
        let msg = decode_velocity(&parse("8D485020994409940838175B284F")).unwrap();
        let speed = msg.speed_kts.unwrap();
        assert!((speed - 159.0).abs() < 1.0, "speed ~159, got {speed}");
        let heading = msg.heading_deg.unwrap();
        assert!((heading - 182.88).abs() < 0.1, "heading ~182.88, got {heading}");
        assert_eq!(msg.vertical_rate_fpm, Some(-832));
        assert_eq!(msg.speed_type, SpeedType::Ground);
        assert_eq!(msg.vertical_rate_source, AltitudeSource::Gnss);
        assert_eq!(msg.geo_minus_baro_ft, Some(550));
    }

    #[test]
    fn test_decode_velocity_airspeed() {
        let msg = decode_velocity(&parse("8DA05F219B06B6AF189400CBC33F")).unwrap();
        assert_eq!(msg.speed_type, SpeedType::TAS);
        assert_eq!(msg.speed_kts, Some(375.0));
        assert_eq!(msg.heading_deg, Some(243.98));
        assert_eq!(msg.vertical_rate_fpm, Some(-2304));
        assert_eq!(msg.vertical_rate_source, AltitudeSource::Barometric);
    }

    // -- Target state --

    #[test]
    fn test_decode_target_state_v2() {
        let msg = decode_target_state(&parse("8DA05629EA21485CBF3F8CADAEEB")).unwrap();
        let TargetState::Version2(v2) = msg.state else {
            panic!("expected version 2 payload");
        };
        assert_eq!(v2.selected_altitude_ft, Some(16992));
        assert!(!v2.selected_altitude_fms);
        assert_eq!(v2.baro_setting_mb, Some(1012.8));
        assert_eq!(v2.selected_heading_deg, Some(66.8));
        assert_eq!(v2.nac_p, 9);
        assert!(v2.nic_baro);
        assert_eq!(v2.sil, 3);
        let modes = v2.modes.unwrap();
        assert!(modes.autopilot && modes.vnav && modes.lnav);
        assert!(!modes.altitude_hold && !modes.approach);
        assert!(v2.tcas_operational);
    }

    #[test]
    fn test_decode_target_state_v1() {
        let msg = decode_target_state(&parse("8DABCDEFE8944130E53808ACB48C")).unwrap();
        let TargetState::Version1(v1) = &msg.state else {
            panic!("expected version 1 payload");
        };
        assert_eq!(v1.vertical_source, TargetSource::Autopilot);
        assert!(!v1.altitude_is_msl);
        assert_eq!(v1.target_altitude_ft, Some(12000));
        assert_eq!(v1.vertical_mode, TargetMode::Maintaining);
        assert_eq!(v1.horizontal_source, TargetSource::Autopilot);
        assert_eq!(v1.target_heading_deg, Some(270.0));
        assert!(!v1.heading_is_track);
        assert_eq!(v1.horizontal_mode, TargetMode::Maintaining);
        assert_eq!(v1.nac_p, 9);
        assert_eq!(v1.sil, 2);
        assert_eq!(msg.state.altitude_ft(), Some(12000));
        assert_eq!(msg.state.heading_deg(), Some(270.0));
    }

    // -- Operational status --

    #[test]
    fn test_decode_operational_status() {
        let msg = decode_operational_status(&parse("8DABCDEFF8334002004AB8A68A50")).unwrap();
        let s = &msg.status;
        assert!(!s.surface);
        assert_eq!(s.version, 2);
        assert_eq!(s.capability_class, 0x3340);
        assert_eq!(s.operational_mode, 0x0200);
        assert!(s.acas_operational);
        assert!(!s.tcas_ra_active);
        assert!(!s.ident_active);
        assert_eq!(s.nac_p, 10);
        assert_eq!(s.sil, 3);
        assert!(s.baro_or_heading_flag);
    }

    // -- Altitude --

    #[test]
    fn test_decode_altitude_25ft_exact_value() {
        // n = ((0xC38 >> 5) << 4) | 0x8 = 1560 -> 1560 * 25 - 1000
        assert_eq!(decode_altitude(0xC38), Some(38000));
        assert_eq!(decode_altitude(0), None);
        assert_eq!(decode_altitude_13bit(0), None);
    }

    #[test]
    fn test_decode_gillham_known_values() {
        // C1 only
        assert_eq!(decode_altitude_13bit(0x1000), Some(-800));
        // C1 + A1
        assert_eq!(decode_altitude_13bit(0x1800), Some(30300));
    }

    #[test]
    fn test_decode_gillham_invalid_c_zero() {
        // only B1 set: C bits all zero is an illegal Gillham code
        assert!(decode_altitude_13bit(0b_0_0_0_0_0_0_0_1_0_0_0_0_0).is_none());
    }

    #[test]
    fn test_decode_gillham_range() {
        let mut valid_count = 0;
        for code in 0..0x2000u32 {
            if (code >> 4) & 1 == 1 || (code >> 6) & 1 == 1 {
                continue;
            }
            if let Some(alt) = decode_altitude_13bit(code) {
                assert!(
                    (-1200..=126750).contains(&alt),
                    "Gillham code 0x{code:04X} gave altitude {alt} out of range"
                );
                valid_count += 1;
            }
        }
        assert!(valid_count > 0);
    }

    #[test]
    fn test_decode_df4_altitude() {
        let DecodedMsg::Altitude(msg) = decode_hex("20001838BA4EB4") else {
            panic!("expected altitude reply");
        };
        assert_eq!(msg.icao, [0xAB, 0xCD, 0xEF]);
        assert_eq!(msg.altitude_ft, Some(38000));
        assert_eq!(msg.on_ground, Some(false));
    }

    // -- Squawk --

    #[test]
    fn test_decode_squawk_codes() {
        assert_eq!(decode_squawk(0b0_1_0_1_0_1_0_1_0_0_0_1_0), "7500");
        assert_eq!(decode_squawk(0b0_1_0_1_0_1_0_0_0_1_0_1_0), "7600");
        assert_eq!(decode_squawk(0b0_1_0_1_0_1_0_1_0_1_0_1_0), "7700");
    }

    #[test]
    fn test_decode_df5_squawk() {
        let DecodedMsg::Squawk(msg) = decode_hex("28000AAAE16926") else {
            panic!("expected identity reply");
        };
        assert_eq!(msg.icao, [0xAB, 0xCD, 0xEF]);
        assert_eq!(msg.squawk, "7700");
    }

    // -- Routing --

    #[test]
    fn test_decode_routes() {
        assert!(matches!(
            decode_hex("8D4840D6202CC371C32CE0576098"),
            DecodedMsg::Identification(_)
        ));
        assert!(matches!(
            decode_hex("8D40621D58C382D690C8AC2863A7"),
            DecodedMsg::AirbornePosition(_)
        ));
        assert!(matches!(
            decode_hex("8C4841753AAB238733C8CD4020B1"),
            DecodedMsg::SurfacePosition(_)
        ));
        assert!(matches!(
            decode_hex("8D485020994409940838175B284F"),
            DecodedMsg::Velocity(_)
        ));
        assert!(matches!(
            decode_hex("8DABCDEFEA21485CBF3F8CC9D2D8"),
            DecodedMsg::TargetState(_)
        ));
        assert!(matches!(
            decode_hex("8DABCDEFF8334002004AB8A68A50"),
            DecodedMsg::OperationalStatus(_)
        ));
        assert!(matches!(decode_hex("5DABCDEF8A6AB3"), DecodedMsg::AllCall(_)));
    }

    #[test]
    fn test_decode_all_call_capability() {
        let DecodedMsg::AllCall(msg) = decode_hex("5DABCDEF8A6AB3") else {
            panic!("expected all-call");
        };
        assert_eq!(msg.capability, 5);
        assert_eq!(msg.on_ground, Some(false));
    }

    #[test]
    fn test_unsupported_type_codes() {
        // TC 28 aircraft status
        let err = decode(&parse("8DABCDEFE1000000000000CBD86F")).unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnsupportedType {
                df: 17,
                type_code: Some(28)
            }
        );
        // TC 0: no position information
        let err = decode(&parse("8DABCDEF00000000000000B8A543")).unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnsupportedType {
                df: 17,
                type_code: Some(0)
            }
        );
    }

    fn truncated(df: u8) -> ValidatedFrame {
        let mut frame = parse("8D4840D6202CC371C32CE0576098");
        frame.df = df;
        frame.raw.clear();
        frame
    }

    #[test]
    fn test_truncated_frames_rejected() {
        for df in [0, 5, 11, 17, 18] {
            assert!(
                matches!(decode(&truncated(df)), Err(DecodeError::Malformed(_))),
                "DF{df}"
            );
        }
        let err: Result<AllCallMsg, DecodeError> = decode_all_call(&truncated(11));
        assert_eq!(err.unwrap_err(), DecodeError::Malformed("CA"));
    }
}
