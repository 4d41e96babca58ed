//! Compact Position Reporting: resolve CPR samples into latitude/longitude.
//!
//! Two decode modes:
//! - Global: requires an even+odd sample pair within the pairing window.
//! - Local: single sample + reference position within range.
//!
//! Key constants:
//! - NZ = 15 (latitude zones per hemisphere for even frames)
//! - Nb = 17 (bits per coordinate)
//! - Airborne: Dlat_even = 360 / 60 = 6.0 degrees, Dlat_odd = 360 / 59
//! - Surface:  the same zones over a 90 degree span (1.5 / ~1.525 degrees)
//!
//! Surface encodings are ambiguous by multiples of 90 degrees, so a global
//! surface decode also needs a reference to pick the right quadrant.

use serde::{Deserialize, Serialize};

use crate::config::CprConfig;
use crate::types::{CprError, CprFormat};

/// Number of latitude zones per hemisphere.
const NZ: f64 = 15.0;

/// Bits per CPR coordinate.
const NB: u32 = 17;

/// Maximum CPR value (2^17 = 131072).
const CPR_MAX: f64 = (1u32 << NB) as f64;

const EARTH_RADIUS_NM: f64 = 3440.065;

/// Absolute position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Coordinates { lat, lon }
    }

    pub fn distance_nm(&self, other: &Coordinates) -> f64 {
        haversine_nm(self.lat, self.lon, other.lat, other.lon)
    }
}

/// One CPR-encoded position report, as cached per aircraft until resolved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CprSample {
    pub format: CprFormat,
    pub lat: u32,
    pub lon: u32,
    pub timestamp: f64,
    pub surface: bool,
}

impl CprSample {
    fn span(&self) -> f64 {
        if self.surface {
            90.0
        } else {
            360.0
        }
    }
}

/// Number of longitude zones at a given latitude (NL function).
///
/// Ranges from 1 near poles to 59 at equator.
pub fn nl(lat: f64) -> i32 {
    if lat.abs() >= 87.0 {
        return 1;
    }

    let a = 1.0 - (std::f64::consts::PI / (2.0 * NZ)).cos();
    let b = (std::f64::consts::PI / 180.0 * lat.abs()).cos().powi(2);
    let nl_val = (2.0 * std::f64::consts::PI / (1.0 - a / b).acos()).floor() as i32;
    nl_val.max(1)
}

/// Modulo that always returns a non-negative result.
fn modulo(x: f64, y: f64) -> f64 {
    x - y * (x / y).floor()
}

/// Normalize a longitude into (-180, 180].
pub fn normalize_lon(lon: f64) -> f64 {
    let l = modulo(lon, 360.0);
    if l > 180.0 {
        l - 360.0
    } else {
        l
    }
}

/// Great-circle distance in nautical miles.
pub fn haversine_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    EARTH_RADIUS_NM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Stateless CPR resolver configured with the pairing window and the
/// plausible range for local decoding.
#[derive(Debug, Clone)]
pub struct CprResolver {
    pair_window: f64,
    max_airborne_range_nm: f64,
    max_surface_range_nm: f64,
}

impl CprResolver {
    pub fn new(config: &CprConfig) -> Self {
        CprResolver {
            pair_window: config.pair_window_secs,
            max_airborne_range_nm: config.max_airborne_range_nm,
            max_surface_range_nm: config.max_surface_range_nm,
        }
    }

    /// Pairing window in seconds.
    pub fn pair_window(&self) -> f64 {
        self.pair_window
    }

    /// Global decode from an even/odd pair.
    ///
    /// The position of the most recent sample is returned. Surface pairs
    /// need `reference` to choose among the 90 degree candidates; airborne
    /// pairs ignore it.
    pub fn resolve_global(
        &self,
        even: &CprSample,
        odd: &CprSample,
        reference: Option<Coordinates>,
    ) -> Result<Coordinates, CprError> {
        if even.format != CprFormat::Even
            || odd.format != CprFormat::Odd
            || even.surface != odd.surface
        {
            return Err(CprError::MismatchedPair);
        }

        let age = (even.timestamp - odd.timestamp).abs();
        if age > self.pair_window {
            return Err(CprError::PairTooOld { age });
        }

        let surface = even.surface;
        let reference = match (surface, reference) {
            (true, None) => return Err(CprError::NoReference),
            (_, r) => r,
        };

        let span = even.span();
        let lat_even_cpr = even.lat as f64 / CPR_MAX;
        let lon_even_cpr = even.lon as f64 / CPR_MAX;
        let lat_odd_cpr = odd.lat as f64 / CPR_MAX;
        let lon_odd_cpr = odd.lon as f64 / CPR_MAX;

        // Latitude zone index
        let j = (59.0 * lat_even_cpr - 60.0 * lat_odd_cpr + 0.5).floor();

        let mut lat_e = span / 60.0 * (modulo(j, 60.0) + lat_even_cpr);
        let mut lat_o = span / 59.0 * (modulo(j, 59.0) + lat_odd_cpr);

        match reference {
            Some(r) if surface => {
                lat_e = nearest_surface_lat(lat_e, r.lat);
                lat_o = nearest_surface_lat(lat_o, r.lat);
            }
            _ => {
                if lat_e >= 270.0 {
                    lat_e -= 360.0;
                }
                if lat_o >= 270.0 {
                    lat_o -= 360.0;
                }
            }
        }

        for lat in [lat_e, lat_o] {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(CprError::InvalidLatitude(lat));
            }
        }

        // Both latitudes must fall in the same longitude zone count
        if nl(lat_e) != nl(lat_o) {
            return Err(CprError::Ambiguous);
        }

        let use_odd = odd.timestamp > even.timestamp;
        let (lat, lon_cpr, i) = if use_odd {
            (lat_o, lon_odd_cpr, 1)
        } else {
            (lat_e, lon_even_cpr, 0)
        };

        let nl_val = nl(lat);
        let n_lon = (nl_val - i).max(1);
        let dlon = span / n_lon as f64;
        let m = (lon_even_cpr * (nl_val - 1) as f64 - lon_odd_cpr * nl_val as f64 + 0.5).floor();
        let mut lon = dlon * (modulo(m, n_lon as f64) + lon_cpr);

        if let Some(r) = reference.filter(|_| surface) {
            lon = nearest_surface_lon(lon, r.lon);
        }

        Ok(Coordinates::new(lat, normalize_lon(lon)))
    }

    /// Local decode of a single sample against a reference position.
    ///
    /// Results further from the reference than the configured range
    /// (airborne or surface) are rejected.
    pub fn resolve_local(
        &self,
        reference: Coordinates,
        sample: &CprSample,
    ) -> Result<Coordinates, CprError> {
        let span = sample.span();
        let i = if sample.format.is_odd() { 1 } else { 0 };
        let dlat = span / (4.0 * NZ - i as f64);

        let cpr_lat_norm = sample.lat as f64 / CPR_MAX;
        let cpr_lon_norm = sample.lon as f64 / CPR_MAX;

        // Latitude zone index from reference
        let j = (reference.lat / dlat).floor()
            + (modulo(reference.lat, dlat) / dlat - cpr_lat_norm + 0.5).floor();
        let lat = dlat * (j + cpr_lat_norm);
        if !(-90.0..=90.0).contains(&lat) {
            return Err(CprError::InvalidLatitude(lat));
        }

        let n_lon = (nl(lat) - i).max(1);
        let dlon = span / n_lon as f64;

        // Longitude zone index from reference
        let m = (reference.lon / dlon).floor()
            + (modulo(reference.lon, dlon) / dlon - cpr_lon_norm + 0.5).floor();
        let resolved = Coordinates::new(lat, normalize_lon(dlon * (m + cpr_lon_norm)));

        let max_range = if sample.surface {
            self.max_surface_range_nm
        } else {
            self.max_airborne_range_nm
        };
        let distance_nm = reference.distance_nm(&resolved);
        if distance_nm > max_range {
            return Err(CprError::OutOfRange { distance_nm });
        }

        Ok(resolved)
    }
}

/// Surface latitudes decode into [0, 90); the southern candidate is 90 below.
fn nearest_surface_lat(lat: f64, ref_lat: f64) -> f64 {
    let south = lat - 90.0;
    if (south - ref_lat).abs() < (lat - ref_lat).abs() {
        south
    } else {
        lat
    }
}

/// Pick the one of four 90 degree longitude candidates closest to the reference.
fn nearest_surface_lon(lon: f64, ref_lon: f64) -> f64 {
    (0..4)
        .map(|k| lon + 90.0 * k as f64)
        .min_by(|a, b| {
            let da = normalize_lon(a - ref_lon).abs();
            let db = normalize_lon(b - ref_lon).abs();
            da.total_cmp(&db)
        })
        .unwrap_or(lon)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn resolver() -> CprResolver {
        CprResolver::new(&CprConfig::default())
    }

    fn sample(format: CprFormat, lat: u32, lon: u32, timestamp: f64, surface: bool) -> CprSample {
        CprSample {
            format,
            lat,
            lon,
            timestamp,
            surface,
        }
    }

    // "The 1090MHz Riddle" reference pair
    fn airborne_pair(t_even: f64, t_odd: f64) -> (CprSample, CprSample) {
        (
            sample(CprFormat::Even, 93000, 51372, t_even, false),
            sample(CprFormat::Odd, 74158, 50194, t_odd, false),
        )
    }

    fn surface_pair(t_even: f64, t_odd: f64) -> (CprSample, CprSample) {
        (
            sample(CprFormat::Even, 115609, 116941, t_even, true),
            sample(CprFormat::Odd, 39199, 110269, t_odd, true),
        )
    }

    fn assert_close(got: Coordinates, lat: f64, lon: f64) {
        assert!(
            (got.lat - lat).abs() < EPS && (got.lon - lon).abs() < EPS,
            "expected ({lat}, {lon}), got ({}, {})",
            got.lat,
            got.lon
        );
    }

    #[test]
    fn test_nl_equator() {
        assert_eq!(nl(0.0), 59);
    }

    #[test]
    fn test_nl_poles() {
        assert_eq!(nl(87.0), 1);
        assert_eq!(nl(-87.0), 1);
        assert_eq!(nl(90.0), 1);
        assert_eq!(nl(86.9), 2);
    }

    #[test]
    fn test_nl_mid_latitude() {
        assert_eq!(nl(52.2572), 36);
        assert_eq!(nl(-52.2572), 36);
    }

    #[test]
    fn test_modulo_negative() {
        assert!((modulo(-1.0, 60.0) - 59.0).abs() < 1e-10);
        assert!((modulo(7.0, 3.0) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_normalize_lon() {
        assert_eq!(normalize_lon(180.0), 180.0);
        assert_eq!(normalize_lon(-180.0), 180.0);
        assert_eq!(normalize_lon(190.0), -170.0);
        assert_eq!(normalize_lon(3.5), 3.5);
        assert_eq!(normalize_lon(-3.5), -3.5);
        assert_eq!(normalize_lon(359.0), -1.0);
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let d = haversine_nm(52.0, 4.0, 53.0, 4.0);
        assert!((d - 60.04).abs() < 0.1, "got {d}");
        assert_eq!(haversine_nm(10.0, 10.0, 10.0, 10.0), 0.0);
    }

    #[test]
    fn test_global_decode_even_newest() {
        let (even, odd) = airborne_pair(2.0, 0.0);
        let pos = resolver().resolve_global(&even, &odd, None).unwrap();
        assert_close(pos, 52.2572021484375, 3.91937255859375);
    }

    #[test]
    fn test_global_decode_odd_newest() {
        let (even, odd) = airborne_pair(0.0, 2.0);
        let pos = resolver().resolve_global(&even, &odd, None).unwrap();
        assert_close(pos, 52.26578017412606, 3.938912527901786);
    }

    #[test]
    fn test_global_decode_pair_too_old() {
        let (even, odd) = airborne_pair(11.0, 0.0);
        let err = resolver().resolve_global(&even, &odd, None).unwrap_err();
        assert_eq!(err, CprError::PairTooOld { age: 11.0 });
    }

    #[test]
    fn test_global_decode_mismatched_pair() {
        let (even, _) = airborne_pair(0.0, 1.0);
        let err = resolver().resolve_global(&even, &even, None).unwrap_err();
        assert_eq!(err, CprError::MismatchedPair);

        let (_, odd) = surface_pair(0.0, 1.0);
        let err = resolver().resolve_global(&even, &odd, None).unwrap_err();
        assert_eq!(err, CprError::MismatchedPair);
    }

    #[test]
    fn test_global_decode_ambiguous_zone() {
        // Pair straddling the NL 36/35 boundary near 53.095 N
        let even = sample(CprFormat::Even, 111262, 51118, 0.0, false);
        let odd = sample(CprFormat::Odd, 92017, 48278, 1.0, false);
        let err = resolver().resolve_global(&even, &odd, None).unwrap_err();
        assert_eq!(err, CprError::Ambiguous);
    }

    #[test]
    fn test_global_decode_surface() {
        let reference = Some(Coordinates::new(51.99, 4.375));

        let (even, odd) = surface_pair(2.0, 0.0);
        let pos = resolver().resolve_global(&even, &odd, reference).unwrap();
        assert_close(pos, 52.32304000854492, 4.730472564697266);

        let (even, odd) = surface_pair(0.0, 2.0);
        let pos = resolver().resolve_global(&even, &odd, reference).unwrap();
        assert_close(pos, 52.320607072215964, 4.734734671456474);
    }

    #[test]
    fn test_global_decode_surface_needs_reference() {
        let (even, odd) = surface_pair(2.0, 0.0);
        let err = resolver().resolve_global(&even, &odd, None).unwrap_err();
        assert_eq!(err, CprError::NoReference);
    }

    #[test]
    fn test_global_decode_surface_southern_reference() {
        // Same encoding, reference in the southern hemisphere
        let (even, odd) = surface_pair(2.0, 0.0);
        let pos = resolver()
            .resolve_global(&even, &odd, Some(Coordinates::new(-30.0, 4.4)))
            .unwrap();
        assert!((pos.lat - (52.32304000854492 - 90.0)).abs() < EPS);
    }

    #[test]
    fn test_local_decode_even() {
        let (even, _) = airborne_pair(0.0, 0.0);
        let pos = resolver()
            .resolve_local(Coordinates::new(52.258, 3.918), &even)
            .unwrap();
        assert_close(pos, 52.2572021484375, 3.91937255859375);
    }

    #[test]
    fn test_local_decode_odd() {
        let (_, odd) = airborne_pair(0.0, 0.0);
        let pos = resolver()
            .resolve_local(Coordinates::new(52.258, 3.918), &odd)
            .unwrap();
        assert_close(pos, 52.26578017412606, 3.938912527901786);
    }

    #[test]
    fn test_local_decode_matches_global() {
        let (even, odd) = airborne_pair(2.0, 0.0);
        let r = resolver();
        let global = r.resolve_global(&even, &odd, None).unwrap();
        let local = r.resolve_local(global, &even).unwrap();
        assert_close(local, global.lat, global.lon);
    }

    #[test]
    fn test_local_decode_out_of_range() {
        let (even, _) = airborne_pair(0.0, 0.0);
        let err = resolver()
            .resolve_local(Coordinates::new(49.3, 1.0), &even)
            .unwrap_err();
        match err {
            CprError::OutOfRange { distance_nm } => assert!(distance_nm > 180.0),
            other => panic!("expected OutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn test_local_decode_surface() {
        let (even, _) = surface_pair(0.0, 0.0);
        let r = resolver();
        let pos = r
            .resolve_local(Coordinates::new(51.99, 4.375), &even)
            .unwrap();
        assert_close(pos, 52.32304000854492, 4.730472564697266);

        // ~53 NM away: beyond the surface range
        let err = r
            .resolve_local(Coordinates::new(51.7, 3.7), &even)
            .unwrap_err();
        assert!(matches!(err, CprError::OutOfRange { .. }));
    }
}
