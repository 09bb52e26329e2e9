//! Observer-relative geometry: slant distance, elevation, and bearing.
//!
//! Positions are WGS84 latitude/longitude in degrees with altitude in meters.
//! The aircraft position is converted to ECEF, differenced against the
//! observer, and rotated into the observer's local East/North/Up frame.

use serde::Serialize;

use crate::types::{Result, SkyscanError};

/// Mean spherical Earth radius in meters (haversine ground range).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// WGS84 semi-major axis in meters.
const WGS84_A: f64 = 6_378_137.0;

/// WGS84 flattening.
const WGS84_F: f64 = 1.0 / 298.257223563;

/// WGS84 first eccentricity squared.
const WGS84_ECC_SQ: f64 = WGS84_F * (2.0 - WGS84_F);

/// Below this slant distance (m) the look direction is undefined.
const MIN_SLANT_M: f64 = 1e-3;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A fixed geodetic position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Location {
            latitude,
            longitude,
            altitude,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_position(self.latitude, self.longitude, self.altitude)
    }
}

/// Direction and distance from the observer to a target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LookAngles {
    /// Straight-line 3D distance in meters.
    pub slant_distance_m: f64,
    /// Angle above the local horizon in degrees, [-90, 90].
    pub elevation_deg: f64,
    /// Clockwise from true north in degrees, [0, 360).
    pub bearing_deg: f64,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Reject non-finite values and out-of-range latitude/longitude.
pub fn check_position(lat: f64, lon: f64, alt: f64) -> Result<()> {
    if !lat.is_finite() || !lon.is_finite() || !alt.is_finite() {
        return Err(SkyscanError::Geometry(format!(
            "non-finite position ({lat}, {lon}, {alt})"
        )));
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(SkyscanError::Geometry(format!(
            "latitude {lat} out of range"
        )));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(SkyscanError::Geometry(format!(
            "longitude {lon} out of range"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// WGS84 geodetic to ECEF (meters).
pub fn llh_to_ecef(lat: f64, lon: f64, alt: f64) -> [f64; 3] {
    let (slat, clat) = lat.to_radians().sin_cos();
    let (slon, clon) = lon.to_radians().sin_cos();

    // Radius of curvature in the prime vertical
    let rn = WGS84_A / (1.0 - WGS84_ECC_SQ * slat * slat).sqrt();

    [
        (rn + alt) * clat * clon,
        (rn + alt) * clat * slon,
        (rn * (1.0 - WGS84_ECC_SQ) + alt) * slat,
    ]
}

/// Rotate an ECEF difference vector into East/North/Up at `origin`.
pub fn ecef_delta_to_enu(origin: &Location, d: [f64; 3]) -> [f64; 3] {
    let (slat, clat) = origin.latitude.to_radians().sin_cos();
    let (slon, clon) = origin.longitude.to_radians().sin_cos();

    let east = -slon * d[0] + clon * d[1];
    let north = -slat * clon * d[0] - slat * slon * d[1] + clat * d[2];
    let up = clat * clon * d[0] + clat * slon * d[1] + slat * d[2];
    [east, north, up]
}

/// Look angles for a local ENU vector.
pub fn enu_to_look(enu: [f64; 3]) -> Result<LookAngles> {
    let [e, n, u] = enu;
    let horizontal = e.hypot(n);
    let slant = horizontal.hypot(u);
    if !slant.is_finite() || slant < MIN_SLANT_M {
        return Err(SkyscanError::Geometry(format!(
            "degenerate slant distance {slant}"
        )));
    }

    let elevation = u.atan2(horizontal).to_degrees();
    let bearing = e.atan2(n).to_degrees().rem_euclid(360.0);

    Ok(LookAngles {
        slant_distance_m: slant,
        elevation_deg: elevation,
        bearing_deg: bearing,
    })
}

/// Slant distance, elevation, and bearing from `observer` to a position.
pub fn look_angles(observer: &Location, lat: f64, lon: f64, alt: f64) -> Result<LookAngles> {
    check_position(lat, lon, alt)?;

    let o = llh_to_ecef(observer.latitude, observer.longitude, observer.altitude);
    let t = llh_to_ecef(lat, lon, alt);
    let enu = ecef_delta_to_enu(observer, [t[0] - o[0], t[1] - o[1], t[2] - o[2]]);
    enu_to_look(enu)
}

// ---------------------------------------------------------------------------
// Haversine
// ---------------------------------------------------------------------------

/// Great-circle ground distance in meters (spherical Earth, ignores altitude).
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    EARTH_RADIUS_M * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

// ---------------------------------------------------------------------------
// Dead reckoning
// ---------------------------------------------------------------------------

/// Project a position forward by `dt` seconds at constant velocity.
///
/// `track_deg` is the course over ground, `ground_speed` and `vertical_rate`
/// are in m/s. Uses a local flat-Earth step, which is accurate for the
/// few-second horizons a camera lead time needs.
pub fn project(
    lat: f64,
    lon: f64,
    alt: f64,
    track_deg: f64,
    ground_speed: f64,
    vertical_rate: f64,
    dt: f64,
) -> (f64, f64, f64) {
    let (st, ct) = track_deg.to_radians().sin_cos();
    let east = ground_speed * st * dt;
    let north = ground_speed * ct * dt;

    let new_lat = (lat + (north / EARTH_RADIUS_M).to_degrees()).clamp(-90.0, 90.0);
    let cos_lat = lat.to_radians().cos().max(1e-6);
    let mut new_lon = lon + (east / (EARTH_RADIUS_M * cos_lat)).to_degrees();
    if new_lon > 180.0 {
        new_lon -= 360.0;
    } else if new_lon < -180.0 {
        new_lon += 360.0;
    }

    (new_lat, new_lon, alt + vertical_rate * dt)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
