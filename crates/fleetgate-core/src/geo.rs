//! Great-circle distance helpers.

use crate::constants::EARTH_RADIUS_M;

/// Haversine distance between two WGS84 points, in meters.
///
/// # Examples
///
/// ```
/// use fleetgate_core::geo::haversine_m;
///
/// // One degree of latitude is roughly 111 km.
/// let d = haversine_m(45.0, 20.0, 46.0, 20.0);
/// assert!((d - 111_195.0).abs() < 100.0);
/// ```
#[must_use]
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Haversine distance in kilometers.
#[must_use]
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    haversine_m(lat1, lon1, lat2, lon2) / 1000.0
}

/// Point `meters` north of `(lat, lon)`.
///
/// Only used to place test fixtures at an exact distance from a zone center.
#[must_use]
pub fn offset_north(lat: f64, lon: f64, meters: f64) -> (f64, f64) {
    let d_lat = (meters / EARTH_RADIUS_M).to_degrees();
    (lat + d_lat, lon)
}
