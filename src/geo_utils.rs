//! # Geographic Utilities
//!
//! Coordinate math shared by the grid generator and the trend connector builder.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`distance_miles`] | Great-circle distance between two points in miles |
//! | [`degrees_per_mile`] | Latitude/longitude degrees spanned by one mile at a latitude |
//! | [`offset_point`] | Move a point a number of miles north and east |
//! | [`normalize_longitude`] | Wrap a longitude into `[-180, 180)` |
//! | [`midpoint`] | Midpoint of the segment between two points |
//! | [`bearing_degrees`] | Screen-space angle from one point to another |
//!
//! ## Example
//!
//! ```rust
//! use geogrid_rank::{GeoPoint, geo_utils};
//!
//! let shop = GeoPoint::new(30.2672, -97.7431);
//! let north = geo_utils::offset_point(&shop, 1.0, 0.0).unwrap();
//!
//! let dist = geo_utils::distance_miles(&shop, &north);
//! assert!((dist - 1.0).abs() < 0.01);
//! ```
//!
//! ## Algorithm Notes
//!
//! ### Haversine Formula
//!
//! Distances use the haversine great-circle formula on a sphere of radius
//! [`EARTH_RADIUS_MILES`]. Grids are local (a few miles across), so antipodal
//! precision is not a concern.
//!
//! ### Degree Conversion
//!
//! One degree of latitude is treated as a constant 69 miles. A degree of longitude
//! shrinks with `cos(latitude)`; near the poles that factor goes to zero, so
//! latitudes beyond [`MAX_GRID_LATITUDE`] are rejected and the cosine is floored
//! at a small epsilon.

use geo::{Centroid, Distance, Haversine, Line, Point};

use crate::{GeoPoint, GridRankError, Result};

/// Earth radius used for all mile distances.
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Miles spanned by one degree of latitude.
pub const MILES_PER_DEGREE_LATITUDE: f64 = 69.0;

/// Furthest latitude (north or south) a grid may reach.
pub const MAX_GRID_LATITUDE: f64 = 85.0;

// Mean radius used by geo's haversine metric
const GEO_MEAN_EARTH_RADIUS_METERS: f64 = 6_371_008.8;

const MIN_COS_LATITUDE: f64 = 1e-6;

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance between two points in miles.
///
/// # Example
///
/// ```rust
/// use geogrid_rank::{GeoPoint, geo_utils};
///
/// let austin = GeoPoint::new(30.2672, -97.7431);
/// let round_rock = GeoPoint::new(30.5083, -97.6789);
///
/// let miles = geo_utils::distance_miles(&austin, &round_rock);
/// assert!((miles - 17.0).abs() < 1.0);
/// ```
#[inline]
pub fn distance_miles(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let meters = Haversine::distance(to_geo(a), to_geo(b));
    // Rescale from geo's mean radius onto the mile radius
    meters / GEO_MEAN_EARTH_RADIUS_METERS * EARTH_RADIUS_MILES
}

// =============================================================================
// Degree Conversion
// =============================================================================

/// Degrees of latitude and longitude spanned by one mile at `latitude`.
///
/// Returns `(lat_degrees_per_mile, lng_degrees_per_mile)`.
///
/// # Errors
///
/// [`GridRankError::PolarLatitude`] when `latitude` is not finite or lies beyond
/// [`MAX_GRID_LATITUDE`].
pub fn degrees_per_mile(latitude: f64) -> Result<(f64, f64)> {
    if !latitude.is_finite() || latitude.abs() > MAX_GRID_LATITUDE {
        return Err(GridRankError::PolarLatitude { latitude });
    }

    let cos_lat = latitude.to_radians().cos().max(MIN_COS_LATITUDE);
    let lat_deg = 1.0 / MILES_PER_DEGREE_LATITUDE;
    let lng_deg = 1.0 / (MILES_PER_DEGREE_LATITUDE * cos_lat);

    Ok((lat_deg, lng_deg))
}

/// Move `origin` by `north_miles` and `east_miles` (negative values go south/west).
///
/// The longitude scale is taken at the origin's latitude, which keeps every
/// point of a local grid on the same conversion.
pub fn offset_point(origin: &GeoPoint, north_miles: f64, east_miles: f64) -> Result<GeoPoint> {
    let (lat_deg, lng_deg) = degrees_per_mile(origin.latitude)?;

    let latitude = origin.latitude + north_miles * lat_deg;
    if latitude.abs() > MAX_GRID_LATITUDE {
        return Err(GridRankError::PolarLatitude { latitude });
    }

    let longitude = normalize_longitude(origin.longitude + east_miles * lng_deg);
    Ok(GeoPoint::new(latitude, longitude))
}

/// Wrap `longitude` into `[-180, 180)`, so grids straddling the antimeridian
/// stay valid coordinates.
#[inline]
pub fn normalize_longitude(longitude: f64) -> f64 {
    // In-range values pass through bit for bit
    if (-180.0..180.0).contains(&longitude) {
        return longitude;
    }
    (longitude + 180.0).rem_euclid(360.0) - 180.0
}

// Shortest signed longitude delta from `from` to `to`
#[inline]
pub(crate) fn longitude_delta(from: f64, to: f64) -> f64 {
    normalize_longitude(to - from)
}

// =============================================================================
// Segment Functions
// =============================================================================

/// Midpoint of the segment between `a` and `b`.
///
/// Planar centroid, which is exact enough at grid scale.
pub fn midpoint(a: &GeoPoint, b: &GeoPoint) -> GeoPoint {
    // Unwrap `b` next to `a` so the segment never spans the whole globe
    let b = GeoPoint::new(b.latitude, a.longitude + longitude_delta(a.longitude, b.longitude));
    let line = Line::new(to_geo(a).0, to_geo(&b).0);
    let center = line.centroid();
    GeoPoint::new(center.y(), normalize_longitude(center.x()))
}

/// Angle of the vector from `start` to `end`, in degrees.
///
/// Computed as `atan2(Δlat, Δlng)`: 0° points east, 90° north, -90° south.
/// Only used to rotate a direction glyph, so it is not normalised to a compass
/// bearing. Identical points yield 0°.
pub fn bearing_degrees(start: &GeoPoint, end: &GeoPoint) -> f64 {
    let d_lat = end.latitude - start.latitude;
    let d_lng = longitude_delta(start.longitude, end.longitude);
    d_lat.atan2(d_lng).to_degrees()
}

#[inline]
fn to_geo(p: &GeoPoint) -> Point<f64> {
    Point::new(p.longitude, p.latitude)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_distance_same_point() {
        let p = GeoPoint::new(30.2672, -97.7431);
        assert_eq!(distance_miles(&p, &p), 0.0);
    }

    #[test]
    fn test_distance_symmetric() {
        let a = GeoPoint::new(30.2672, -97.7431);
        let b = GeoPoint::new(30.3005, -97.7010);
        assert!(approx_eq(distance_miles(&a, &b), distance_miles(&b, &a), 1e-12));
    }

    #[test]
    fn test_distance_one_degree_latitude() {
        // 2 * pi * 3958.8 / 360
        let a = GeoPoint::new(40.0, -75.0);
        let b = GeoPoint::new(41.0, -75.0);
        assert!(approx_eq(distance_miles(&a, &b), 69.094, 0.01));
    }

    #[test]
    fn test_degrees_per_mile_equator() {
        let (lat_deg, lng_deg) = degrees_per_mile(0.0).unwrap();
        assert!(approx_eq(lat_deg, 1.0 / 69.0, 1e-12));
        assert!(approx_eq(lng_deg, 1.0 / 69.0, 1e-12));
    }

    #[test]
    fn test_degrees_per_mile_grows_with_latitude() {
        let (_, lng_0) = degrees_per_mile(0.0).unwrap();
        let (_, lng_60) = degrees_per_mile(60.0).unwrap();
        // cos(60) = 0.5
        assert!(approx_eq(lng_60, lng_0 * 2.0, 1e-9));
    }

    #[test]
    fn test_degrees_per_mile_rejects_poles() {
        assert!(matches!(
            degrees_per_mile(90.0),
            Err(GridRankError::PolarLatitude { .. })
        ));
        assert!(matches!(
            degrees_per_mile(-89.0),
            Err(GridRankError::PolarLatitude { .. })
        ));
        assert!(degrees_per_mile(f64::NAN).is_err());
        assert!(degrees_per_mile(84.9).is_ok());
    }

    #[test]
    fn test_offset_point_round_trip_distance() {
        let origin = GeoPoint::new(45.0, 10.0);
        let east = offset_point(&origin, 0.0, 2.0).unwrap();
        assert!(approx_eq(distance_miles(&origin, &east), 2.0, 0.01));
        assert_eq!(east.latitude, origin.latitude);
    }

    #[test]
    fn test_offset_point_rejects_crossing_limit() {
        let origin = GeoPoint::new(84.99, 0.0);
        assert!(offset_point(&origin, 10.0, 0.0).is_err());
    }

    #[test]
    fn test_midpoint() {
        let a = GeoPoint::new(30.0, -97.0);
        let b = GeoPoint::new(30.2, -97.4);
        let m = midpoint(&a, &b);
        assert!(approx_eq(m.latitude, 30.1, 1e-9));
        assert!(approx_eq(m.longitude, -97.2, 1e-9));
    }

    #[test]
    fn test_bearing_degrees() {
        let o = GeoPoint::new(0.0, 0.0);
        assert!(approx_eq(bearing_degrees(&o, &GeoPoint::new(1.0, 0.0)), 90.0, 1e-9));
        assert!(approx_eq(bearing_degrees(&o, &GeoPoint::new(-1.0, 0.0)), -90.0, 1e-9));
        assert!(approx_eq(bearing_degrees(&o, &GeoPoint::new(0.0, 1.0)), 0.0, 1e-9));
        assert!(approx_eq(bearing_degrees(&o, &GeoPoint::new(1.0, 1.0)), 45.0, 1e-9));
        assert_eq!(bearing_degrees(&o, &o), 0.0);
    }

    #[test]
    fn test_normalize_longitude() {
        assert!(approx_eq(normalize_longitude(180.02), -179.98, 1e-9));
        assert!(approx_eq(normalize_longitude(-180.5), 179.5, 1e-9));
        assert!(approx_eq(normalize_longitude(-97.7431), -97.7431, 1e-12));
        assert_eq!(normalize_longitude(180.0), -180.0);
        assert_eq!(normalize_longitude(-74.006), -74.006);
    }

    #[test]
    fn test_offset_point_wraps_antimeridian() {
        let fiji = GeoPoint::new(-17.7, 179.99);
        let east = offset_point(&fiji, 0.0, 2.0).unwrap();
        assert!(east.is_valid());
        assert!(east.longitude < -179.9);
        assert!(approx_eq(distance_miles(&fiji, &east), 2.0, 0.01));
    }

    #[test]
    fn test_bearing_and_midpoint_across_antimeridian() {
        let west = GeoPoint::new(-17.7, 179.99);
        let east = GeoPoint::new(-17.7, -179.99);
        assert!(bearing_degrees(&west, &east).abs() < 1e-6);
        let mid = midpoint(&west, &east);
        assert!(mid.longitude.abs() > 179.99 - 1e-6);
        assert!(approx_eq(mid.latitude, -17.7, 1e-9));
    }
}
