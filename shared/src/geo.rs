//! Geographic primitives used by the course model and the simulation
//!
//! All functions here are pure: the same inputs always produce bit-identical
//! outputs, which keeps the race simulation reproducible. Planar tests
//! (orientation, line crossing, triangles) treat longitude as x and latitude
//! as y, which is accurate enough at race-course scales.

use serde::{Deserialize, Serialize};

/// Equatorial earth radius in metres
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Millimetres per second in one knot
pub const MMS_PER_KNOT: f64 = 514.444;

/// A latitude / longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Result of testing a movement segment against a directed line
///
/// The discriminants are the values used throughout the race logic: a path
/// that ends on the anticlockwise (left) side of `p1 -> p2` yields `1`, one
/// that ends on the clockwise (right) side yields `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LineCrossing {
    None = 0,
    IntoAnticlockwise = 1,
    IntoClockwise = 2,
}

impl LineCrossing {
    pub fn is_crossing(self) -> bool {
        self != LineCrossing::None
    }

    /// The crossing produced by travelling the same segment backwards
    pub fn reversed(self) -> Self {
        match self {
            LineCrossing::None => LineCrossing::None,
            LineCrossing::IntoAnticlockwise => LineCrossing::IntoClockwise,
            LineCrossing::IntoClockwise => LineCrossing::IntoAnticlockwise,
        }
    }
}

/// Great-circle distance in metres (haversine)
pub fn distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Initial great-circle bearing from `a` to `b` in degrees, within [0, 360)
pub fn bearing(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let y = d_lng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lng.cos();
    normalize_degrees(y.atan2(x).to_degrees())
}

/// Projects a point `distance` metres from `origin` along `bearing` degrees
pub fn destination(origin: GeoPoint, bearing: f64, distance: f64) -> GeoPoint {
    let angular = distance / EARTH_RADIUS;
    let theta = bearing.to_radians();
    let lat1 = origin.lat.to_radians();
    let lng1 = origin.lng.to_radians();

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * theta.cos()).asin();
    let lng2 = lng1
        + (theta.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());

    GeoPoint::new(lat2.to_degrees(), lng2.to_degrees())
}

/// Wraps any angle into [0, 360)
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Smallest absolute difference between two headings, within [0, 180]
pub fn angle_between(a: f64, b: f64) -> f64 {
    let diff = normalize_degrees(a - b);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// Signed area of the triangle (a, b, c); positive when c is left of a -> b
fn orientation(a: GeoPoint, b: GeoPoint, c: GeoPoint) -> f64 {
    (b.lng - a.lng) * (c.lat - a.lat) - (b.lat - a.lat) * (c.lng - a.lng)
}

/// True when `reference` lies strictly on the clockwise (right) side of `p1 -> p2`
pub fn is_clockwise(p1: GeoPoint, p2: GeoPoint, reference: GeoPoint) -> bool {
    orientation(p1, p2, reference) < 0.0
}

/// Tests whether the path `prev -> cur` crosses the line segment `p1 - p2`
///
/// Only proper crossings count: both path endpoints must lie strictly on
/// opposite sides of the line and both line endpoints strictly on opposite
/// sides of the path. The direction is reported relative to `p1 -> p2`.
pub fn crossed_line(p1: GeoPoint, p2: GeoPoint, prev: GeoPoint, cur: GeoPoint) -> LineCrossing {
    let prev_side = orientation(p1, p2, prev);
    let cur_side = orientation(p1, p2, cur);
    let p1_side = orientation(prev, cur, p1);
    let p2_side = orientation(prev, cur, p2);

    let straddles_line = (prev_side > 0.0 && cur_side < 0.0) || (prev_side < 0.0 && cur_side > 0.0);
    let straddles_path = (p1_side > 0.0 && p2_side < 0.0) || (p1_side < 0.0 && p2_side > 0.0);

    if !(straddles_line && straddles_path) {
        return LineCrossing::None;
    }

    if cur_side > 0.0 {
        LineCrossing::IntoAnticlockwise
    } else {
        LineCrossing::IntoClockwise
    }
}

/// True when `point` lies inside or on the edges of triangle (a, b, c)
pub fn is_point_in_triangle(a: GeoPoint, b: GeoPoint, c: GeoPoint, point: GeoPoint) -> bool {
    let d1 = orientation(a, b, point);
    let d2 = orientation(b, c, point);
    let d3 = orientation(c, a, point);

    let has_negative = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_positive = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;

    !(has_negative && has_positive)
}

/// Arithmetic mean of two points
///
/// Not a great-circle midpoint. The mark-rounding heuristic relies on this
/// exact approximation.
pub fn dirty_mid_point(a: GeoPoint, b: GeoPoint) -> GeoPoint {
    GeoPoint::new((a.lat + b.lat) / 2.0, (a.lng + b.lng) / 2.0)
}

/// Position a yacht is pushed to after hitting something
///
/// The bearing from `last` to `collided_with` is reversed, floored to whole
/// degrees and projected `distance` metres from `current`.
pub fn bounce_back(
    last: GeoPoint,
    current: GeoPoint,
    collided_with: GeoPoint,
    distance: f64,
) -> GeoPoint {
    let reverse = (bearing(last, collided_with) - 180.0).floor().rem_euclid(360.0);
    destination(current, reverse, distance)
}

pub fn knots_to_mms(knots: f64) -> f64 {
    knots * MMS_PER_KNOT
}

pub fn mms_to_knots(mms: f64) -> f64 {
    mms / MMS_PER_KNOT
}
