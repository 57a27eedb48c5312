//! Collision detection and bounce-back resolution
//!
//! Per yacht only the first matching collision is applied, in priority
//! order: another yacht, then a mark, then the course boundary.

use crate::config::RaceTuning;
use crate::yacht::Yacht;
use shared::geo::{self, GeoPoint};
use shared::protocol::CollisionKind;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Collision {
    Yacht(u32),
    Mark(GeoPoint),
    Boundary,
}

impl Collision {
    pub fn kind(&self) -> CollisionKind {
        match self {
            Collision::Yacht(_) => CollisionKind::Yacht,
            Collision::Mark(_) => CollisionKind::Mark,
            Collision::Boundary => CollisionKind::Boundary,
        }
    }
}

/// Closest other yacht strictly within `radius` metres
pub fn closest_yacht(
    yacht: &Yacht,
    yachts: &BTreeMap<u32, Yacht>,
    radius: f64,
) -> Option<u32> {
    yachts
        .values()
        .filter(|other| other.source_id != yacht.source_id)
        .map(|other| (geo::distance(yacht.location, other.location), other.source_id))
        .filter(|(distance, _)| *distance < radius)
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, id)| id)
}

/// Closest mark within `radius` metres, inclusive
pub fn closest_mark(location: GeoPoint, marks: &[GeoPoint], radius: f64) -> Option<GeoPoint> {
    marks
        .iter()
        .map(|mark| (geo::distance(location, *mark), *mark))
        .filter(|(distance, _)| *distance <= radius)
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, mark)| mark)
}

/// True when the movement `last -> current` crosses any edge of the polygon
pub fn crosses_boundary(last: GeoPoint, current: GeoPoint, boundary: &[GeoPoint]) -> bool {
    if boundary.len() < 2 {
        return false;
    }
    boundary
        .iter()
        .zip(boundary.iter().cycle().skip(1))
        .any(|(a, b)| geo::crossed_line(*a, *b, last, current).is_crossing())
}

pub fn detect(
    yacht: &Yacht,
    yachts: &BTreeMap<u32, Yacht>,
    marks: &[GeoPoint],
    boundary: &[GeoPoint],
    tuning: &RaceTuning,
) -> Option<Collision> {
    if let Some(other) = closest_yacht(yacht, yachts, tuning.yacht_collision_distance) {
        return Some(Collision::Yacht(other));
    }
    if let Some(mark) = closest_mark(yacht.location, marks, tuning.mark_collision_distance) {
        return Some(Collision::Mark(mark));
    }
    if crosses_boundary(yacht.last_location, yacht.location, boundary) {
        return Some(Collision::Boundary);
    }
    None
}

fn bounce(yacht: &mut Yacht, collided_with: GeoPoint, distance: f64, penalty: f64) {
    yacht.location = geo::bounce_back(yacht.last_location, yacht.location, collided_with, distance);
    yacht.velocity *= penalty;
}

/// Repositions the yacht (and the other yacht, if any) and damps their speed
pub fn resolve(
    yachts: &mut BTreeMap<u32, Yacht>,
    source_id: u32,
    collision: Collision,
    tuning: &RaceTuning,
) {
    let penalty = tuning.collision_velocity_penalty;
    let Some(yacht) = yachts.get_mut(&source_id) else {
        return;
    };

    match collision {
        Collision::Yacht(other_id) => {
            let original_location = yacht.location;
            bounce(yacht, original_location, tuning.yacht_bounce_distance, penalty);
            if let Some(other) = yachts.get_mut(&other_id) {
                bounce(other, original_location, tuning.yacht_bounce_distance, penalty);
            }
        }
        Collision::Mark(mark) => {
            bounce(yacht, mark, tuning.mark_bounce_distance, penalty);
        }
        Collision::Boundary => {
            let current = yacht.location;
            bounce(yacht, current, tuning.boundary_bounce_distance, penalty);
        }
    }
}
