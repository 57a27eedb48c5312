//! Course model: marks, compound marks and the ordered legs of a race
//!
//! A course is described by a [`CourseDefinition`], usually loaded from JSON,
//! and turned into a validated [`MarkOrder`] before a race starts. Leg
//! sequence ids are positions in the mark order, so `0` is always the start
//! line and `len() - 1` the finish line.

use crate::geo::{self, GeoPoint};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CourseError {
    #[error("course needs at least a start and a finish, got {0} compound marks")]
    TooFewMarks(usize),
    #[error("compound mark {0} must contain one or two marks")]
    InvalidMarkCount(u32),
    #[error("the start of a course must be a two-mark line, compound mark {0} is not")]
    StartNotLine(u32),
    #[error("the finish of a course must be a two-mark line, compound mark {0} is not")]
    FinishNotLine(u32),
    #[error("course boundary needs at least three points, got {0}")]
    InvalidBoundary(usize),
    #[error("leg repeats must be at least one")]
    InvalidLegRepeats,
}

/// Which side of the boat a mark should be left on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum RoundingSide {
    #[default]
    Unknown = 0,
    Port = 1,
    Starboard = 2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    pub source_id: u32,
    pub name: String,
    pub position: GeoPoint,
    #[serde(default)]
    pub rounding: RoundingSide,
}

impl Mark {
    pub fn new(source_id: u32, name: &str, position: GeoPoint) -> Self {
        Self {
            source_id,
            name: name.to_string(),
            position,
            rounding: RoundingSide::Unknown,
        }
    }

    pub fn with_rounding(mut self, rounding: RoundingSide) -> Self {
        self.rounding = rounding;
        self
    }
}

/// A single rounding mark or a two-mark gate / line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundMark {
    pub id: u32,
    pub name: String,
    pub marks: Vec<Mark>,
}

impl CompoundMark {
    pub fn new(id: u32, name: &str, marks: Vec<Mark>) -> Self {
        Self {
            id,
            name: name.to_string(),
            marks,
        }
    }

    pub fn is_gate(&self) -> bool {
        self.marks.len() == 2
    }

    /// Returns sub mark 1 or 2 (one-based, as marks are named on a course)
    pub fn sub_mark(&self, index: usize) -> Option<&Mark> {
        index.checked_sub(1).and_then(|i| self.marks.get(i))
    }

    /// Position of a single mark, or the middle of a gate
    pub fn mid_point(&self) -> GeoPoint {
        match self.marks.as_slice() {
            [single] => single.position,
            [first, second, ..] => geo::dirty_mid_point(first.position, second.position),
            [] => GeoPoint::new(0.0, 0.0),
        }
    }

    fn validate(&self) -> Result<(), CourseError> {
        if self.marks.is_empty() || self.marks.len() > 2 {
            return Err(CourseError::InvalidMarkCount(self.id));
        }
        Ok(())
    }
}

/// The validated sequence of compound marks a yacht must pass
#[derive(Debug, Clone)]
pub struct MarkOrder {
    order: Vec<CompoundMark>,
}

impl MarkOrder {
    pub fn new(order: Vec<CompoundMark>) -> Result<Self, CourseError> {
        if order.len() < 2 {
            return Err(CourseError::TooFewMarks(order.len()));
        }
        for compound in &order {
            compound.validate()?;
        }

        let start = &order[0];
        if !start.is_gate() {
            return Err(CourseError::StartNotLine(start.id));
        }
        let finish = &order[order.len() - 1];
        if !finish.is_gate() {
            return Err(CourseError::FinishNotLine(finish.id));
        }

        Ok(Self { order })
    }

    pub fn current(&self, seq: usize) -> Option<&CompoundMark> {
        self.order.get(seq)
    }

    pub fn previous(&self, seq: usize) -> Option<&CompoundMark> {
        seq.checked_sub(1).and_then(|i| self.order.get(i))
    }

    pub fn next(&self, seq: usize) -> Option<&CompoundMark> {
        self.order.get(seq + 1)
    }

    pub fn is_last(&self, seq: usize) -> bool {
        seq + 1 == self.order.len()
    }

    pub fn last_seq(&self) -> usize {
        self.order.len() - 1
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompoundMark> {
        self.order.iter()
    }

    /// Every physical mark on the course once, even when legs repeat
    pub fn unique_marks(&self) -> Vec<&Mark> {
        let mut marks: Vec<&Mark> = Vec::new();
        for mark in self.order.iter().flat_map(|c| c.marks.iter()) {
            if !marks.iter().any(|m| m.source_id == mark.source_id) {
                marks.push(mark);
            }
        }
        marks
    }
}

fn default_max_players() -> usize {
    12
}

fn default_leg_repeats() -> usize {
    1
}

/// Parsed course description handed to the server at start-up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseDefinition {
    pub name: String,
    /// Compound marks in rounding order, start line first and finish line last
    pub compound_marks: Vec<CompoundMark>,
    /// Course limit polygon; the closing edge is implied
    pub boundary: Vec<GeoPoint>,
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    /// How many times the legs between start and finish are sailed
    #[serde(default = "default_leg_repeats")]
    pub leg_repeats: usize,
    #[serde(default)]
    pub tokens_enabled: bool,
}

impl CourseDefinition {
    /// Builds the mark order, repeating the middle legs `leg_repeats` times
    pub fn mark_order(&self) -> Result<MarkOrder, CourseError> {
        if self.leg_repeats == 0 {
            return Err(CourseError::InvalidLegRepeats);
        }
        if self.compound_marks.len() < 2 {
            return Err(CourseError::TooFewMarks(self.compound_marks.len()));
        }

        let last = self.compound_marks.len() - 1;
        let middle = &self.compound_marks[1..last];

        let mut order = Vec::with_capacity(2 + middle.len() * self.leg_repeats);
        order.push(self.compound_marks[0].clone());
        for _ in 0..self.leg_repeats {
            order.extend(middle.iter().cloned());
        }
        order.push(self.compound_marks[last].clone());

        MarkOrder::new(order)
    }

    pub fn validate(&self) -> Result<MarkOrder, CourseError> {
        if self.boundary.len() < 3 {
            return Err(CourseError::InvalidBoundary(self.boundary.len()));
        }
        self.mark_order()
    }

    /// A small windward / leeward course used when no course file is given
    ///
    /// Wind comes from the south by default, so the windward mark lies to
    /// the north of the start line.
    pub fn default_course() -> Self {
        let origin = GeoPoint::new(57.6700, 11.8300);
        let at = |bearing: f64, metres: f64| geo::destination(origin, bearing, metres);
        let beside = |centre: GeoPoint, metres: f64| {
            (
                geo::destination(centre, 270.0, metres),
                geo::destination(centre, 90.0, metres),
            )
        };

        let (start_w, start_e) = beside(origin, 60.0);
        let windward = at(0.0, 900.0);
        let (leeward_w, leeward_e) = beside(at(0.0, 250.0), 50.0);
        let (finish_w, finish_e) = beside(at(0.0, 550.0), 60.0);

        let compound_marks = vec![
            CompoundMark::new(
                1,
                "Start Line",
                vec![
                    Mark::new(101, "Start West", start_w),
                    Mark::new(102, "Start East", start_e),
                ],
            ),
            CompoundMark::new(
                2,
                "Windward",
                vec![Mark::new(103, "Windward", windward).with_rounding(RoundingSide::Port)],
            ),
            CompoundMark::new(
                3,
                "Leeward Gate",
                vec![
                    Mark::new(104, "Leeward West", leeward_w).with_rounding(RoundingSide::Starboard),
                    Mark::new(105, "Leeward East", leeward_e).with_rounding(RoundingSide::Port),
                ],
            ),
            CompoundMark::new(
                4,
                "Finish Line",
                vec![
                    Mark::new(106, "Finish West", finish_w),
                    Mark::new(107, "Finish East", finish_e),
                ],
            ),
        ];

        let boundary = vec![
            at(225.0, 500.0),
            geo::destination(at(0.0, 1200.0), 270.0, 400.0),
            geo::destination(at(0.0, 1200.0), 90.0, 400.0),
            at(135.0, 500.0),
        ];

        Self {
            name: "Harbour Sprint".to_string(),
            compound_marks,
            boundary,
            max_players: default_max_players(),
            leg_repeats: default_leg_repeats(),
            tokens_enabled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(id: u32, lat: f64) -> CompoundMark {
        CompoundMark::new(
            id,
            "gate",
            vec![
                Mark::new(id * 10 + 1, "a", GeoPoint::new(lat, 0.0)),
                Mark::new(id * 10 + 2, "b", GeoPoint::new(lat, 0.002)),
            ],
        )
    }

    fn single(id: u32, lat: f64) -> CompoundMark {
        CompoundMark::new(id, "mark", vec![Mark::new(id * 10 + 1, "m", GeoPoint::new(lat, 0.001))])
    }

    #[test]
    fn test_compound_mark_accessors() {
        let g = gate(1, 0.0);
        assert!(g.is_gate());
        assert_eq!(g.sub_mark(1).map(|m| m.source_id), Some(11));
        assert_eq!(g.sub_mark(2).map(|m| m.source_id), Some(12));
        assert!(g.sub_mark(0).is_none());
        assert!(g.sub_mark(3).is_none());
        assert_eq!(g.mid_point(), GeoPoint::new(0.0, 0.001));

        let s = single(2, 0.01);
        assert!(!s.is_gate());
        assert_eq!(s.mid_point(), GeoPoint::new(0.01, 0.001));
    }

    #[test]
    fn test_mark_order_navigation() {
        let order = MarkOrder::new(vec![gate(1, 0.0), single(2, 0.01), gate(3, 0.005)]).unwrap();

        assert_eq!(order.len(), 3);
        assert_eq!(order.current(0).map(|c| c.id), Some(1));
        assert!(order.previous(0).is_none());
        assert_eq!(order.next(0).map(|c| c.id), Some(2));
        assert_eq!(order.previous(2).map(|c| c.id), Some(2));
        assert!(order.next(2).is_none());
        assert!(order.current(3).is_none());
        assert!(order.is_last(2));
        assert!(!order.is_last(1));
        assert_eq!(order.last_seq(), 2);
    }

    #[test]
    fn test_mark_order_rejects_invalid_courses() {
        assert_eq!(
            MarkOrder::new(vec![gate(1, 0.0)]).unwrap_err(),
            CourseError::TooFewMarks(1)
        );
        assert_eq!(
            MarkOrder::new(vec![single(1, 0.0), gate(2, 0.01)]).unwrap_err(),
            CourseError::StartNotLine(1)
        );
        assert_eq!(
            MarkOrder::new(vec![gate(1, 0.0), single(2, 0.01)]).unwrap_err(),
            CourseError::FinishNotLine(2)
        );
        assert_eq!(
            MarkOrder::new(vec![gate(1, 0.0), CompoundMark::new(5, "empty", vec![]), gate(2, 0.01)])
                .unwrap_err(),
            CourseError::InvalidMarkCount(5)
        );
    }

    #[test]
    fn test_leg_repeats_expand_middle_legs() {
        let mut course = CourseDefinition::default_course();
        course.leg_repeats = 2;

        let order = course.mark_order().unwrap();
        let ids: Vec<u32> = order.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 2, 3, 4]);
        assert_eq!(order.unique_marks().len(), 7);

        course.leg_repeats = 0;
        assert_eq!(course.mark_order().unwrap_err(), CourseError::InvalidLegRepeats);
    }

    #[test]
    fn test_default_course_is_valid() {
        let course = CourseDefinition::default_course();
        let order = course.validate().unwrap();
        assert_eq!(order.len(), 4);
        assert!(order.current(0).unwrap().is_gate());
        assert!(order.current(order.last_seq()).unwrap().is_gate());
    }

    #[test]
    fn test_course_definition_from_json() {
        let json = r#"{
            "name": "Tiny",
            "compound_marks": [
                {"id": 1, "name": "Start", "marks": [
                    {"source_id": 1, "name": "S1", "position": {"lat": 0.0, "lng": 0.0}},
                    {"source_id": 2, "name": "S2", "position": {"lat": 0.0, "lng": 0.001}}
                ]},
                {"id": 2, "name": "Top", "marks": [
                    {"source_id": 3, "name": "T", "position": {"lat": 0.01, "lng": 0.0005},
                     "rounding": "Port"}
                ]},
                {"id": 3, "name": "Finish", "marks": [
                    {"source_id": 4, "name": "F1", "position": {"lat": 0.002, "lng": 0.0}},
                    {"source_id": 5, "name": "F2", "position": {"lat": 0.002, "lng": 0.001}}
                ]}
            ],
            "boundary": [
                {"lat": -0.01, "lng": -0.01},
                {"lat": 0.02, "lng": -0.01},
                {"lat": 0.02, "lng": 0.01}
            ]
        }"#;

        let course: CourseDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(course.max_players, 12);
        assert_eq!(course.leg_repeats, 1);
        assert!(!course.tokens_enabled);

        let order = course.validate().unwrap();
        assert_eq!(order.len(), 3);
        assert_eq!(order.current(1).unwrap().marks[0].rounding, RoundingSide::Port);
    }

    #[test]
    fn test_boundary_validation() {
        let mut course = CourseDefinition::default_course();
        course.boundary.truncate(2);
        assert_eq!(course.validate().unwrap_err(), CourseError::InvalidBoundary(2));
    }
}
