//! Race progression: start line, gates, rounding marks and the finish line
//!
//! Each tick a yacht is tested against the compound mark at its current
//! sequence id. When the relevant condition holds the yacht advances exactly
//! one leg and a [`Progress`] record is returned for broadcasting.

use crate::yacht::Yacht;
use log::debug;
use shared::course::{CompoundMark, Mark, MarkOrder, RoundingSide};
use shared::geo::{self, LineCrossing};
use shared::protocol::{BoatStatus, MarkType};

/// Outcome of a yacht completing a leg
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub source_id: u32,
    /// One-based id of the mark just passed
    pub mark_id: u8,
    pub mark_type: MarkType,
    pub rounding_side: RoundingSide,
    pub boat_status: BoatStatus,
    pub announcement: String,
}

/// Inputs that stay fixed for every yacht during one tick
#[derive(Debug, Clone, Copy)]
pub struct ProgressCheck<'a> {
    pub order: &'a MarkOrder,
    pub now_ms: u64,
    pub start_time_ms: u64,
    pub rounding_distance: f64,
}

impl<'a> ProgressCheck<'a> {
    /// Tests the yacht against its current mark and advances it when passed
    pub fn check(&self, yacht: &mut Yacht) -> Option<Progress> {
        if yacht.is_finished() {
            return None;
        }

        let seq = yacht.current_mark_seq();
        let current = self.order.current(seq)?;
        let is_last = self.order.is_last(seq);

        let progressed = if seq == 0 {
            self.check_start_line(yacht, current)
        } else if is_last {
            self.check_finish_line(yacht, current)
        } else if current.is_gate() {
            self.check_gate_rounding(yacht, current)
        } else {
            self.check_mark_rounding(yacht, current)
        };

        if !progressed {
            return None;
        }

        let announcement = if seq == 0 {
            format!("{} passed start line", yacht.name)
        } else if is_last {
            format!("{} passed finish line", yacht.name)
        } else {
            format!("{} passed leg {}", yacht.name, yacht.leg_number)
        };

        let mark_type = if current.is_gate() {
            MarkType::Gate
        } else {
            MarkType::RoundingMark
        };
        let rounding_side = yacht
            .closest_current_mark
            .as_ref()
            .map(|mark| mark.rounding)
            .unwrap_or_default();

        debug!(
            "Yacht {} passed compound mark {} (seq {})",
            yacht.source_id, current.id, seq
        );
        yacht.advance_mark(is_last);

        Some(Progress {
            source_id: yacht.source_id,
            mark_id: u8::try_from(seq + 1).unwrap_or(u8::MAX),
            mark_type,
            rounding_side,
            boat_status: yacht.status,
            announcement,
        })
    }

    fn line_marks<'m>(current: &'m CompoundMark) -> Option<(&'m Mark, &'m Mark)> {
        Some((current.sub_mark(1)?, current.sub_mark(2)?))
    }

    fn crossing(yacht: &Yacht, mark1: &Mark, mark2: &Mark) -> LineCrossing {
        geo::crossed_line(
            mark1.position,
            mark2.position,
            yacht.last_location,
            yacht.location,
        )
    }

    /// Crossing toward the side the next mark lies on
    fn check_start_line(&self, yacht: &mut Yacht, current: &CompoundMark) -> bool {
        if self.now_ms < self.start_time_ms {
            return false;
        }
        let Some((mark1, mark2)) = Self::line_marks(current) else {
            return false;
        };
        let Some(next) = self.order.next(yacht.current_mark_seq()) else {
            return false;
        };

        let crossing = Self::crossing(yacht, mark1, mark2);
        let next_clockwise = geo::is_clockwise(mark1.position, mark2.position, next.mid_point());
        let legal = (crossing == LineCrossing::IntoClockwise && next_clockwise)
            || (crossing == LineCrossing::IntoAnticlockwise && !next_clockwise);

        if legal {
            yacht.closest_current_mark = Some(mark1.clone());
            yacht.status = BoatStatus::Racing;
        }
        legal
    }

    /// Crossing away from the side the previous mark lies on
    fn crossed_away_from_previous(
        &self,
        yacht: &Yacht,
        mark1: &Mark,
        mark2: &Mark,
        previous: &CompoundMark,
    ) -> bool {
        let crossing = Self::crossing(yacht, mark1, mark2);
        let previous_clockwise =
            geo::is_clockwise(mark1.position, mark2.position, previous.mid_point());
        (crossing == LineCrossing::IntoAnticlockwise && previous_clockwise)
            || (crossing == LineCrossing::IntoClockwise && !previous_clockwise)
    }

    fn check_finish_line(&self, yacht: &mut Yacht, current: &CompoundMark) -> bool {
        let Some((mark1, mark2)) = Self::line_marks(current) else {
            return false;
        };
        let Some(previous) = self.order.previous(yacht.current_mark_seq()) else {
            return false;
        };

        let legal = self.crossed_away_from_previous(yacht, mark1, mark2, previous);
        if legal {
            yacht.closest_current_mark = Some(mark1.clone());
            yacht.status = BoatStatus::Finished;
        }
        legal
    }

    fn check_gate_rounding(&self, yacht: &mut Yacht, current: &CompoundMark) -> bool {
        let seq = yacht.current_mark_seq();
        let Some((mark1, mark2)) = Self::line_marks(current) else {
            return false;
        };
        let (Some(previous), Some(next)) = (self.order.previous(seq), self.order.next(seq)) else {
            return false;
        };

        if self.crossed_away_from_previous(yacht, mark1, mark2, previous) {
            yacht.has_passed_through_gate = true;
        }
        if !yacht.has_passed_through_gate {
            return false;
        }

        let previous_side = geo::is_clockwise(mark1.position, mark2.position, previous.mid_point());
        let next_side = geo::is_clockwise(mark1.position, mark2.position, next.mid_point());
        if previous_side == next_side {
            self.check_mark_rounding(yacht, current)
        } else {
            self.distance_to_current_mark(yacht, current);
            true
        }
    }

    /// Rounding zone entered and the dirty-midpoint triangle swept over a mark
    fn check_mark_rounding(&self, yacht: &mut Yacht, current: &CompoundMark) -> bool {
        let seq = yacht.current_mark_seq();
        let (Some(previous), Some(next)) = (self.order.previous(seq), self.order.next(seq)) else {
            return false;
        };
        let mid_point = geo::dirty_mid_point(next.mid_point(), previous.mid_point());

        if self.distance_to_current_mark(yacht, current) < self.rounding_distance {
            yacht.has_entered_rounding_zone = true;
        }

        for mark in &current.marks {
            if geo::is_point_in_triangle(
                yacht.last_location,
                yacht.location,
                mid_point,
                mark.position,
            ) {
                yacht.has_passed_line = true;
            }
        }

        yacht.has_passed_line && yacht.has_entered_rounding_zone
    }

    /// Distance to the nearer sub mark, remembering which one it was
    fn distance_to_current_mark(&self, yacht: &mut Yacht, current: &CompoundMark) -> f64 {
        let closest = current
            .marks
            .iter()
            .map(|mark| (geo::distance(yacht.location, mark.position), mark))
            .min_by(|a, b| a.0.total_cmp(&b.0));

        match closest {
            Some((distance, mark)) => {
                yacht.closest_current_mark = Some(mark.clone());
                distance
            }
            None => f64::INFINITY,
        }
    }
}
