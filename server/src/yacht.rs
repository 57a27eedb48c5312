//! Yacht state, helm handling and per-tick physics
//!
//! A yacht only changes through the simulation loop: helm commands adjust
//! its heading and sails, [`Yacht::update_velocity`] eases its speed toward
//! the polar target and [`Yacht::move_forward`] advances its position.
//! Leg progress is read-only here and is advanced by the progression module.

use crate::config::RaceTuning;
use crate::polar::PolarTable;
use crate::wind::Wind;
use shared::course::Mark;
use shared::geo::{self, knots_to_mms, GeoPoint};
use shared::protocol::{BoatAction, BoatStatus, TokenType};

/// Hull types a player can pick, each trading top speed for acceleration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoatShape {
    #[default]
    Yacht,
    Catamaran,
    Dinghy,
    Trimaran,
}

impl BoatShape {
    pub fn speed_multiplier(self) -> f64 {
        match self {
            BoatShape::Yacht => 1.0,
            BoatShape::Catamaran => 1.1,
            BoatShape::Dinghy => 0.9,
            BoatShape::Trimaran => 1.05,
        }
    }

    pub fn acceleration_multiplier(self) -> f64 {
        match self {
            BoatShape::Yacht => 1.0,
            BoatShape::Catamaran => 0.9,
            BoatShape::Dinghy => 1.2,
            BoatShape::Trimaran => 1.0,
        }
    }

    /// Parses the shape names clients send in customisation requests
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "YACHT" => Some(BoatShape::Yacht),
            "CATAMARAN" => Some(BoatShape::Catamaran),
            "DINGHY" => Some(BoatShape::Dinghy),
            "TRIMARAN" => Some(BoatShape::Trimaran),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    Upwind,
    Downwind,
}

/// Rotates `heading` toward `target` along the shorter arc by at most `step` degrees
pub fn turn_towards(heading: f64, target: f64, step: f64) -> f64 {
    let mut diff = geo::normalize_degrees(target - heading);
    if diff > 180.0 {
        diff -= 360.0;
    }
    if diff.abs() <= step {
        geo::normalize_degrees(target)
    } else {
        geo::normalize_degrees(heading + step * diff.signum())
    }
}

#[derive(Debug, Clone)]
pub struct Yacht {
    pub source_id: u32,
    pub name: String,
    pub color: [u8; 3],
    pub shape: BoatShape,

    pub location: GeoPoint,
    pub last_location: GeoPoint,
    pub heading: f64,
    /// Millimetres per second
    pub velocity: f64,
    pub sail_in: bool,

    pub status: BoatStatus,
    pub leg_number: u32,
    current_mark_seq: usize,
    pub closest_current_mark: Option<Mark>,

    pub(crate) has_passed_line: bool,
    pub(crate) has_entered_rounding_zone: bool,
    pub(crate) has_passed_through_gate: bool,

    pub power_up: Option<TokenType>,
    pub power_up_started_ms: u64,
    pub power_up_speed_multiplier: f64,
    pub disabled_until_ms: Option<u64>,

    autopilot_target: Option<f64>,
    continuous_turning: bool,
    turning: Option<Turn>,
}

impl Yacht {
    pub fn new(source_id: u32, location: GeoPoint, heading: f64) -> Self {
        Self {
            source_id,
            name: format!("Boat {}", source_id),
            color: [255, 255, 255],
            shape: BoatShape::default(),
            location,
            last_location: location,
            heading: geo::normalize_degrees(heading),
            velocity: 0.0,
            sail_in: false,
            status: BoatStatus::NotStarted,
            leg_number: 0,
            current_mark_seq: 0,
            closest_current_mark: None,
            has_passed_line: false,
            has_entered_rounding_zone: false,
            has_passed_through_gate: false,
            power_up: None,
            power_up_started_ms: 0,
            power_up_speed_multiplier: 1.0,
            disabled_until_ms: None,
            autopilot_target: None,
            continuous_turning: false,
            turning: None,
        }
    }

    pub fn current_mark_seq(&self) -> usize {
        self.current_mark_seq
    }

    pub fn has_passed_line(&self) -> bool {
        self.has_passed_line
    }

    pub fn has_entered_rounding_zone(&self) -> bool {
        self.has_entered_rounding_zone
    }

    pub fn has_passed_through_gate(&self) -> bool {
        self.has_passed_through_gate
    }

    pub fn is_finished(&self) -> bool {
        self.status == BoatStatus::Finished
    }

    pub fn autopilot_target(&self) -> Option<f64> {
        self.autopilot_target
    }

    /// Records a completed leg and clears the per-leg rounding flags
    ///
    /// The mark sequence stays put on the final leg.
    pub(crate) fn advance_mark(&mut self, is_last: bool) {
        self.leg_number += 1;
        self.has_passed_line = false;
        self.has_entered_rounding_zone = false;
        self.has_passed_through_gate = false;
        if !is_last {
            self.current_mark_seq += 1;
        }
    }

    pub fn is_disabled(&self, now_ms: u64) -> bool {
        self.disabled_until_ms.is_some_and(|until| now_ms < until)
    }

    pub fn power_up(&mut self, token: TokenType, now_ms: u64, tuning: &RaceTuning) {
        self.power_up = Some(token);
        self.power_up_started_ms = now_ms;
        self.power_up_speed_multiplier = match token {
            TokenType::Boost => tuning.velocity_boost_multiplier,
            TokenType::Random => tuning.random_speed_penalty,
            _ => 1.0,
        };
    }

    pub fn power_down(&mut self) {
        self.power_up = None;
        self.power_up_speed_multiplier = 1.0;
    }

    fn turn_step(&self, tuning: &RaceTuning) -> f64 {
        if self.power_up == Some(TokenType::Handling) {
            tuning.turn_step * tuning.handling_boost_multiplier
        } else {
            tuning.turn_step
        }
    }

    fn turn(&mut self, turn: Turn, wind: &Wind, step: f64) {
        let target = match turn {
            Turn::Upwind => wind.direction,
            Turn::Downwind => wind.direction + 180.0,
        };
        self.heading = turn_towards(self.heading, target, step);
    }

    /// Applies one helm command from the player
    pub fn apply_action(
        &mut self,
        action: BoatAction,
        wind: &Wind,
        polar: &PolarTable,
        tuning: &RaceTuning,
    ) {
        let step = self.turn_step(tuning);
        match action {
            BoatAction::SailsIn => self.sail_in = true,
            BoatAction::SailsOut => self.sail_in = false,
            BoatAction::Upwind | BoatAction::Downwind => {
                let turn = if action == BoatAction::Upwind {
                    Turn::Upwind
                } else {
                    Turn::Downwind
                };
                self.autopilot_target = None;
                if self.continuous_turning {
                    self.turning = Some(turn);
                } else {
                    self.turn(turn, wind, step);
                }
            }
            BoatAction::TackGybe => {
                self.turning = None;
                self.autopilot_target =
                    Some(geo::normalize_degrees(2.0 * wind.direction - self.heading));
            }
            BoatAction::Vmg => {
                self.turning = None;
                let (upwind, downwind) = polar.vmg_angles(wind.speed_knots());
                let off_wind = geo::normalize_degrees(self.heading - wind.direction);
                let side = if off_wind <= 180.0 { 1.0 } else { -1.0 };
                let angle = if geo::angle_between(self.heading, wind.direction) < 90.0 {
                    upwind
                } else {
                    downwind
                };
                self.autopilot_target = Some(geo::normalize_degrees(wind.direction + side * angle));
            }
            BoatAction::MaintainHeading => {
                self.turning = None;
                self.autopilot_target = None;
            }
            BoatAction::ContinuouslyTurning => self.continuous_turning = true,
            BoatAction::DefaultTurning => {
                self.continuous_turning = false;
                self.turning = None;
            }
        }
    }

    /// Applies held turns and steers toward any autopilot target
    pub fn run_autopilot(&mut self, wind: &Wind, tuning: &RaceTuning) {
        let step = self.turn_step(tuning);
        if let Some(turn) = self.turning {
            self.turn(turn, wind, step);
        } else if let Some(target) = self.autopilot_target {
            self.heading = turn_towards(self.heading, target, step);
            if self.heading == target {
                self.autopilot_target = None;
            }
        }
    }

    /// Eases velocity toward the polar speed for the current wind
    pub fn update_velocity(
        &mut self,
        polar: &PolarTable,
        wind: &Wind,
        server_speed_multiplier: f64,
        now_ms: u64,
    ) {
        let true_wind_angle = (wind.direction - self.heading).abs();
        let max_speed = if self.is_disabled(now_ms) {
            0.0
        } else {
            knots_to_mms(polar.boat_speed(wind.speed_knots(), true_wind_angle))
                * server_speed_multiplier
                * self.power_up_speed_multiplier
                * self.shape.speed_multiplier()
        };

        let acceleration = self.shape.acceleration_multiplier();
        let current = self.velocity;
        if self.sail_in {
            if current < max_speed - 500.0 {
                self.velocity += max_speed / 100.0 * acceleration;
            } else if current > max_speed + 500.0 {
                self.velocity -= current / 200.0 * acceleration;
            } else {
                self.velocity = max_speed;
            }
        } else if current > 3000.0 {
            self.velocity -= current / 200.0 * acceleration;
        } else if current > 100.0 {
            self.velocity -= current / 50.0 * acceleration;
        } else {
            self.velocity = 0.0;
        }
    }

    /// Moves along the current heading for `dt` seconds
    pub fn move_forward(&mut self, dt: f64) {
        self.last_location = self.location;
        if self.velocity > 0.0 {
            let metres = self.velocity / 1000.0 * dt;
            self.location = geo::destination(self.location, self.heading, metres);
        }
    }
}
