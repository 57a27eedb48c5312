//! Random-walk wind shared by every yacht in the race

use log::debug;
use rand::Rng;
use shared::geo::{self, mms_to_knots};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wind {
    /// Direction the wind blows from, degrees within [0, 360)
    pub direction: f64,
    /// Millimetres per second
    pub speed: f64,
}

impl Wind {
    pub fn new(direction: f64, speed: f64) -> Self {
        Self {
            direction: geo::normalize_degrees(direction),
            speed,
        }
    }

    pub fn speed_knots(&self) -> f64 {
        mms_to_knots(self.speed)
    }

    /// Nudges direction and speed by a small random step in the same sense
    ///
    /// Direction moves by 0 to 3 degrees and speed by 459 to 478 mm/s. A
    /// speed outside `[min_speed, max_speed]` is pushed back by up to
    /// 499 mm/s and then clamped into the band.
    pub fn update<R: Rng + ?Sized>(&mut self, rng: &mut R, min_speed: f64, max_speed: f64) {
        let direction_step = rng.gen_range(0..4) as f64;
        let speed_step = (rng.gen_range(0..20) + 459) as f64;

        if rng.gen_bool(0.5) {
            self.direction += direction_step;
            self.speed += speed_step;
        } else {
            self.direction -= direction_step;
            self.speed -= speed_step;
        }
        self.direction = geo::normalize_degrees(self.direction);

        if self.speed > max_speed {
            self.speed -= rng.gen_range(0..500) as f64;
        }
        if self.speed <= min_speed {
            self.speed += rng.gen_range(0..500) as f64;
        }
        self.speed = self.speed.clamp(min_speed, max_speed);

        debug!(
            "Wind now {:.0} deg at {:.0} mm/s",
            self.direction, self.speed
        );
    }
}
