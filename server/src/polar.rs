//! Boat speed polar lookups
//!
//! A polar table maps (true wind speed, true wind angle) to boat speed. Both
//! axes are interpolated linearly, and wind speeds outside the table are
//! clamped to its first or last row.
//!
//! Custom tables load from JSON with the same three fields as the built-in
//! one: `wind_speeds`, `wind_angles` and one `boat_speeds` row per wind speed.

use serde::Deserialize;
use thiserror::Error;

/// True wind speeds (knots) of the built-in table rows
const WIND_SPEEDS: [f64; 6] = [4.0, 8.0, 12.0, 16.0, 20.0, 25.0];

/// True wind angles (degrees) of the built-in table columns
const WIND_ANGLES: [f64; 12] = [
    0.0, 30.0, 45.0, 60.0, 75.0, 90.0, 110.0, 120.0, 135.0, 150.0, 165.0, 180.0,
];

/// Boat speeds in knots, one row per wind speed
const BOAT_SPEEDS: [[f64; 12]; 6] = [
    [0.0, 2.0, 3.5, 4.0, 4.3, 4.4, 4.3, 4.1, 3.7, 3.2, 2.8, 2.6],
    [0.0, 4.0, 6.5, 7.5, 8.0, 8.2, 8.3, 8.0, 7.3, 6.3, 5.6, 5.2],
    [0.0, 5.5, 8.5, 9.8, 10.5, 11.0, 11.5, 11.2, 10.5, 9.2, 8.2, 7.6],
    [0.0, 6.5, 10.0, 11.5, 12.5, 13.5, 14.5, 14.8, 14.0, 12.5, 11.0, 10.2],
    [0.0, 7.0, 11.0, 12.5, 13.8, 15.0, 16.5, 17.0, 16.8, 15.2, 13.5, 12.5],
    [0.0, 7.2, 11.5, 13.0, 14.5, 16.0, 18.0, 18.8, 19.0, 17.5, 15.5, 14.5],
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolarError {
    #[error("polar table needs at least one wind speed and one wind angle")]
    Empty,
    #[error("expected {expected} boat speed rows, found {found}")]
    RowCount { expected: usize, found: usize },
    #[error("boat speed row {row} has {found} entries, expected {expected}")]
    RowLength {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("{0} axis is not strictly increasing")]
    Unsorted(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "PolarRows")]
pub struct PolarTable {
    wind_speeds: Vec<f64>,
    wind_angles: Vec<f64>,
    boat_speeds: Vec<Vec<f64>>,
}

/// Unchecked JSON form of a polar table
#[derive(Deserialize)]
struct PolarRows {
    wind_speeds: Vec<f64>,
    wind_angles: Vec<f64>,
    boat_speeds: Vec<Vec<f64>>,
}

impl TryFrom<PolarRows> for PolarTable {
    type Error = PolarError;

    fn try_from(rows: PolarRows) -> Result<Self, Self::Error> {
        PolarTable::new(rows.wind_speeds, rows.wind_angles, rows.boat_speeds)
    }
}

impl Default for PolarTable {
    fn default() -> Self {
        Self {
            wind_speeds: WIND_SPEEDS.to_vec(),
            wind_angles: WIND_ANGLES.to_vec(),
            boat_speeds: BOAT_SPEEDS.iter().map(|row| row.to_vec()).collect(),
        }
    }
}

/// Finds the bracketing indices and blend factor of `value` in sorted `axis`
fn bracket(axis: &[f64], value: f64) -> (usize, usize, f64) {
    let last = axis.len() - 1;
    if value <= axis[0] {
        return (0, 0, 0.0);
    }
    if value >= axis[last] {
        return (last, last, 0.0);
    }
    let upper = axis.iter().position(|v| *v >= value).unwrap_or(last);
    if axis[upper] == value {
        return (upper, upper, 0.0);
    }
    let lower = upper - 1;
    let t = (value - axis[lower]) / (axis[upper] - axis[lower]);
    (lower, upper, t)
}

/// Folds any angle difference into a true wind angle within [0, 180]
pub fn fold_wind_angle(angle: f64) -> f64 {
    let wrapped = angle.abs().rem_euclid(360.0);
    if wrapped > 180.0 {
        360.0 - wrapped
    } else {
        wrapped
    }
}

impl PolarTable {
    /// Builds a table from rows of boat speeds, one per wind speed
    ///
    /// Both axes must be non-empty and strictly increasing, and every row
    /// needs one entry per wind angle.
    pub fn new(
        wind_speeds: Vec<f64>,
        wind_angles: Vec<f64>,
        boat_speeds: Vec<Vec<f64>>,
    ) -> Result<Self, PolarError> {
        if wind_speeds.is_empty() || wind_angles.is_empty() {
            return Err(PolarError::Empty);
        }
        if !is_increasing(&wind_speeds) {
            return Err(PolarError::Unsorted("wind speed"));
        }
        if !is_increasing(&wind_angles) {
            return Err(PolarError::Unsorted("wind angle"));
        }
        if boat_speeds.len() != wind_speeds.len() {
            return Err(PolarError::RowCount {
                expected: wind_speeds.len(),
                found: boat_speeds.len(),
            });
        }
        if let Some((row, speeds)) = boat_speeds
            .iter()
            .enumerate()
            .find(|(_, speeds)| speeds.len() != wind_angles.len())
        {
            return Err(PolarError::RowLength {
                row,
                expected: wind_angles.len(),
                found: speeds.len(),
            });
        }
        Ok(Self {
            wind_speeds,
            wind_angles,
            boat_speeds,
        })
    }

    /// Boat speed in knots for a wind speed in knots and a true wind angle
    pub fn boat_speed(&self, wind_knots: f64, true_wind_angle: f64) -> f64 {
        let twa = fold_wind_angle(true_wind_angle);
        let (w0, w1, wt) = bracket(&self.wind_speeds, wind_knots);
        let (a0, a1, at) = bracket(&self.wind_angles, twa);

        let low = lerp(self.boat_speeds[w0][a0], self.boat_speeds[w0][a1], at);
        let high = lerp(self.boat_speeds[w1][a0], self.boat_speeds[w1][a1], at);
        lerp(low, high, wt)
    }

    /// True wind angle with the highest boat speed at this wind speed
    pub fn optimal_angle(&self, wind_knots: f64) -> f64 {
        self.best_angle(wind_knots, 0..=180, |speed, _| speed)
    }

    /// Best upwind and downwind true wind angles for velocity made good
    pub fn vmg_angles(&self, wind_knots: f64) -> (f64, f64) {
        let upwind = self.best_angle(wind_knots, 0..=90, |speed, twa| {
            speed * twa.to_radians().cos()
        });
        let downwind = self.best_angle(wind_knots, 90..=180, |speed, twa| {
            -speed * twa.to_radians().cos()
        });
        (upwind, downwind)
    }

    fn best_angle<F>(&self, wind_knots: f64, range: std::ops::RangeInclusive<u32>, score: F) -> f64
    where
        F: Fn(f64, f64) -> f64,
    {
        let mut best = (*range.start() as f64, f64::MIN);
        for degrees in range {
            let twa = degrees as f64;
            let value = score(self.boat_speed(wind_knots, twa), twa);
            if value > best.1 {
                best = (twa, value);
            }
        }
        best.0
    }
}

fn is_increasing(axis: &[f64]) -> bool {
    axis.windows(2).all(|pair| pair[0] < pair[1])
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}
