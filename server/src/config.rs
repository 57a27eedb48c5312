use serde::Deserialize;
use shared::{DEFAULT_PORT, STATE_UPDATES_PER_SECOND};
use std::time::Duration;

/// Network and scheduling settings for one server instance
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub tick_rate: u32,
    pub max_players: usize,
    pub race_id: u32,
    /// Outbound frames buffered per connection before a slow writer lags
    pub broadcast_capacity: usize,
    pub location_interval_ticks: u64,
    pub status_interval_ticks: u64,
    pub heartbeat_interval_ticks: u64,
    /// Time left for writers to flush the final race status once the race
    /// has finished, before the loop returns
    pub finish_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("127.0.0.1:{}", DEFAULT_PORT),
            tick_rate: STATE_UPDATES_PER_SECOND,
            max_players: 12,
            race_id: 1,
            broadcast_capacity: 1024,
            location_interval_ticks: 6,
            status_interval_ticks: 30,
            heartbeat_interval_ticks: 60,
            finish_grace: Duration::from_millis(500),
        }
    }
}

impl ServerConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
}

/// Physics, rounding, collision and power-up constants for a race
///
/// Deserialises from JSON with every field optional; missing fields keep
/// their default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RaceTuning {
    pub tick_rate: u32,
    /// Delay between the host starting the race and the start gun
    pub start_delay_ms: u64,

    pub initial_wind_direction: f64,
    pub initial_wind_speed: f64,
    pub min_wind_speed: f64,
    pub max_wind_speed: f64,
    pub wind_update_interval_ms: u64,

    /// Metres from a mark at which a yacht counts as inside its rounding zone
    pub rounding_distance: f64,

    pub yacht_collision_distance: f64,
    pub mark_collision_distance: f64,
    pub yacht_bounce_distance: f64,
    pub mark_bounce_distance: f64,
    pub boundary_bounce_distance: f64,
    pub collision_velocity_penalty: f64,

    pub tokens_enabled: bool,
    pub token_spawn_interval_ms: u64,
    pub token_pickup_distance: f64,
    pub power_up_timeout_ms: u64,
    pub velocity_boost_multiplier: f64,
    pub handling_boost_multiplier: f64,
    pub random_speed_penalty: f64,
    pub random_resolve_probability: f64,
    pub bumper_reach: f64,
    pub bumper_disable_ms: u64,

    /// Degrees turned per helm command or per tick while turning
    pub turn_step: f64,
}

impl Default for RaceTuning {
    fn default() -> Self {
        Self {
            tick_rate: STATE_UPDATES_PER_SECOND,
            start_delay_ms: 10_000,
            initial_wind_direction: 180.0,
            initial_wind_speed: 10_000.0,
            min_wind_speed: 8_000.0,
            max_wind_speed: 12_000.0,
            wind_update_interval_ms: 500,
            rounding_distance: 50.0,
            yacht_collision_distance: 15.0,
            mark_collision_distance: 10.0,
            yacht_bounce_distance: 30.0,
            mark_bounce_distance: 20.0,
            boundary_bounce_distance: 30.0,
            collision_velocity_penalty: 0.3,
            tokens_enabled: false,
            token_spawn_interval_ms: 30_000,
            token_pickup_distance: 15.0,
            power_up_timeout_ms: 10_000,
            velocity_boost_multiplier: 2.0,
            handling_boost_multiplier: 2.0,
            random_speed_penalty: 0.3,
            random_resolve_probability: 0.5,
            bumper_reach: 17.5,
            bumper_disable_ms: 5_000,
            turn_step: 3.0,
        }
    }
}

impl RaceTuning {
    /// Fixed simulation step in seconds
    pub fn dt(&self) -> f64 {
        1.0 / self.tick_rate.max(1) as f64
    }

    /// Number of ticks covering `ms` milliseconds, never less than one
    pub fn ticks_for(&self, ms: u64) -> u64 {
        (ms * self.tick_rate as u64 / 1000).max(1)
    }

    pub fn tick_ms(&self) -> u64 {
        1000 / self.tick_rate.max(1) as u64
    }
}
