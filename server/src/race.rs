//! The race aggregate: course, wind, yachts and tokens
//!
//! A [`Race`] is owned by the simulation loop and only changes through its
//! methods. Each call to [`Race::tick`] advances the simulation by one fixed
//! step and returns the events that clients need to hear about. Connection
//! tasks never touch the race directly; they read the [`RaceSnapshot`]
//! published after every tick.

use crate::collision;
use crate::config::RaceTuning;
use crate::events::RaceEvent;
use crate::polar::PolarTable;
use crate::progression::ProgressCheck;
use crate::token::{self, Token, TokenSpawner};
use crate::wind::Wind;
use crate::yacht::{BoatShape, Yacht};
use log::{debug, info};
use rand::Rng;
use shared::course::{CourseDefinition, CourseError, MarkOrder};
use shared::geo::{self, GeoPoint};
use shared::protocol::{
    BoatAction, BoatLocationMessage, BoatStatus, BoatStatusEntry, CustomizeRequestType, Message,
    PowerUpEvent, RaceStage, RaceStatusMessage, TokenInfo, TokenType,
};
use std::collections::BTreeMap;
use thiserror::Error;

/// Metres behind the start line that yachts are placed in the lobby
const SPAWN_DISTANCE: f64 = 50.0;
/// Metres between neighbouring yachts on the spawn line
const SPAWN_SPACING: f64 = 30.0;
const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RaceError {
    #[error("the race has already left the lobby")]
    NotInLobby,
    #[error("the race is full ({0} yachts)")]
    Full(usize),
    #[error("yacht {0} is already racing")]
    DuplicateYacht(u32),
    #[error("no yacht with id {0}")]
    UnknownYacht(u32),
    #[error("invalid {0:?} customisation")]
    InvalidCustomization(CustomizeRequestType),
}

/// Chatter commands only the host may issue
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdminCommand {
    Speed(f64),
    Finish,
    Start,
}

impl AdminCommand {
    /// Parses a chatter line, ignoring an optional `sender: ` prefix
    pub fn parse(text: &str) -> Option<Self> {
        let body = match text.split_once(": ") {
            Some((_, rest)) => rest,
            None => text,
        };
        let mut words = body.split_whitespace();
        match words.next()? {
            "/speed" => words
                .next()?
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite() && *value > 0.0)
                .map(AdminCommand::Speed),
            "/finish" => Some(AdminCommand::Finish),
            "/start" => Some(AdminCommand::Start),
            _ => None,
        }
    }
}

/// Read-only view of one yacht for connection tasks
#[derive(Debug, Clone, PartialEq)]
pub struct YachtSnapshot {
    pub source_id: u32,
    pub name: String,
    pub location: GeoPoint,
    pub heading: f64,
    pub velocity: f64,
    pub sail_in: bool,
    pub status: BoatStatus,
    pub leg_number: u32,
    pub mark_seq: usize,
}

/// State published after every tick
#[derive(Debug, Clone, PartialEq)]
pub struct RaceSnapshot {
    pub tick: u64,
    pub stage: RaceStage,
    pub start_time_ms: u64,
    pub wind: Wind,
    pub yachts: Vec<YachtSnapshot>,
    pub tokens: Vec<TokenInfo>,
}

impl RaceSnapshot {
    pub fn race_status(&self, race_id: u32) -> Message {
        Message::RaceStatus(RaceStatusMessage {
            race_id,
            stage: self.stage,
            start_time: self.start_time_ms,
            wind_direction: self.wind.direction,
            wind_speed: self.wind.speed.round().clamp(0.0, u16::MAX as f64) as u16,
            boats: self
                .yachts
                .iter()
                .map(|yacht| BoatStatusEntry {
                    source_id: yacht.source_id,
                    status: yacht.status,
                    leg: yacht.leg_number.min(u8::MAX as u32) as u8,
                    mark_seq: yacht.mark_seq.min(u8::MAX as usize) as u8,
                })
                .collect(),
        })
    }

    /// One location message per yacht, numbered from `sequence`
    pub fn boat_locations(&self, sequence: u32) -> Vec<Message> {
        self.yachts
            .iter()
            .enumerate()
            .map(|(i, yacht)| {
                Message::BoatLocation(BoatLocationMessage {
                    source_id: yacht.source_id,
                    sequence: sequence.wrapping_add(i as u32),
                    position: yacht.location,
                    heading: yacht.heading,
                    speed: yacht.velocity.round().clamp(0.0, u16::MAX as f64) as u16,
                    sail_in: yacht.sail_in,
                })
            })
            .collect()
    }
}

pub struct Race {
    name: String,
    order: MarkOrder,
    boundary: Vec<GeoPoint>,
    mark_positions: Vec<GeoPoint>,
    max_players: usize,
    tuning: RaceTuning,
    polar: PolarTable,
    spawner: TokenSpawner,

    stage: RaceStage,
    start_time_ms: u64,
    wind: Wind,
    yachts: BTreeMap<u32, Yacht>,
    tokens: Vec<Token>,
    speed_multiplier: f64,
    tick_count: u64,
}

impl Race {
    /// Builds a race in the lobby stage from a course definition
    ///
    /// The course is validated into a [`MarkOrder`] first, so a course
    /// without a start and finish line is rejected here. Tokens are enabled
    /// when either the course or the tuning asks for them.
    pub fn new(course: &CourseDefinition, mut tuning: RaceTuning) -> Result<Self, CourseError> {
        let order = course.validate()?;
        let mark_positions = order.unique_marks().iter().map(|mark| mark.position).collect();
        let spawner = TokenSpawner::new(&order);
        tuning.tokens_enabled |= course.tokens_enabled;
        let wind = Wind::new(tuning.initial_wind_direction, tuning.initial_wind_speed);

        info!(
            "Race '{}' ready: {} legs, tokens {}",
            course.name,
            order.len() - 1,
            if tuning.tokens_enabled { "on" } else { "off" }
        );

        Ok(Self {
            name: course.name.clone(),
            order,
            boundary: course.boundary.clone(),
            mark_positions,
            max_players: course.max_players,
            tuning,
            polar: PolarTable::default(),
            spawner,
            stage: RaceStage::Lobbying,
            start_time_ms: 0,
            wind,
            yachts: BTreeMap::new(),
            tokens: Vec::new(),
            speed_multiplier: 1.0,
            tick_count: 0,
        })
    }

    /// Replaces the built-in polar table used for boat speeds
    pub fn with_polar(mut self, polar: PolarTable) -> Self {
        self.polar = polar;
        self
    }

    pub fn polar(&self) -> &PolarTable {
        &self.polar
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> RaceStage {
        self.stage
    }

    pub fn start_time_ms(&self) -> u64 {
        self.start_time_ms
    }

    pub fn wind(&self) -> Wind {
        self.wind
    }

    pub fn speed_multiplier(&self) -> f64 {
        self.speed_multiplier
    }

    pub fn mark_order(&self) -> &MarkOrder {
        &self.order
    }

    pub fn tuning(&self) -> &RaceTuning {
        &self.tuning
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn yacht(&self, source_id: u32) -> Option<&Yacht> {
        self.yachts.get(&source_id)
    }

    pub fn yacht_mut(&mut self, source_id: u32) -> Option<&mut Yacht> {
        self.yachts.get_mut(&source_id)
    }

    pub fn yachts(&self) -> impl Iterator<Item = &Yacht> {
        self.yachts.values()
    }

    pub fn yacht_count(&self) -> usize {
        self.yachts.len()
    }

    /// Places a new yacht behind the start line, facing the first mark
    ///
    /// Yachts fan out sideways from the centre of the line: 0, +30, -30,
    /// +60 metres and so on.
    ///
    /// # Errors
    /// - [`RaceError::NotInLobby`] once the countdown has begun
    /// - [`RaceError::DuplicateYacht`] if the id is already sailing
    /// - [`RaceError::Full`] when the course's player limit is reached
    pub fn add_yacht(&mut self, source_id: u32) -> Result<&Yacht, RaceError> {
        if self.stage != RaceStage::Lobbying {
            return Err(RaceError::NotInLobby);
        }
        if self.yachts.contains_key(&source_id) {
            return Err(RaceError::DuplicateYacht(source_id));
        }
        if self.yachts.len() >= self.max_players {
            return Err(RaceError::Full(self.max_players));
        }

        let location = self.spawn_location(self.yachts.len());
        let heading = self
            .order
            .next(0)
            .map(|next| geo::bearing(location, next.mid_point()))
            .unwrap_or(0.0);

        info!("Yacht {} joined the race", source_id);
        let yacht = self
            .yachts
            .entry(source_id)
            .or_insert_with(|| Yacht::new(source_id, location, heading));
        Ok(yacht)
    }

    fn spawn_location(&self, index: usize) -> GeoPoint {
        let (Some(start), Some(next)) = (self.order.current(0), self.order.next(0)) else {
            return GeoPoint::new(0.0, 0.0);
        };
        let centre = start.mid_point();
        let course_bearing = geo::bearing(centre, next.mid_point());
        let behind = geo::destination(centre, course_bearing + 180.0, SPAWN_DISTANCE);

        let rank = ((index + 1) / 2) as f64 * SPAWN_SPACING;
        if rank == 0.0 {
            behind
        } else if index % 2 == 1 {
            geo::destination(behind, course_bearing + 90.0, rank)
        } else {
            geo::destination(behind, course_bearing - 90.0, rank)
        }
    }

    /// Takes a yacht out of the race, returning it if it was present
    ///
    /// Allowed in every stage. While racing, if every remaining yacht has
    /// already finished, the race finishes on the next tick.
    pub fn remove_yacht(&mut self, source_id: u32) -> Option<Yacht> {
        let removed = self.yachts.remove(&source_id);
        if removed.is_some() {
            info!("Yacht {} left the race", source_id);
        }
        removed
    }

    /// Applies a helm command from the yacht's owner
    ///
    /// Actions are accepted in the lobby too, so players can trim and
    /// point their yacht before the start.
    pub fn apply_action(&mut self, source_id: u32, action: BoatAction) -> Result<(), RaceError> {
        let yacht = self
            .yachts
            .get_mut(&source_id)
            .ok_or(RaceError::UnknownYacht(source_id))?;
        yacht.apply_action(action, &self.wind, &self.polar, &self.tuning);
        Ok(())
    }

    /// Applies a cosmetic change requested by the yacht's owner
    ///
    /// - Name: UTF-8, trimmed, between 1 and 64 bytes
    /// - Color: the first three bytes as RGB
    /// - Shape: a boat shape name such as `YACHT` or `CATAMARAN`
    ///
    /// Anything else is rejected with [`RaceError::InvalidCustomization`]
    /// and leaves the yacht unchanged.
    pub fn customize(
        &mut self,
        source_id: u32,
        request: CustomizeRequestType,
        data: &[u8],
    ) -> Result<(), RaceError> {
        let yacht = self
            .yachts
            .get_mut(&source_id)
            .ok_or(RaceError::UnknownYacht(source_id))?;
        let invalid = RaceError::InvalidCustomization(request);

        match request {
            CustomizeRequestType::Name => {
                let name = std::str::from_utf8(data).map_err(|_| invalid.clone())?.trim();
                if name.is_empty() || name.len() > MAX_NAME_LEN {
                    return Err(invalid);
                }
                yacht.name = name.to_string();
            }
            CustomizeRequestType::Color => {
                let [r, g, b, ..] = data else {
                    return Err(invalid);
                };
                yacht.color = [*r, *g, *b];
            }
            CustomizeRequestType::Shape => {
                let name = std::str::from_utf8(data).map_err(|_| invalid.clone())?;
                yacht.shape = BoatShape::from_name(name).ok_or(invalid)?;
            }
        }
        debug!("Yacht {} customised its {:?}", source_id, request);
        Ok(())
    }

    /// Moves from the lobby to the pre-race countdown
    ///
    /// The start gun fires `start_delay_ms` after `now_ms`; the first tick at
    /// or past that time switches the race to racing. Outside the lobby
    /// this does nothing and returns no events.
    pub fn schedule_start(&mut self, now_ms: u64) -> Vec<RaceEvent> {
        if self.stage != RaceStage::Lobbying {
            return Vec::new();
        }
        self.stage = RaceStage::PreRace;
        self.start_time_ms = now_ms + self.tuning.start_delay_ms;
        info!("Race starts at {} ms", self.start_time_ms);
        vec![
            RaceEvent::StageChanged(RaceStage::PreRace),
            RaceEvent::announcement(format!(
                "Race starts in {} seconds",
                self.tuning.start_delay_ms / 1000
            )),
        ]
    }

    /// Ends the race immediately, marking every yacht finished
    pub fn finish_race(&mut self) -> Vec<RaceEvent> {
        if self.stage == RaceStage::Finished {
            return Vec::new();
        }
        for yacht in self.yachts.values_mut() {
            yacht.status = BoatStatus::Finished;
        }
        self.stage = RaceStage::Finished;
        info!("Race finished by host");
        vec![RaceEvent::StageChanged(RaceStage::Finished)]
    }

    /// Scales every yacht's polar speed, as set by the host's `/speed`
    pub fn set_speed_multiplier(&mut self, multiplier: f64) {
        self.speed_multiplier = multiplier;
    }

    /// Handles a chatter line: host commands are applied, anything else is relayed
    ///
    /// Only the host may use `/start`, `/finish` and `/speed <x>`; the
    /// command may follow a `Name: ` prefix. The same text from anyone else
    /// is relayed to every client as ordinary chatter.
    pub fn handle_chatter(
        &mut self,
        message_type: u8,
        text: &str,
        is_host: bool,
        now_ms: u64,
    ) -> Vec<RaceEvent> {
        let command = if is_host { AdminCommand::parse(text) } else { None };
        let Some(command) = command else {
            return vec![RaceEvent::Chatter {
                message_type,
                text: text.to_string(),
            }];
        };

        match command {
            AdminCommand::Speed(multiplier) => {
                self.set_speed_multiplier(multiplier);
                vec![RaceEvent::announcement(format!(
                    "Speed modifier set to x{}",
                    multiplier
                ))]
            }
            AdminCommand::Finish => {
                let mut events = vec![RaceEvent::announcement("Game will now finish")];
                events.extend(self.finish_race());
                events
            }
            AdminCommand::Start => self.schedule_start(now_ms),
        }
    }

    /// Replaces the tokens in play
    pub fn place_token(&mut self, token: Token) -> RaceEvent {
        self.tokens = vec![token];
        RaceEvent::TokensChanged(self.token_infos())
    }

    fn token_infos(&self) -> Vec<TokenInfo> {
        self.tokens.iter().map(Token::to_info).collect()
    }

    /// Advances the race by one fixed step
    pub fn tick<R: Rng + ?Sized>(&mut self, now_ms: u64, rng: &mut R) -> Vec<RaceEvent> {
        let mut events = Vec::new();
        self.tick_count += 1;

        match self.stage {
            RaceStage::Lobbying | RaceStage::Finished => return events,
            RaceStage::PreRace if now_ms >= self.start_time_ms => {
                self.stage = RaceStage::Racing;
                for yacht in self.yachts.values_mut() {
                    if yacht.status == BoatStatus::NotStarted {
                        yacht.status = BoatStatus::Racing;
                    }
                }
                info!("Race started with {} yachts", self.yachts.len());
                events.push(RaceEvent::StageChanged(RaceStage::Racing));
            }
            _ => {}
        }

        if self.stage == RaceStage::Racing
            && self.tick_count % self.tuning.ticks_for(self.tuning.wind_update_interval_ms) == 0
        {
            self.wind
                .update(rng, self.tuning.min_wind_speed, self.tuning.max_wind_speed);
        }
        if self.stage == RaceStage::Racing
            && self.tuning.tokens_enabled
            && self.tick_count % self.tuning.ticks_for(self.tuning.token_spawn_interval_ms) == 0
        {
            if let Some(token) = self.spawner.random_token(rng) {
                events.push(self.place_token(token));
            }
        }

        let wind = self.wind;
        let dt = self.tuning.dt();
        for yacht in self.yachts.values_mut() {
            yacht.update_velocity(&self.polar, &wind, self.speed_multiplier, now_ms);
            yacht.run_autopilot(&wind, &self.tuning);
            yacht.move_forward(dt);
        }

        let ids: Vec<u32> = self.yachts.keys().copied().collect();
        for id in ids {
            self.update_tokens(id, now_ms, rng, &mut events);
            self.check_collision(id, &mut events);
            self.check_progression(id, now_ms, &mut events);
        }

        if self.stage == RaceStage::Racing
            && !self.yachts.is_empty()
            && self.yachts.values().all(Yacht::is_finished)
        {
            self.stage = RaceStage::Finished;
            info!("All yachts finished, race over");
            events.push(RaceEvent::StageChanged(RaceStage::Finished));
        }

        events
    }

    fn update_tokens<R: Rng + ?Sized>(
        &mut self,
        source_id: u32,
        now_ms: u64,
        rng: &mut R,
        events: &mut Vec<RaceEvent>,
    ) {
        let Some(location) = self.yachts.get(&source_id).map(|y| y.location) else {
            return;
        };
        if let Some(index) =
            token::find_pickup(&self.tokens, location, self.tuning.token_pickup_distance)
        {
            let picked = self.tokens.remove(index);
            events.push(RaceEvent::TokensChanged(self.token_infos()));
            self.grant_power_up(source_id, picked, now_ms, rng, events);
        }

        self.expire_power_up(source_id, now_ms, events);

        let Some(yacht) = self.yachts.get(&source_id) else {
            return;
        };
        let power_up = yacht.power_up;
        match power_up {
            Some(TokenType::WindWalker) => {
                let optimal = self.polar.optimal_angle(self.wind.speed_knots());
                let direction = (yacht.heading + optimal).round() as i64;
                self.wind.direction = direction.rem_euclid(360) as f64;
            }
            Some(TokenType::Bumper) => {
                let reach = self.tuning.bumper_reach;
                if let Some(victim) = collision::closest_yacht(yacht, &self.yachts, reach) {
                    self.bump(source_id, victim, now_ms, events);
                }
            }
            _ => {}
        }
    }

    fn grant_power_up<R: Rng + ?Sized>(
        &mut self,
        source_id: u32,
        picked: Token,
        now_ms: u64,
        rng: &mut R,
        events: &mut Vec<RaceEvent>,
    ) {
        let token_type = match picked.token_type {
            TokenType::Random => {
                token::resolve_random(rng, self.tuning.random_resolve_probability)
            }
            other => other,
        };

        if token_type == TokenType::WindWalker {
            let holders: Vec<u32> = self
                .yachts
                .values()
                .filter(|y| y.source_id != source_id && y.power_up == Some(TokenType::WindWalker))
                .map(|y| y.source_id)
                .collect();
            for holder in holders {
                self.power_down(holder, events);
            }
        }

        let Some(yacht) = self.yachts.get_mut(&source_id) else {
            return;
        };
        yacht.power_up(token_type, now_ms, &self.tuning);
        debug!("Yacht {} got power-up {:?}", source_id, token_type);
        events.push(RaceEvent::PowerUp {
            source_id,
            event: PowerUpEvent::PickedUp,
            token_type,
        });
        events.push(RaceEvent::announcement(format!(
            "{} has picked up a {} token",
            yacht.name,
            token::display_name(token_type)
        )));
    }

    fn expire_power_up(&mut self, source_id: u32, now_ms: u64, events: &mut Vec<RaceEvent>) {
        let expired = self.yachts.get(&source_id).is_some_and(|yacht| {
            yacht.power_up.is_some()
                && now_ms.saturating_sub(yacht.power_up_started_ms) > self.tuning.power_up_timeout_ms
        });
        if expired {
            self.power_down(source_id, events);
        }
    }

    fn power_down(&mut self, source_id: u32, events: &mut Vec<RaceEvent>) {
        let Some(yacht) = self.yachts.get_mut(&source_id) else {
            return;
        };
        let Some(token_type) = yacht.power_up else {
            return;
        };
        yacht.power_down();
        debug!("Yacht {} powered down", source_id);
        events.push(RaceEvent::PowerUp {
            source_id,
            event: PowerUpEvent::Expired,
            token_type,
        });
        events.push(RaceEvent::announcement(format!(
            "{}'s {} expired",
            yacht.name,
            token::display_name(token_type)
        )));
    }

    fn bump(&mut self, holder: u32, victim: u32, now_ms: u64, events: &mut Vec<RaceEvent>) {
        if let Some(yacht) = self.yachts.get_mut(&holder) {
            yacht.power_down();
        }
        if let Some(yacht) = self.yachts.get_mut(&victim) {
            yacht.disabled_until_ms = Some(now_ms + self.tuning.bumper_disable_ms);
        }
        debug!("Yacht {} bumped yacht {}", holder, victim);
        events.push(RaceEvent::PowerUp {
            source_id: holder,
            event: PowerUpEvent::Expired,
            token_type: TokenType::Bumper,
        });
        events.push(RaceEvent::PowerUp {
            source_id: victim,
            event: PowerUpEvent::Disabled,
            token_type: TokenType::Bumper,
        });
    }

    fn check_collision(&mut self, source_id: u32, events: &mut Vec<RaceEvent>) {
        let Some(yacht) = self.yachts.get(&source_id) else {
            return;
        };
        let Some(hit) = collision::detect(
            yacht,
            &self.yachts,
            &self.mark_positions,
            &self.boundary,
            &self.tuning,
        ) else {
            return;
        };

        debug!("Yacht {} collided: {:?}", source_id, hit);
        collision::resolve(&mut self.yachts, source_id, hit, &self.tuning);
        events.push(RaceEvent::Collision {
            source_id,
            kind: hit.kind(),
        });
    }

    fn check_progression(&mut self, source_id: u32, now_ms: u64, events: &mut Vec<RaceEvent>) {
        let check = ProgressCheck {
            order: &self.order,
            now_ms,
            start_time_ms: self.start_time_ms,
            rounding_distance: self.tuning.rounding_distance,
        };
        let Some(yacht) = self.yachts.get_mut(&source_id) else {
            return;
        };
        if let Some(progress) = check.check(yacht) {
            events.push(RaceEvent::MarkRounded(progress));
        }
    }

    /// Copies the state clients need to see out of the race
    ///
    /// Snapshots are published after every tick so connection tasks can
    /// answer registrations without touching the race itself.
    pub fn snapshot(&self) -> RaceSnapshot {
        RaceSnapshot {
            tick: self.tick_count,
            stage: self.stage,
            start_time_ms: self.start_time_ms,
            wind: self.wind,
            yachts: self
                .yachts
                .values()
                .map(|yacht| YachtSnapshot {
                    source_id: yacht.source_id,
                    name: yacht.name.clone(),
                    location: yacht.location,
                    heading: yacht.heading,
                    velocity: yacht.velocity,
                    sail_in: yacht.sail_in,
                    status: yacht.status,
                    leg_number: yacht.leg_number,
                    mark_seq: yacht.current_mark_seq(),
                })
                .collect(),
            tokens: self.token_infos(),
        }
    }
}
