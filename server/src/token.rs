//! Collectable power-up tokens placed along the course

use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;
use shared::course::MarkOrder;
use shared::geo::{self, GeoPoint};
use shared::protocol::{TokenInfo, TokenType};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub location: GeoPoint,
}

impl Token {
    pub fn new(token_type: TokenType, location: GeoPoint) -> Self {
        Self {
            token_type,
            location,
        }
    }

    pub fn to_info(&self) -> TokenInfo {
        TokenInfo {
            token_type: self.token_type,
            position: self.location,
        }
    }

    pub fn is_within(&self, location: GeoPoint, radius: f64) -> bool {
        geo::distance(self.location, location) < radius
    }
}

/// Picks token types and spawn points for a course
///
/// Spawn points sit halfway along each leg, between the centres of
/// consecutive compound marks in the rounding order.
#[derive(Debug, Clone)]
pub struct TokenSpawner {
    spawn_points: Vec<GeoPoint>,
}

impl TokenSpawner {
    pub fn new(order: &MarkOrder) -> Self {
        let centres: Vec<GeoPoint> = order.iter().map(|c| c.mid_point()).collect();
        let spawn_points = centres
            .windows(2)
            .map(|pair| geo::dirty_mid_point(pair[0], pair[1]))
            .collect();
        Self { spawn_points }
    }

    pub fn spawn_points(&self) -> &[GeoPoint] {
        &self.spawn_points
    }

    /// A token of any type, random included, at a random spawn point
    pub fn random_token<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Token> {
        let location = *self.spawn_points.choose(rng)?;
        let token_type = *TokenType::ALL.choose(rng)?;
        debug!("Spawning {:?} token at {:?}", token_type, location);
        Some(Token::new(token_type, location))
    }
}

/// Resolves a random token into a concrete effect
///
/// With probability `resolve_probability` a concrete type is drawn;
/// otherwise the token stays `Random`, which acts as a speed penalty.
pub fn resolve_random<R: Rng + ?Sized>(rng: &mut R, resolve_probability: f64) -> TokenType {
    if rng.gen_bool(resolve_probability.clamp(0.0, 1.0)) {
        TokenType::CONCRETE
            .choose(rng)
            .copied()
            .unwrap_or(TokenType::Random)
    } else {
        TokenType::Random
    }
}

/// Name used in chatter announcements
pub fn display_name(token_type: TokenType) -> &'static str {
    match token_type {
        TokenType::Boost => "Boost",
        TokenType::Handling => "Handling",
        TokenType::WindWalker => "Wind Walker",
        TokenType::Bumper => "Bumper",
        TokenType::Random => "Random",
    }
}

/// Index of the first token within `radius` metres of `location`
pub fn find_pickup(tokens: &[Token], location: GeoPoint, radius: f64) -> Option<usize> {
    tokens.iter().position(|token| token.is_within(location, radius))
}
