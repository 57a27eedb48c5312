//! # Race Server Library
//!
//! This library provides the authoritative server for a multiplayer sailing
//! race. It owns the canonical race state, applies player commands, runs the
//! physics at a fixed tick rate and streams the outcome to every connected
//! client over TCP.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Yacht speed comes from a polar table and the current wind; headings,
//! sails and autopilot modes change only through player actions. Mark
//! roundings, collisions and power-ups are all decided here, and clients
//! simply render what they are told.
//!
//! ### Client Management
//! Handles the lifecycle of client connections:
//! - Registration as a player (owns a yacht) or spectator (watch only)
//! - Capacity limits and late-join refusal once the race has started
//! - Host selection for admin chatter commands
//! - Disconnection handling and yacht removal
//!
//! ### State Broadcasting
//! Every tick's events (roundings, collisions, token changes, chatter) are
//! encoded once and fanned out to all writers. Boat locations, race status
//! and heartbeats go out on fixed tick intervals.
//!
//! ## Architecture Design
//!
//! ### Single Owner Simulation Loop
//! The [`race::Race`] aggregate is owned by one loop. Connection tasks talk
//! to it only through a command channel and read a published snapshot, so
//! the simulation needs no locks and ticks deterministically for a given
//! random seed.
//!
//! ### TCP Framed Protocol
//! Messages travel in CRC32-checked frames defined in the `shared` crate.
//! A frame with a bad checksum is dropped; the stream resynchronises on the
//! next sync header.
//!
//! ## Module Organization
//!
//! - `client_manager`: registered connections, capacity and host
//! - `collision`: yacht, mark and boundary collision detection and bounce
//! - `config`: server settings and race tuning constants
//! - `events`: race events and their wire messages
//! - `network`: TCP sessions and the tick loop
//! - `polar`: boat speed lookup by true wind angle
//! - `progression`: mark rounding and finish detection
//! - `race`: the race aggregate tying everything together
//! - `token`: power-up tokens and their spawn points
//! - `wind`: wind state and its random drift
//! - `yacht`: per-yacht state, actions and movement

pub mod client_manager;
pub mod collision;
pub mod config;
pub mod events;
pub mod network;
pub mod polar;
pub mod progression;
pub mod race;
pub mod token;
pub mod wind;
pub mod yacht;
