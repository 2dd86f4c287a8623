//! Deterministic two-player stance-based duel: the authoritative server
//! simulation and the client-side prediction layer that consumes it.

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
