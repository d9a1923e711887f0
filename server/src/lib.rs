//! Fruit arena server library.
//!
//! This module exposes the server components for use in tests and binaries.

pub mod admission;
pub mod config;
pub mod error;
pub mod game_loop;
pub mod protocol;
pub mod routes;
pub mod spawn;
pub mod state;
pub mod ticker;
pub mod world;
pub mod ws;
