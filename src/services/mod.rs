//! Domain services.
//!
//! SYSTEM CONTEXT
//! ==============
//! Services own state and rules. The websocket layer parses frames and hands
//! them to a `hub::Channel`, which runs the matching handler against its
//! store and fans the outcome out to connected clients.

pub mod auth;
pub mod game;
pub mod hub;
pub mod sync;
