//! Handheld controller for the runner lights: reads a thumbstick and a
//! button and streams frames to the lights host over ESP-NOW.
//!
//! Wiring quirks of a particular controller are chosen at build time from a
//! local `.env` file, see [`env_flags`].

pub mod env_flags;
pub mod input;
pub mod link;

#[cfg(target_os = "espidf")]
pub mod firmware;
