//! Live session management
//!
//! This module provides the `SessionController` that manages:
//! - Capture and playback device acquisition
//! - The live channel to the remote speech service
//! - Gapless playback of synthesized speech and barge-in
//! - Transcript turns and the output volume signal
//! - Idempotent teardown and session statistics

mod config;
mod controller;
mod devices;
mod resources;
mod state;
mod stats;

pub use config::SessionConfig;
pub use controller::SessionController;
pub use devices::{AudioDevices, SystemDevices};
pub use state::{SessionSnapshot, SessionState};
pub use stats::SessionStats;
