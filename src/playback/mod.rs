//! Playback of synthesized speech
//!
//! - `PlaybackScheduler`: gapless placement of inbound buffers on the output clock
//! - `InterruptionHandler`: barge-in, halts everything that is queued or playing
//! - `decode_inline_audio`: inbound payload → `PlaybackBuffer`

mod decode;
mod interruption;
mod scheduler;

pub use decode::decode_inline_audio;
pub use interruption::InterruptionHandler;
pub use scheduler::{PlaybackScheduler, ScheduledBuffer};
