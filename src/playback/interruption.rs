use tracing::{debug, info};

use super::scheduler::PlaybackScheduler;
use crate::audio::AudioOutput;

/// Silences in-flight model speech on barge-in
///
/// Every active buffer is stopped on the output, the active set is cleared and the
/// cursor goes back to zero, so the next buffer starts at the live clock. Stop
/// failures are expected (a buffer can finish on its own in the same instant) and
/// only logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct InterruptionHandler;

impl InterruptionHandler {
    /// Returns how many buffers were halted
    pub fn interrupt(scheduler: &mut PlaybackScheduler, output: &mut dyn AudioOutput) -> usize {
        let halted = Self::halt_all(scheduler, output);
        info!("Interrupted: halted {} buffer(s)", halted);
        halted
    }

    /// Stop and forget every active buffer, then reset the cursor
    pub(crate) fn halt_all(scheduler: &mut PlaybackScheduler, output: &mut dyn AudioOutput) -> usize {
        let active = scheduler.drain_active();

        for buffer in &active {
            if let Err(e) = output.stop(buffer.id) {
                debug!("Ignoring stop failure for buffer {}: {}", buffer.id, e);
            }
        }

        scheduler.reset_cursor();

        active.len()
    }
}
