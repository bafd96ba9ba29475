use anyhow::Result;
use std::collections::BTreeMap;
use tracing::debug;

use crate::audio::{AudioOutput, BufferId, PlaybackBuffer};

/// A buffer placed on the output timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledBuffer {
    pub id: BufferId,
    /// Start on the output clock, seconds
    pub start_time: f64,
    /// Duration in seconds
    pub duration: f64,
}

impl ScheduledBuffer {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// Gapless scheduler for inbound speech buffers
///
/// Each buffer starts at `max(next_start_time, output clock)` and pushes the
/// cursor forward by its duration. When arrival keeps pace with playback the
/// buffers join end to end; when the network stalls, the next buffer starts at
/// the live clock instead of a stale cursor, so ordering is never corrupted.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_start_time: f64,
    active: BTreeMap<BufferId, ScheduledBuffer>,
    next_id: BufferId,
    scheduled_total: u64,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `buffer` on the output right after the previously scheduled one
    pub fn schedule(
        &mut self,
        buffer: &PlaybackBuffer,
        output: &mut dyn AudioOutput,
    ) -> Result<ScheduledBuffer> {
        let start_time = self.next_start_time.max(output.current_time());
        let id = self.next_id;

        output.schedule(id, buffer, start_time)?;

        let scheduled = ScheduledBuffer {
            id,
            start_time,
            duration: buffer.duration_secs(),
        };

        self.next_id += 1;
        self.scheduled_total += 1;
        self.next_start_time = scheduled.end_time();
        self.active.insert(id, scheduled);

        debug!(
            "Scheduled buffer {} at {:.3}s for {:.3}s ({} active)",
            id,
            start_time,
            scheduled.duration,
            self.active.len()
        );

        Ok(scheduled)
    }

    /// Fire completion for every buffer that finished by `now`
    ///
    /// Returns the buffers that completed.
    pub fn retire_finished(&mut self, now: f64) -> Vec<ScheduledBuffer> {
        let finished: Vec<BufferId> = self
            .active
            .values()
            .filter(|b| b.end_time() <= now)
            .map(|b| b.id)
            .collect();

        finished
            .into_iter()
            .filter_map(|id| self.active.remove(&id))
            .collect()
    }

    /// Take every active buffer out of the set, leaving the cursor alone
    pub(crate) fn drain_active(&mut self) -> Vec<ScheduledBuffer> {
        std::mem::take(&mut self.active).into_values().collect()
    }

    /// Reset the cursor to zero
    pub(crate) fn reset_cursor(&mut self) {
        self.next_start_time = 0.0;
    }

    /// True while at least one buffer is playing or queued
    pub fn is_speaking(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn active(&self) -> impl Iterator<Item = &ScheduledBuffer> {
        self.active.values()
    }

    /// Buffers scheduled over the scheduler's lifetime
    pub fn scheduled_total(&self) -> u64 {
        self.scheduled_total
    }
}
