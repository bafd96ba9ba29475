use tracing::{debug, info, warn};

use crate::audio::{AudioCaptureAdapter, AudioOutput};
use crate::live::LiveSink;
use crate::playback::{InterruptionHandler, PlaybackScheduler};

/// Every handle a session holds, in acquisition order
#[derive(Default)]
pub(crate) struct SessionResources {
    pub output: Option<Box<dyn AudioOutput>>,
    pub capture: Option<AudioCaptureAdapter>,
    pub sink: Option<Box<dyn LiveSink>>,
}

impl SessionResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release everything held, in acquisition order
    ///
    /// Never fails: each step logs its error and moves on, and each handle is
    /// taken so a second call is a no-op.
    pub async fn release(&mut self, scheduler: &mut PlaybackScheduler) {
        if let Some(mut output) = self.output.take() {
            let halted = InterruptionHandler::halt_all(scheduler, output.as_mut());
            if halted > 0 {
                debug!("Stopped {} playing buffer(s)", halted);
            }
            if let Err(e) = output.close() {
                warn!("Failed to close {} output: {:#}", output.name(), e);
            }
        } else {
            scheduler.drain_active();
            scheduler.reset_cursor();
        }

        if let Some(mut capture) = self.capture.take() {
            if capture.is_capturing() {
                if let Err(e) = capture.stop().await {
                    warn!("Failed to stop {} capture: {:#}", capture.name(), e);
                }
            }
            info!("Capture released after {} frame(s)", capture.frames_encoded());
        }

        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.close().await {
                debug!("Ignoring channel close failure: {:#}", e);
            }
        }
    }
}
