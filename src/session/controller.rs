use chrono::Utc;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::devices::AudioDevices;
use super::resources::SessionResources;
use super::state::{SessionSnapshot, SessionState};
use super::stats::{SessionCounters, SessionStats, SessionWindow};
use crate::audio::AudioFrame;
use crate::error::{SessionError, SessionResult};
use crate::live::{LiveConfig, LiveConnector, LiveEvent, ServerMessage};
use crate::meter::VolumeMeter;
use crate::persona::PersonaConfig;
use crate::playback::{decode_inline_audio, InterruptionHandler, PlaybackScheduler};
use crate::transcript::{Speaker, TranscriptAggregator, TranscriptTurn};

/// Owns the connect/disconnect lifecycle of live voice sessions
///
/// One controller runs at most one session at a time. Each session is a dedicated
/// task that owns the playback scheduler, transcript aggregator, volume meter and
/// every device/channel handle; the controller only signals it and reads what it
/// publishes.
pub struct SessionController {
    /// Session configuration
    config: SessionConfig,

    /// Opens the remote channel
    connector: Arc<dyn LiveConnector>,

    /// Acquires capture and playback devices
    devices: Arc<dyn AudioDevices>,

    /// Observable state for the UI
    snapshot_tx: watch::Sender<SessionSnapshot>,

    /// Finished turns, kept across sessions
    transcripts: Arc<Mutex<Vec<TranscriptTurn>>>,

    /// Counters updated by the session task
    counters: Arc<SessionCounters>,

    /// Identity and span of the current session
    window: Arc<Mutex<SessionWindow>>,

    /// Pending connect or running session task
    active: Mutex<Slot>,
}

#[derive(Default)]
enum Slot {
    #[default]
    Empty,
    Connecting(PendingConnect),
    Running(ActiveSession),
}

/// A `connect()` still acquiring its handles
struct PendingConnect {
    cancel: oneshot::Sender<()>,

    /// Resolves once the attempt has released what it acquired, or was dropped
    released: oneshot::Receiver<()>,
}

struct ActiveSession {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn LiveConnector>,
        devices: Arc<dyn AudioDevices>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());

        Self {
            config,
            connector,
            devices,
            snapshot_tx,
            transcripts: Arc::new(Mutex::new(Vec::new())),
            counters: Arc::new(SessionCounters::default()),
            window: Arc::new(Mutex::new(SessionWindow::default())),
            active: Mutex::new(Slot::Empty),
        }
    }

    /// Acquire devices, open the live channel and start streaming
    ///
    /// Any failure leaves the controller in `Failed` with exactly one error and
    /// every partially acquired resource released. A `disconnect()` issued while
    /// this is pending cancels it: handles are released, the state ends in
    /// `Closed` and this returns `Cancelled`.
    pub async fn connect(&self, persona: &PersonaConfig) -> SessionResult<()> {
        let (mut cancel_rx, released_tx) = {
            let mut active = self.active.lock().await;

            let state = self.snapshot_tx.borrow().state;
            if !state.can_connect() {
                warn!("Connect ignored: session is {}", state);
                return Err(SessionError::AlreadyActive);
            }

            // Reap a session task that already ended on its own
            if let Slot::Running(previous) = std::mem::take(&mut *active) {
                if let Err(e) = previous.task.await {
                    error!("Previous session task panicked: {}", e);
                }
            }

            let (cancel_tx, cancel_rx) = oneshot::channel();
            let (released_tx, released_rx) = oneshot::channel();
            *active = Slot::Connecting(PendingConnect {
                cancel: cancel_tx,
                released: released_rx,
            });

            self.snapshot_tx.send_modify(|s| {
                s.state = SessionState::Connecting;
                s.error = None;
                s.is_speaking = false;
                s.volume = 0.0;
            });

            (cancel_rx, released_tx)
        };

        let session_id = format!("live-{}", uuid::Uuid::new_v4());
        info!(
            "Connecting session {} via {} (voice={})",
            session_id,
            self.connector.name(),
            persona.voice_name
        );

        let mut resources = SessionResources::new();
        let mut scheduler = PlaybackScheduler::new();

        let acquired = tokio::select! {
            biased;

            _ = &mut cancel_rx => None,
            result = self.acquire(persona, &mut resources) => Some(result),
        };

        let mut active = self.active.lock().await;

        // disconnect() takes the pending slot before signalling cancel
        let still_pending = matches!(*active, Slot::Connecting(_));

        let streams = match acquired {
            Some(Ok(streams)) if still_pending => streams,
            Some(Err(err)) => {
                error!("Failed to connect session {}: {}", session_id, err);
                if still_pending {
                    *active = Slot::Empty;
                }
                resources.release(&mut scheduler).await;
                self.snapshot_tx.send_modify(|s| {
                    s.state = SessionState::Failed;
                    s.error = Some(err.clone());
                });
                return Err(err);
            }
            _ => {
                info!("Connect of session {} cancelled", session_id);
                drop(active);
                resources.release(&mut scheduler).await;
                let _ = released_tx.send(());
                return Err(SessionError::Cancelled);
            }
        };

        self.counters.reset();
        *self.window.lock().await = SessionWindow::open(session_id.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = SessionTask {
            resources,
            scheduler,
            aggregator: TranscriptAggregator::new(),
            meter: VolumeMeter::new(self.config.fft_size),
            snapshot_tx: self.snapshot_tx.clone(),
            transcripts: Arc::clone(&self.transcripts),
            counters: Arc::clone(&self.counters),
            window: Arc::clone(&self.window),
        };

        // Open before spawning: the task owns every later transition
        self.snapshot_tx.send_modify(|s| s.state = SessionState::Open);
        info!("Session {} open", session_id);

        let display_interval = self.config.display_interval;
        let handle = tokio::spawn(task.run(shutdown_rx, streams, display_interval));

        *active = Slot::Running(ActiveSession {
            shutdown: shutdown_tx,
            task: handle,
        });

        Ok(())
    }

    /// Acquire output, capture and channel, then start capture
    async fn acquire(
        &self,
        persona: &PersonaConfig,
        resources: &mut SessionResources,
    ) -> SessionResult<SessionStreams> {
        let output = self
            .devices
            .open_output(self.config.output_sample_rate)
            .map_err(SessionError::device)?;
        info!("Playback output: {} at {} Hz", output.name(), output.sample_rate());
        resources.output = Some(output);

        let capture = self
            .devices
            .open_capture(self.config.capture.clone())
            .map_err(SessionError::device)?;
        info!("Capture source: {}", capture.name());
        resources.capture = Some(capture);

        let channel = self
            .connector
            .open(&LiveConfig::from(persona))
            .await
            .map_err(SessionError::channel_open)?;
        resources.sink = Some(channel.sink);

        let mut events = channel.events;
        wait_for_open(&mut events).await?;

        let frames = match resources.capture.as_mut() {
            Some(capture) => capture.start().await.map_err(SessionError::device)?,
            None => return Err(SessionError::Device("Capture device was released".to_string())),
        };

        Ok(SessionStreams { frames, events })
    }

    /// Stop the session and release everything it holds
    ///
    /// Idempotent and safe to call when never connected or while `connect()` is
    /// still pending. Returns the final stats.
    pub async fn disconnect(&self) -> SessionStats {
        let mut active = self.active.lock().await;
        let state = self.snapshot_tx.borrow().state;

        let slot = std::mem::take(&mut *active);

        match slot {
            Slot::Running(session) => {
                if state == SessionState::Open {
                    self.snapshot_tx.send_modify(|s| s.state = SessionState::Closing);
                }

                info!("Disconnecting session");

                // The task may already have ended on its own
                let _ = session.shutdown.send(());
                if let Err(e) = session.task.await {
                    error!("Session task panicked: {}", e);
                }
            }
            Slot::Connecting(pending) => {
                info!("Cancelling pending connect");

                // The attempt needs the lock to finish releasing
                drop(active);
                let _ = pending.cancel.send(());
                let _ = pending.released.await;
            }
            Slot::Empty if state == SessionState::Idle => {
                debug!("Disconnect ignored: never connected");
                return self.stats().await;
            }
            Slot::Empty => {
                debug!("Disconnect with no running session (state {})", state);
            }
        }

        self.window.lock().await.close();
        self.snapshot_tx.send_modify(|s| {
            s.state = SessionState::Closed;
            s.is_speaking = false;
            s.volume = 0.0;
        });

        self.stats().await
    }

    /// Watch the observable state
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.snapshot_tx.borrow().state
    }

    pub fn is_connected(&self) -> bool {
        self.snapshot_tx.borrow().is_connected()
    }

    pub fn is_speaking(&self) -> bool {
        self.snapshot_tx.borrow().is_speaking
    }

    pub fn volume(&self) -> f32 {
        self.snapshot_tx.borrow().volume
    }

    pub fn error(&self) -> Option<SessionError> {
        self.snapshot_tx.borrow().error.clone()
    }

    /// Get accumulated transcript
    pub async fn transcripts(&self) -> Vec<TranscriptTurn> {
        let turns = self.transcripts.lock().await;
        turns.clone()
    }

    /// Get current session statistics
    pub async fn stats(&self) -> SessionStats {
        let window = self.window.lock().await;
        window.stats(self.is_connected(), &self.counters)
    }
}

/// Wait for the service to accept the channel configuration
async fn wait_for_open(events: &mut mpsc::Receiver<LiveEvent>) -> SessionResult<()> {
    loop {
        match events.recv().await {
            Some(LiveEvent::Open) => return Ok(()),
            Some(LiveEvent::Message(_)) => debug!("Dropping message received before setup completed"),
            Some(LiveEvent::Error(reason)) => return Err(SessionError::ChannelOpen(reason)),
            Some(LiveEvent::Close) | None => {
                return Err(SessionError::ChannelOpen(
                    "Channel closed before the session was set up".to_string(),
                ))
            }
        }
    }
}

struct SessionStreams {
    frames: mpsc::Receiver<AudioFrame>,
    events: mpsc::Receiver<LiveEvent>,
}

/// Why the session loop stopped
enum SessionEnd {
    Requested,
    RemoteClosed,
    Failed(SessionError),
}

/// State confined to the session task
struct SessionTask {
    resources: SessionResources,
    scheduler: PlaybackScheduler,
    aggregator: TranscriptAggregator,
    meter: VolumeMeter,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    transcripts: Arc<Mutex<Vec<TranscriptTurn>>>,
    counters: Arc<SessionCounters>,
    window: Arc<Mutex<SessionWindow>>,
}

impl SessionTask {
    async fn run(
        mut self,
        mut shutdown: oneshot::Receiver<()>,
        streams: SessionStreams,
        display_interval: Duration,
    ) {
        info!("Session task started");

        let SessionStreams {
            mut frames,
            mut events,
        } = streams;

        let mut ticker = tokio::time::interval(display_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut capture_live = true;

        let end = loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break SessionEnd::Requested,

                event = events.recv() => match event {
                    Some(LiveEvent::Message(message)) => self.handle_message(message).await,
                    Some(LiveEvent::Open) => debug!("Ignoring repeated open event"),
                    Some(LiveEvent::Error(reason)) => {
                        break SessionEnd::Failed(SessionError::ChannelRuntime(reason))
                    }
                    Some(LiveEvent::Close) | None => break SessionEnd::RemoteClosed,
                },

                frame = frames.recv(), if capture_live => match frame {
                    Some(frame) => {
                        if let Err(err) = self.send_frame(frame).await {
                            break SessionEnd::Failed(err);
                        }
                    }
                    None => {
                        info!("Capture stream ended");
                        capture_live = false;
                    }
                },

                _ = ticker.tick() => self.on_display_frame(),
            }
        };

        self.teardown(end).await;
        info!("Session task stopped");
    }

    async fn send_frame(&mut self, frame: AudioFrame) -> SessionResult<()> {
        let (Some(capture), Some(sink)) = (self.resources.capture.as_mut(), self.resources.sink.as_mut())
        else {
            return Ok(());
        };

        let chunk = capture.encode(frame);
        sink.send(chunk)
            .await
            .map_err(|e| SessionError::ChannelRuntime(format!("{:#}", e)))?;

        self.counters.frames_sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Demultiplex one server message
    ///
    /// Order within a message: transcription fragments, audio, turn completion,
    /// interruption.
    async fn handle_message(&mut self, message: ServerMessage) {
        if let Some(text) = message.input_transcription.as_deref() {
            self.aggregator.push_fragment(Speaker::User, text);
        }
        if let Some(text) = message.output_transcription.as_deref() {
            self.aggregator.push_fragment(Speaker::Model, text);
        }

        for audio in &message.audio {
            self.schedule_audio(&audio.data, audio.sample_rate);
        }

        if message.turn_complete {
            let turns = self.aggregator.finalize(Utc::now());
            if !turns.is_empty() {
                let total = {
                    let mut history = self.transcripts.lock().await;
                    history.extend(turns.iter().cloned());
                    history.len()
                };

                for turn in &turns {
                    info!("{}: {}", turn.sender, turn.text);
                }

                self.counters
                    .turns
                    .fetch_add(turns.len() as u64, Ordering::SeqCst);
                self.snapshot_tx.send_modify(|s| s.turns = total);
            }
        }

        if message.interrupted {
            if let Some(output) = self.resources.output.as_deref_mut() {
                InterruptionHandler::interrupt(&mut self.scheduler, output);
            }
            self.counters.interruptions.fetch_add(1, Ordering::SeqCst);
        }

        self.publish_speaking();
    }

    fn schedule_audio(&mut self, data: &str, sample_rate: u32) {
        let Some(output) = self.resources.output.as_deref_mut() else {
            return;
        };

        let buffer = match decode_inline_audio(data, sample_rate) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("Dropping audio buffer: {}", e);
                return;
            }
        };

        if buffer.is_empty() {
            return;
        }

        match self.scheduler.schedule(&buffer, output) {
            Ok(_) => {
                self.counters.buffers_scheduled.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => warn!("Failed to schedule audio buffer: {:#}", e),
        }
    }

    /// Retire finished buffers and sample the meter
    fn on_display_frame(&mut self) {
        let Some(output) = self.resources.output.as_deref_mut() else {
            return;
        };

        let retired = self.scheduler.retire_finished(output.current_time());
        if !retired.is_empty() {
            debug!("{} buffer(s) finished playing", retired.len());
        }

        let volume = self.meter.sample(output);
        let is_speaking = self.scheduler.is_speaking();

        self.snapshot_tx.send_if_modified(|s| {
            let changed = s.is_speaking != is_speaking || s.volume != volume;
            s.is_speaking = is_speaking;
            s.volume = volume;
            changed
        });
    }

    fn publish_speaking(&self) {
        let is_speaking = self.scheduler.is_speaking();
        self.snapshot_tx.send_if_modified(|s| {
            let changed = s.is_speaking != is_speaking;
            s.is_speaking = is_speaking;
            changed
        });
    }

    async fn teardown(mut self, end: SessionEnd) {
        self.resources.release(&mut self.scheduler).await;
        self.aggregator.reset();
        self.meter.reset();
        self.window.lock().await.close();

        let (state, error) = match end {
            SessionEnd::Requested => {
                info!("Session closed on request");
                (SessionState::Closed, None)
            }
            SessionEnd::RemoteClosed => {
                info!("Session closed by the live service");
                (SessionState::Closed, None)
            }
            SessionEnd::Failed(err) => {
                error!("Session failed: {}", err);
                (SessionState::Failed, Some(err))
            }
        };

        self.snapshot_tx.send_modify(|s| {
            s.state = state;
            s.is_speaking = false;
            s.volume = 0.0;
            if error.is_some() {
                s.error = error;
            }
        });
    }
}
