//! Voice conversation session
//!
//! Ties the capture pipeline, the streaming transport and the playback
//! scheduler together. Everything runs on one task: a `select!` loop over
//! user controls, microphone frames and transport events. Only this loop
//! touches the pipeline and the scheduler.
//!
//! # Workflow
//!
//! 1. `start`: check the API keys, unlock playback, open the microphone and
//!    connect. Frames flow to the server while capturing.
//! 2. `stop`: send the end-of-turn sentinel, close the transport, release
//!    the microphone.
//! 3. Server messages keep arriving after the stop: transcripts, the
//!    assistant reply and the streamed reply audio.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::audio::capture::{AudioBlock, Microphone};
use crate::audio::error::AudioError;
use crate::audio::pipeline::{CaptureError, CapturePipeline, StopOutcome};
use crate::audio::playback::{OutputDevice, PlaybackChunk, PlaybackError, PlaybackScheduler};
use crate::network::connection::StreamConfig;
use crate::network::error::NetworkError;
use crate::network::messages::ServerMessage;
use crate::network::transport::{TransportConnector, TransportEvent};
use crate::state::config::{ConfigError, GlobalConfig, Persona};
use crate::state::status::{Indicator, StatusBoard};
use crate::state::{CaptureState, StateManager};

/// Conversation transcript
pub mod chat;

/// Record-upload-play variant
pub mod upload;

pub use chat::{ChatLog, ChatMessage, ChatRole, chat_header};
pub use upload::{ConsoleSpeech, SpeechFallback, UploadSession};

/// Capacity of the microphone frame queue
pub const FRAME_QUEUE_CAPACITY: usize = 32;

const STATUS_LISTENING: &str = "Listening...";
const STATUS_PROCESSING: &str = "Processing...";
const STATUS_GENERATING: &str = "Generating audio...";
const STATUS_READY: &str = "Ready to record";
const STATUS_CONNECTION_ERROR: &str = "Connection error - Check your configuration";
const STATUS_MIC_ERROR: &str = "Microphone access denied or not available";
const STATUS_CONFIG_READY: &str = "Configuration Ready";
const STATUS_MISSING_KEYS: &str = "Missing Required API Keys";

/// Session identifier of the form `user-<millis>`
pub fn new_session_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("user-{}", millis)
}

/// Commands from the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Start if idle, stop if capturing
    Toggle,
    /// Start capturing
    Start,
    /// Stop capturing
    Stop,
    /// Switch persona
    SetPersona(Persona),
    /// Leave the event loop
    Shutdown,
}

/// Session events for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum SessionEvent {
    /// Capture started or ended
    RecordingChanged { recording: bool },
    /// Partial transcript (also shown on the status line)
    PartialTranscript { text: String },
    /// A message was appended to the chat
    ChatAppended { message: ChatMessage },
    /// Streamed fragment of the reply
    ReplyFragment { text: String },
    /// The settings must be completed before a conversation can start
    SettingsRequired { reason: String },
    /// Persona switched
    PersonaChanged { persona: String, header: String },
}

/// Session errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Configuration is incomplete or invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Capture could not start
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Transport failure
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Reply playback failure
    #[error(transparent)]
    Playback(#[from] PlaybackError),

    /// Audio device or codec failure
    #[error(transparent)]
    Audio(#[from] AudioError),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Streaming voice session
pub struct VoiceSession<M, C, D>
where
    M: Microphone,
    C: TransportConnector,
    D: OutputDevice,
{
    session_id: String,
    config: Arc<GlobalConfig>,
    status: Arc<StatusBoard>,
    pipeline: CapturePipeline<M, C::Transport>,
    connector: C,
    scheduler: PlaybackScheduler<D>,
    chat: ChatLog,
    frames: Option<mpsc::Receiver<AudioBlock>>,
    transport_events: Option<mpsc::Receiver<TransportEvent>>,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl<M, C, D> VoiceSession<M, C, D>
where
    M: Microphone,
    C: TransportConnector,
    D: OutputDevice,
{
    /// Create an idle session
    pub fn new(
        config: Arc<GlobalConfig>,
        status: Arc<StatusBoard>,
        microphone: M,
        connector: C,
        scheduler: PlaybackScheduler<D>,
    ) -> Self {
        let target_rate = config.get().audio.target_sample_rate;
        let pipeline = CapturePipeline::new(microphone, target_rate, StateManager::shared());

        let session = Self {
            session_id: new_session_id(),
            config,
            status,
            pipeline,
            connector,
            scheduler,
            chat: ChatLog::new(),
            frames: None,
            transport_events: None,
            events: None,
        };
        session.refresh_config_status();
        session
    }

    /// Use a fixed session id
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Subscribe to session events
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn capture_state(&self) -> CaptureState {
        self.pipeline.state()
    }

    pub fn is_recording(&self) -> bool {
        self.pipeline.is_capturing()
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    /// Header above the chat for the active persona
    pub fn chat_header(&self) -> String {
        chat_header(self.config.persona())
    }

    pub fn pipeline(&self) -> &CapturePipeline<M, C::Transport> {
        &self.pipeline
    }

    pub fn scheduler(&self) -> &PlaybackScheduler<D> {
        &self.scheduler
    }

    pub fn status(&self) -> Arc<StatusBoard> {
        self.status.clone()
    }

    /// Show whether the required keys are configured
    pub fn refresh_config_status(&self) {
        if self.config.get().is_ready() {
            self.status
                .set_connection(Indicator::Ready, STATUS_CONFIG_READY);
        } else {
            self.status
                .set_connection(Indicator::Disconnected, STATUS_MISSING_KEYS);
        }
    }

    /// Start a conversation turn
    ///
    /// # Errors
    ///
    /// - `SessionError::Config` - required API keys are missing
    /// - `SessionError::Capture` - the microphone was refused or capture is
    ///   already active
    /// - `SessionError::Network` - the streaming connection failed
    pub async fn start(&mut self) -> SessionResult<()> {
        let config = self.config.get();
        if let Err(e) = config.validate() {
            tracing::warn!(error = %e, "Cannot start without required API keys");
            self.status
                .set_connection(Indicator::Disconnected, STATUS_MISSING_KEYS);
            self.emit(SessionEvent::SettingsRequired {
                reason: e.to_string(),
            });
            return Err(e.into());
        }

        if let Err(e) = self.scheduler.unlock() {
            tracing::warn!(error = %e, "Could not unlock playback");
        }

        let (frames_tx, frames_rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);
        match self.pipeline.request_start(frames_tx) {
            Ok(native_rate) => {
                tracing::debug!(native_rate, "Microphone opened");
            }
            Err(e @ CaptureError::PermissionDenied(_)) => {
                self.status.set_error(STATUS_MIC_ERROR);
                self.status
                    .set_connection(Indicator::Error, "Microphone Error");
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        }
        self.frames = Some(frames_rx);

        let stream_config = StreamConfig::from_client_config(&config, &self.session_id);
        tracing::info!(
            session_id = %self.session_id,
            persona = %config.persona,
            "Connecting streaming session"
        );

        match self.connector.connect(&stream_config).await {
            Ok((transport, events)) => {
                if let Err(e) = self.pipeline.attach_transport(transport) {
                    self.frames = None;
                    return Err(e.into());
                }
                self.transport_events = Some(events);
                self.status.set_message(STATUS_LISTENING);
                self.status.set_connection(Indicator::Connected, "Connected");
                self.emit(SessionEvent::RecordingChanged { recording: true });
                tracing::info!("Conversation turn started");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Streaming connection failed");
                self.pipeline.abort_start();
                self.frames = None;
                self.show_connection_error();
                Err(e.into())
            }
        }
    }

    /// End the current turn
    ///
    /// Does nothing unless capturing.
    pub fn stop(&mut self) -> StopOutcome {
        let outcome = self.pipeline.stop();
        if let StopOutcome::Stopped { sentinel_sent } = outcome {
            tracing::info!(sentinel_sent, "Conversation turn ended");
            self.frames = None;
            self.status.set_message(STATUS_PROCESSING);
            self.emit(SessionEvent::RecordingChanged { recording: false });
        }
        outcome
    }

    /// Start when idle, stop when capturing
    pub async fn toggle(&mut self) -> SessionResult<()> {
        match self.pipeline.state() {
            CaptureState::Idle => self.start().await,
            CaptureState::Capturing => {
                self.stop();
                Ok(())
            }
            other => {
                tracing::debug!(state = other.name(), "Toggle ignored");
                Ok(())
            }
        }
    }

    /// Switch persona
    ///
    /// A running turn keeps its persona; the switch applies from the next
    /// connection on.
    pub fn set_persona(&mut self, persona: Persona) {
        self.config.set_persona(persona);
        if self.pipeline.is_capturing() {
            self.status
                .set_message("Persona change will apply to next conversation");
        } else {
            self.status
                .set_message(format!("Switched to {}", persona.label()));
        }
        tracing::info!(persona = %persona, "Persona changed");
        self.emit(SessionEvent::PersonaChanged {
            persona: persona.id().to_string(),
            header: chat_header(persona),
        });
    }

    /// Forward one microphone frame
    pub fn handle_frame(&mut self, block: &AudioBlock) {
        if let Err(e) = self.pipeline.process_frame(block) {
            tracing::error!(error = %e, "Transport failed while capturing");
            self.frames = None;
            self.show_connection_error();
            self.emit(SessionEvent::RecordingChanged { recording: false });
        }
    }

    /// React to something the transport observed
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Message(message) => self.handle_message(message),
            TransportEvent::Malformed { raw, reason } => {
                tracing::warn!(reason = %reason, raw_len = raw.len(), "Ignoring malformed message");
            }
            TransportEvent::Closed => {
                tracing::info!("Streaming connection closed");
                self.transport_events = None;
                self.end_capture_on_transport_loss();
                self.status.set_message("Disconnected");
                self.status
                    .set_connection(Indicator::Disconnected, "Disconnected");
            }
            TransportEvent::Error(message) => {
                tracing::error!(error = %message, "Streaming connection error");
                self.transport_events = None;
                self.end_capture_on_transport_loss();
                self.show_connection_error();
            }
        }
    }

    /// React to a server message
    pub fn handle_message(&mut self, message: ServerMessage) {
        tracing::debug!(kind = message.kind(), "Server message");
        let credentials = message.is_credentials_error();
        match message {
            ServerMessage::Transcript { text, end_of_turn } => {
                self.status.set_message(text.clone());
                if end_of_turn {
                    let message = self.chat.push_user(text).clone();
                    self.emit(SessionEvent::ChatAppended { message });
                } else {
                    self.emit(SessionEvent::PartialTranscript { text });
                }
            }
            ServerMessage::LlmResponse { text } => {
                let persona = self.config.persona();
                let message = self.chat.push_assistant(text, persona).clone();
                self.emit(SessionEvent::ChatAppended { message });
            }
            ServerMessage::LlmChunk { text } => {
                tracing::trace!(len = text.len(), "Reply fragment");
                self.emit(SessionEvent::ReplyFragment { text });
            }
            ServerMessage::AudioStart { context_id, .. } => {
                self.scheduler.on_audio_start(context_id);
                self.status.set_message(STATUS_GENERATING);
            }
            ServerMessage::AudioChunk {
                audio,
                chunk_number,
                context_id,
                ..
            } => {
                if audio.is_empty() {
                    return;
                }
                let chunk = PlaybackChunk {
                    audio,
                    chunk_number,
                    context_id,
                };
                if let Err(e) = self.scheduler.on_chunk(&chunk) {
                    tracing::warn!(error = %e, chunk_number = ?chunk_number, "Dropped audio chunk");
                }
            }
            ServerMessage::AudioComplete { total_chunks, .. } => {
                self.scheduler.on_complete(total_chunks);
                self.status.set_message(STATUS_READY);
            }
            ServerMessage::AudioError { message } => {
                self.scheduler.on_error();
                self.status.set_error(format!("Audio error: {}", message));
            }
            ServerMessage::Error { message } => {
                self.status.set_error(message.clone());
                if credentials {
                    self.emit(SessionEvent::SettingsRequired { reason: message });
                }
            }
            ServerMessage::Info { message } => {
                self.status.set_message(message);
            }
            ServerMessage::Unknown => {
                tracing::debug!("Ignoring unknown message type");
            }
        }
    }

    /// Apply a user command
    ///
    /// Returns `false` once the loop should exit.
    pub async fn handle_control(&mut self, control: Control) -> bool {
        match control {
            Control::Toggle => {
                if let Err(e) = self.toggle().await {
                    tracing::warn!(error = %e, "Toggle failed");
                }
            }
            Control::Start => {
                if let Err(e) = self.start().await {
                    tracing::warn!(error = %e, "Start failed");
                }
            }
            Control::Stop => {
                self.stop();
            }
            Control::SetPersona(persona) => self.set_persona(persona),
            Control::Shutdown => return false,
        }
        true
    }

    /// Run the session until `Shutdown` or until the control channel closes
    pub async fn run(&mut self, mut controls: mpsc::Receiver<Control>) {
        tracing::info!(session_id = %self.session_id, "Voice session running");

        loop {
            tokio::select! {
                control = controls.recv() => {
                    let Some(control) = control else { break };
                    if !self.handle_control(control).await {
                        break;
                    }
                }
                block = next_item(&mut self.frames) => match block {
                    Some(block) => self.handle_frame(&block),
                    None => self.frames = None,
                },
                event = next_item(&mut self.transport_events) => match event {
                    Some(event) => self.handle_transport_event(event),
                    None => self.transport_events = None,
                },
            }
        }

        self.shutdown();
    }

    /// Stop any running turn and drop the connection
    pub fn shutdown(&mut self) {
        self.stop();
        self.pipeline.handle_transport_lost();
        self.frames = None;
        self.transport_events = None;
        tracing::info!("Voice session stopped");
    }

    fn end_capture_on_transport_loss(&mut self) {
        if self.pipeline.handle_transport_lost() {
            self.frames = None;
            self.emit(SessionEvent::RecordingChanged { recording: false });
        }
    }

    fn show_connection_error(&self) {
        self.status.set_error(STATUS_CONNECTION_ERROR);
        self.status
            .set_connection(Indicator::Error, "Connection Error");
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            if events.send(event).is_err() {
                tracing::trace!("No session event listener");
            }
        }
    }
}

/// Receive from an optional queue; pending forever when there is none
async fn next_item<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
