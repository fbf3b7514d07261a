//! Record-upload-play conversation
//!
//! A turn is recorded locally, uploaded as one WAV file, and the reply is
//! either downloaded and played or handed to the speech fallback.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::audio::capture::{AudioBlock, Microphone};
use crate::audio::playback::{OutputDevice, PlaybackScheduler};
use crate::audio::recorder::{TurnRecorder, decode_wav};
use crate::network::upload::{ChatTurnResponse, FALLBACK_TEXT, TurnUploader};
use crate::session::chat::ChatLog;
use crate::session::{FRAME_QUEUE_CAPACITY, SessionResult, new_session_id};
use crate::state::config::GlobalConfig;
use crate::state::status::{Indicator, StatusBoard};

/// Speaks reply text when no audio can be played
pub trait SpeechFallback {
    fn speak(&mut self, text: &str);
}

/// Prints the reply to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSpeech;

impl SpeechFallback for ConsoleSpeech {
    fn speak(&mut self, text: &str) {
        println!("Assistant: {}", text);
    }
}

/// How a reply was delivered
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyDelivery {
    /// Audio was scheduled starting at this device time
    Played { start_at: f64 },
    /// Text went to the speech fallback
    Spoken(String),
}

/// Upload-variant session
pub struct UploadSession<M, U, D, S>
where
    M: Microphone,
    U: TurnUploader,
    D: OutputDevice,
    S: SpeechFallback,
{
    session_id: String,
    config: Arc<GlobalConfig>,
    status: Arc<StatusBoard>,
    microphone: M,
    uploader: U,
    scheduler: PlaybackScheduler<D>,
    speech: S,
    recorder: TurnRecorder,
    frames: Option<mpsc::Receiver<AudioBlock>>,
    chat: ChatLog,
}

impl<M, U, D, S> UploadSession<M, U, D, S>
where
    M: Microphone,
    U: TurnUploader,
    D: OutputDevice,
    S: SpeechFallback,
{
    pub fn new(
        config: Arc<GlobalConfig>,
        status: Arc<StatusBoard>,
        microphone: M,
        uploader: U,
        scheduler: PlaybackScheduler<D>,
        speech: S,
    ) -> Self {
        let sample_rate = config.get().audio.target_sample_rate;
        Self {
            session_id: new_session_id(),
            config,
            status,
            microphone,
            uploader,
            scheduler,
            speech,
            recorder: TurnRecorder::new(sample_rate),
            frames: None,
            chat: ChatLog::new(),
        }
    }

    /// Use a fixed session id
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_recording(&self) -> bool {
        self.frames.is_some()
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    pub fn recorder(&self) -> &TurnRecorder {
        &self.recorder
    }

    pub fn scheduler(&self) -> &PlaybackScheduler<D> {
        &self.scheduler
    }

    pub fn speech(&self) -> &S {
        &self.speech
    }

    /// Open the microphone and start a new recording
    pub fn start_recording(&mut self) -> SessionResult<()> {
        if self.is_recording() {
            return Ok(());
        }

        if let Err(e) = self.scheduler.unlock() {
            tracing::warn!(error = %e, "Could not unlock playback");
        }

        let (tx, rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);
        match self.microphone.open(tx) {
            Ok(native_rate) => {
                tracing::info!(native_rate, "Recording started");
                self.recorder.clear();
                self.frames = Some(rx);
                self.status.set_message("Recording...");
                Ok(())
            }
            Err(e) => {
                self.microphone.close();
                self.status
                    .set_error("Microphone access denied or not available");
                self.status
                    .set_connection(Indicator::Error, "Microphone Error");
                Err(e.into())
            }
        }
    }

    /// Wait for the next captured block; pending while not recording
    pub async fn next_frame(&mut self) -> Option<AudioBlock> {
        match self.frames.as_mut() {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Append a captured block to the recording
    pub fn record_frame(&mut self, block: &AudioBlock) {
        self.recorder.push(block);
    }

    /// Stop recording, upload the turn and deliver the reply
    ///
    /// Returns `None` when nothing was recorded.
    pub async fn finish_turn(&mut self) -> SessionResult<Option<ReplyDelivery>> {
        let Some(mut frames) = self.frames.take() else {
            return Ok(None);
        };
        self.microphone.close();
        while let Ok(block) = frames.try_recv() {
            self.recorder.push(&block);
        }

        if self.recorder.is_empty() {
            tracing::info!("Nothing recorded");
            self.status.set_message("Ready to record");
            return Ok(None);
        }

        tracing::info!(
            duration_secs = self.recorder.duration_secs(),
            "Recording finished"
        );
        let wav = self.recorder.to_wav_bytes()?;
        self.status.set_message("Processing...");

        let turn = match self.uploader.send_turn(&self.session_id, wav).await {
            Ok(turn) => turn,
            Err(e) => {
                tracing::error!(error = %e, "Upload failed");
                self.status
                    .set_error("Connection error - Check your configuration");
                self.status
                    .set_connection(Indicator::Error, "Connection Error");
                return Err(e.into());
            }
        };
        self.status.set_connection(Indicator::Connected, "Connected");

        Ok(Some(self.deliver_reply(turn).await))
    }

    /// Update the chat from a reply and play or speak it
    pub async fn deliver_reply(&mut self, turn: ChatTurnResponse) -> ReplyDelivery {
        let persona = self.config.persona();
        if turn.chat_history.is_empty() {
            if let Some(text) = turn.you_said.as_deref() {
                self.chat.push_user(text);
            }
            if let Some(text) = turn.llm_reply.as_deref() {
                self.chat.push_assistant(text, persona);
            }
        } else {
            self.chat.replace_with_history(&turn.chat_history, persona);
        }

        if let Some(text) = turn.spoken_fallback() {
            return self.speak(text);
        }

        let reference = turn.audio_file.as_deref().unwrap_or_default();
        match self.play_remote(reference).await {
            Ok(start_at) => {
                self.status.set_message("Ready to record");
                ReplyDelivery::Played { start_at }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Reply audio unavailable, speaking instead");
                let text = turn
                    .llm_reply
                    .clone()
                    .unwrap_or_else(|| FALLBACK_TEXT.to_string());
                self.speak(text)
            }
        }
    }

    async fn play_remote(&mut self, reference: &str) -> SessionResult<f64> {
        let bytes = self.uploader.download_audio(reference).await?;
        let buffer = decode_wav(&bytes)?;
        tracing::debug!(
            samples = buffer.samples.len(),
            sample_rate = buffer.sample_rate,
            "Reply audio decoded"
        );
        Ok(self.scheduler.play_clip(buffer)?)
    }

    fn speak(&mut self, text: String) -> ReplyDelivery {
        self.speech.speak(&text);
        self.status.set_message("Ready to record");
        ReplyDelivery::Spoken(text)
    }
}
