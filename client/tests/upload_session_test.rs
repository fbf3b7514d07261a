//! Record-upload-play turns against a scripted backend

use std::sync::{Arc, Mutex};

use lumeai_lib::audio::playback::PlaybackResult;
use lumeai_lib::audio::recorder::encode_wav;
use lumeai_lib::audio::{
    AudioBlock, AudioError, AudioResult, Microphone, OutputDevice, PcmBuffer, PlaybackScheduler,
    TimelineConfig,
};
use lumeai_lib::network::{
    ChatTurnResponse, FALLBACK_TEXT, HistoryEntry, NetworkError, NetworkResult, TurnUploader,
};
use lumeai_lib::session::upload::ReplyDelivery;
use lumeai_lib::session::{ChatRole, SessionError, SpeechFallback, UploadSession};
use lumeai_lib::state::{ClientConfig, GlobalConfig, Indicator, Persona, StatusBoard};
use tokio::sync::mpsc;

#[derive(Clone, Default)]
struct MicHandle(Arc<Mutex<Option<mpsc::Sender<AudioBlock>>>>);

struct FakeMic {
    refuse: bool,
    handle: MicHandle,
}

impl Microphone for FakeMic {
    fn open(&mut self, sender: mpsc::Sender<AudioBlock>) -> AudioResult<u32> {
        if self.refuse {
            return Err(AudioError::DeviceNotFound);
        }
        *self.handle.0.lock().unwrap() = Some(sender);
        Ok(16000)
    }

    fn close(&mut self) {
        self.handle.0.lock().unwrap().take();
    }

    fn is_open(&self) -> bool {
        self.handle.0.lock().unwrap().is_some()
    }
}

#[derive(Default)]
struct Backend {
    reply: Option<ChatTurnResponse>,
    audio: Vec<u8>,
    uploads: Vec<(String, usize)>,
    downloads: Vec<String>,
}

#[derive(Clone, Default)]
struct FakeUploader(Arc<Mutex<Backend>>);

impl TurnUploader for FakeUploader {
    async fn send_turn(&self, session_id: &str, wav: Vec<u8>) -> NetworkResult<ChatTurnResponse> {
        let mut backend = self.0.lock().unwrap();
        backend.uploads.push((session_id.to_string(), wav.len()));
        backend
            .reply
            .clone()
            .ok_or_else(|| NetworkError::ConnectionFailed("server unreachable".into()))
    }

    async fn download_audio(&self, reference: &str) -> NetworkResult<Vec<u8>> {
        let mut backend = self.0.lock().unwrap();
        backend.downloads.push(reference.to_string());
        Ok(backend.audio.clone())
    }
}

#[derive(Default)]
struct RecordingSpeech {
    spoken: Vec<String>,
}

impl SpeechFallback for RecordingSpeech {
    fn speak(&mut self, text: &str) {
        self.spoken.push(text.to_string());
    }
}

#[derive(Default)]
struct ManualOutput {
    now: f64,
    scheduled: Vec<(f64, f64)>,
}

impl OutputDevice for ManualOutput {
    fn current_time(&self) -> f64 {
        self.now
    }

    fn is_suspended(&self) -> bool {
        false
    }

    fn resume(&mut self) -> PlaybackResult<()> {
        Ok(())
    }

    fn schedule(&mut self, buffer: PcmBuffer, start_at: f64) -> PlaybackResult<()> {
        self.scheduled.push((start_at, buffer.duration()));
        Ok(())
    }
}

type TestSession = UploadSession<FakeMic, FakeUploader, ManualOutput, RecordingSpeech>;

fn session(refuse: bool, backend: FakeUploader) -> (TestSession, MicHandle, Arc<StatusBoard>) {
    let mut config = ClientConfig::default();
    config.persona = Persona::Pirate;
    let status = StatusBoard::shared();
    let mic = MicHandle::default();

    let session = UploadSession::new(
        Arc::new(GlobalConfig::new(config)),
        status.clone(),
        FakeMic {
            refuse,
            handle: mic.clone(),
        },
        backend,
        PlaybackScheduler::new(
            ManualOutput {
                now: 3.0,
                ..Default::default()
            },
            TimelineConfig::default(),
        ),
        RecordingSpeech::default(),
    )
    .with_session_id("user-42");

    (session, mic, status)
}

/// Record half a second of audio through the microphone channel
async fn record_turn(session: &mut TestSession, mic: &MicHandle) {
    session.start_recording().unwrap();
    assert!(session.is_recording());

    let sender = mic.0.lock().unwrap().clone().unwrap();
    sender
        .send(AudioBlock::new(vec![0.1; 4000], 16000))
        .await
        .unwrap();
    let block = session.next_frame().await.unwrap();
    session.record_frame(&block);

    // Left in the queue; picked up when the turn finishes
    sender
        .send(AudioBlock::new(vec![0.1; 4000], 16000))
        .await
        .unwrap();
}

fn history(entries: &[(&str, &str)]) -> Vec<HistoryEntry> {
    entries
        .iter()
        .map(|(role, content)| HistoryEntry {
            role: role.to_string(),
            content: content.to_string(),
        })
        .collect()
}

#[tokio::test]
async fn test_reply_audio_is_downloaded_and_played() {
    let backend = FakeUploader::default();
    {
        let mut state = backend.0.lock().unwrap();
        state.audio = encode_wav(&vec![0.2; 22050], 44100).unwrap();
        state.reply = Some(ChatTurnResponse {
            you_said: Some("what's the weather".into()),
            llm_reply: Some("Sunny, matey".into()),
            chat_history: history(&[("user", "what's the weather"), ("assistant", "Sunny, matey")]),
            audio_file: Some("/static/reply.wav".into()),
            fallback_text: None,
        });
    }
    let (mut session, mic, status) = session(false, backend.clone());

    record_turn(&mut session, &mic).await;
    let delivery = session.finish_turn().await.unwrap().unwrap();

    match delivery {
        ReplyDelivery::Played { start_at } => assert!((start_at - 3.12).abs() < 1e-9),
        other => panic!("Expected Played, got {:?}", other),
    }
    assert!(!session.is_recording());
    assert!(mic.0.lock().unwrap().is_none());
    assert!((session.recorder().duration_secs() - 0.5).abs() < 1e-9);

    let state = backend.0.lock().unwrap();
    assert_eq!(state.uploads.len(), 1);
    assert_eq!(state.uploads[0].0, "user-42");
    // Header plus 8000 16-bit samples
    assert!(state.uploads[0].1 > 8000 * 2);
    assert_eq!(state.downloads, vec!["/static/reply.wav".to_string()]);

    let messages = session.chat().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, ChatRole::User);
    assert_eq!(messages[1].persona_tag, Some("pirate"));
    assert!(session.speech().spoken.is_empty());

    let snapshot = status.snapshot();
    assert_eq!(snapshot.message, "Ready to record");
    assert_eq!(snapshot.indicator, Indicator::Connected);
}

#[tokio::test]
async fn test_fallback_text_is_spoken() {
    let backend = FakeUploader::default();
    backend.0.lock().unwrap().reply = Some(ChatTurnResponse {
        you_said: Some("hello".into()),
        llm_reply: Some("Ahoy".into()),
        audio_file: Some("/static/reply.wav".into()),
        fallback_text: Some("Ahoy there".into()),
        ..Default::default()
    });
    let (mut session, mic, _status) = session(false, backend.clone());

    record_turn(&mut session, &mic).await;
    let delivery = session.finish_turn().await.unwrap();

    assert_eq!(delivery, Some(ReplyDelivery::Spoken("Ahoy there".into())));
    assert_eq!(session.speech().spoken, vec!["Ahoy there".to_string()]);
    assert!(backend.0.lock().unwrap().downloads.is_empty());

    // Without a history the chat is built from the turn itself
    assert_eq!(session.chat().len(), 2);
    assert_eq!(session.chat().messages()[0].text, "hello");
}

#[tokio::test]
async fn test_undecodable_audio_falls_back_to_reply_text() {
    let backend = FakeUploader::default();
    {
        let mut state = backend.0.lock().unwrap();
        state.audio = b"<html>not found</html>".to_vec();
        state.reply = Some(ChatTurnResponse {
            llm_reply: Some("Sunny".into()),
            audio_file: Some("/static/missing.wav".into()),
            ..Default::default()
        });
    }
    let (mut session, mic, _status) = session(false, backend);

    record_turn(&mut session, &mic).await;
    let delivery = session.finish_turn().await.unwrap();

    assert_eq!(delivery, Some(ReplyDelivery::Spoken("Sunny".into())));
    assert!(session.scheduler().device().scheduled.is_empty());
}

#[tokio::test]
async fn test_reply_without_audio_or_text_speaks_fallback() {
    let (mut session, _mic, _status) = session(false, FakeUploader::default());

    let delivery = session.deliver_reply(ChatTurnResponse::default()).await;

    assert_eq!(delivery, ReplyDelivery::Spoken(FALLBACK_TEXT.into()));
}

#[tokio::test]
async fn test_empty_recording_uploads_nothing() {
    let backend = FakeUploader::default();
    let (mut session, _mic, status) = session(false, backend.clone());

    session.start_recording().unwrap();
    let delivery = session.finish_turn().await.unwrap();

    assert_eq!(delivery, None);
    assert!(backend.0.lock().unwrap().uploads.is_empty());
    assert_eq!(status.snapshot().message, "Ready to record");

    // Finishing when not recording is also a no-op
    assert_eq!(session.finish_turn().await.unwrap(), None);
}

#[tokio::test]
async fn test_upload_failure_reports_connection_error() {
    let (mut session, mic, status) = session(false, FakeUploader::default());

    record_turn(&mut session, &mic).await;
    let result = session.finish_turn().await;

    assert!(matches!(result, Err(SessionError::Network(_))));
    let snapshot = status.snapshot();
    assert!(snapshot.is_error);
    assert_eq!(snapshot.message, "Connection error - Check your configuration");
    assert_eq!(snapshot.connection_label, "Connection Error");
}

#[tokio::test]
async fn test_microphone_refused() {
    let (mut session, _mic, status) = session(true, FakeUploader::default());

    assert!(session.start_recording().is_err());
    assert!(!session.is_recording());
    assert_eq!(
        status.snapshot().message,
        "Microphone access denied or not available"
    );
}
