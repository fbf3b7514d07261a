//! Record-upload-play transport
//!
//! One HTTP request per turn: the recorded WAV goes up as multipart field
//! `file`, the reply comes back as chat history plus an audio reference or a
//! fallback text.

use std::time::Duration;

use reqwest::Url;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::network::error::{NetworkError, NetworkResult};

/// Text the server uses when it cannot produce a reply
pub const FALLBACK_TEXT: &str = "I'm having trouble connecting right now.";

/// One entry of the server-side chat history
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// `user` or `assistant`
    pub role: String,
    /// Message text
    pub content: String,
}

/// Response of `POST /agent/chat/{session_id}`
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ChatTurnResponse {
    /// Transcript of the uploaded recording
    #[serde(default)]
    pub you_said: Option<String>,
    /// Assistant reply text
    #[serde(default)]
    pub llm_reply: Option<String>,
    /// Full conversation so far
    #[serde(default)]
    pub chat_history: Vec<HistoryEntry>,
    /// URL of the synthesized reply, possibly relative
    #[serde(default, rename = "audioFile")]
    pub audio_file: Option<String>,
    /// Text to speak locally instead of playing audio
    #[serde(default)]
    pub fallback_text: Option<String>,
}

impl ChatTurnResponse {
    /// Text to hand to the speech fallback, if the reply should not be played
    ///
    /// A `fallback_text` always wins; without any audio reference the
    /// assistant reply (or the last assistant history entry) is spoken.
    pub fn spoken_fallback(&self) -> Option<String> {
        if let Some(text) = self.fallback_text.as_ref().filter(|t| !t.is_empty()) {
            return Some(text.clone());
        }
        if self.audio_file.as_ref().is_some_and(|url| !url.is_empty()) {
            return None;
        }
        self.llm_reply
            .clone()
            .or_else(|| {
                self.chat_history
                    .iter()
                    .rev()
                    .find(|entry| entry.role == "assistant")
                    .map(|entry| entry.content.clone())
            })
            .or_else(|| Some(FALLBACK_TEXT.to_string()))
    }
}

/// Uploads recorded turns and fetches reply audio
pub trait TurnUploader {
    /// Upload one recorded turn
    fn send_turn(
        &self,
        session_id: &str,
        wav: Vec<u8>,
    ) -> impl Future<Output = NetworkResult<ChatTurnResponse>>;

    /// Download a reply audio file
    fn download_audio(&self, reference: &str) -> impl Future<Output = NetworkResult<Vec<u8>>>;
}

/// HTTP client for the upload endpoint
#[derive(Debug, Clone)]
pub struct ChatUploadClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ChatUploadClient {
    /// Create a client for the given HTTP base URL
    pub fn new(base_url: &str, timeout: Duration) -> NetworkResult<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| NetworkError::InvalidConfig(format!("Invalid base URL: {}", e)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(NetworkError::InvalidConfig(format!(
                "Base URL must use http or https: {}",
                base_url
            )));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    /// URL of the chat endpoint for a session
    pub fn chat_url(&self, session_id: &str) -> NetworkResult<Url> {
        self.base_url
            .join(&format!("/agent/chat/{}", session_id))
            .map_err(|e| NetworkError::InvalidConfig(e.to_string()))
    }

    /// Resolve an `audioFile` reference against the server
    pub fn resolve_audio_url(&self, reference: &str) -> NetworkResult<Url> {
        self.base_url
            .join(reference)
            .map_err(|e| NetworkError::InvalidConfig(format!("Invalid audio URL: {}", e)))
    }

    /// Upload one recorded turn
    pub async fn send_turn(&self, session_id: &str, wav: Vec<u8>) -> NetworkResult<ChatTurnResponse> {
        let url = self.chat_url(session_id)?;
        info!(session_id = %session_id, bytes = wav.len(), "Uploading recording");

        let part = Part::bytes(wav)
            .file_name("recording.wav")
            .mime_str("audio/wav")?;
        let form = Form::new().part("file", part);

        let response = self.http.post(url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Upload failed with status {}", status);
            return Err(NetworkError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        let turn: ChatTurnResponse = response.json().await?;
        debug!(
            history = turn.chat_history.len(),
            has_audio = turn.audio_file.is_some(),
            "Upload response received"
        );
        Ok(turn)
    }

    /// Download a reply audio file
    pub async fn download_audio(&self, reference: &str) -> NetworkResult<Vec<u8>> {
        let url = self.resolve_audio_url(reference)?;
        debug!("Downloading reply audio from {}", url);

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::BadStatus {
                status: status.as_u16(),
                body: String::new(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

impl TurnUploader for ChatUploadClient {
    async fn send_turn(&self, session_id: &str, wav: Vec<u8>) -> NetworkResult<ChatTurnResponse> {
        ChatUploadClient::send_turn(self, session_id, wav).await
    }

    async fn download_audio(&self, reference: &str) -> NetworkResult<Vec<u8>> {
        ChatUploadClient::download_audio(self, reference).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ChatUploadClient {
        ChatUploadClient::new("http://127.0.0.1:8000/", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_chat_url() {
        let url = client().chat_url("user-123").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8000/agent/chat/user-123");
    }

    #[test]
    fn test_resolve_audio_url() {
        let client = client();

        let relative = client.resolve_audio_url("/static/fallback.mp3").unwrap();
        assert_eq!(relative.as_str(), "http://127.0.0.1:8000/static/fallback.mp3");

        let absolute = client
            .resolve_audio_url("https://cdn.example.com/reply.wav")
            .unwrap();
        assert_eq!(absolute.as_str(), "https://cdn.example.com/reply.wav");
    }

    #[test]
    fn test_rejects_non_http_base() {
        assert!(ChatUploadClient::new("ws://127.0.0.1:8000", Duration::from_secs(1)).is_err());
        assert!(ChatUploadClient::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_parse_response() {
        let json = r#"{
            "you_said": "hello",
            "llm_reply": "hi there",
            "chat_history": [
                {"role": "user", "content": "hello"},
                {"role": "assistant", "content": "hi there"}
            ],
            "audioFile": "https://cdn.example.com/a.wav"
        }"#;

        let turn: ChatTurnResponse = serde_json::from_str(json).unwrap();
        assert_eq!(turn.you_said.as_deref(), Some("hello"));
        assert_eq!(turn.chat_history.len(), 2);
        assert_eq!(turn.audio_file.as_deref(), Some("https://cdn.example.com/a.wav"));
        assert_eq!(turn.spoken_fallback(), None);
    }

    #[test]
    fn test_fallback_text_wins_over_audio() {
        let turn = ChatTurnResponse {
            audio_file: Some("/static/fallback.mp3".into()),
            fallback_text: Some(FALLBACK_TEXT.into()),
            ..Default::default()
        };
        assert_eq!(turn.spoken_fallback().as_deref(), Some(FALLBACK_TEXT));
    }

    #[test]
    fn test_no_audio_speaks_reply() {
        let turn = ChatTurnResponse {
            chat_history: vec![HistoryEntry {
                role: "assistant".into(),
                content: "from history".into(),
            }],
            ..Default::default()
        };
        assert_eq!(turn.spoken_fallback().as_deref(), Some("from history"));

        let empty = ChatTurnResponse::default();
        assert_eq!(empty.spoken_fallback().as_deref(), Some(FALLBACK_TEXT));
    }
}
