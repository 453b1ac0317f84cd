//! Wire message types for the Deepgram real-time WebSocket API.
//!
//! Two directions of traffic share this module:
//!
//! - **Outgoing**: [`ControlMessage`] text frames (`StartStream`,
//!   `CloseStream`, `KeepAlive`, `Error`). Audio is sent as raw binary
//!   frames and has no JSON envelope.
//! - **Incoming**: [`TranscriptResponse`] text frames, decoded with serde
//!   and condensed into [`TranscriptMessage`] for callback delivery.
//!
//! Unknown fields in server messages are tolerated; absent fields fall back
//! to defaults so schema additions on the server side never break parsing.

use serde::{Deserialize, Serialize};

use crate::error::{DeepgramError, DeepgramResult};

// =============================================================================
// Outgoing Messages (Client to Server)
// =============================================================================

/// Control frames sent to Deepgram as JSON text messages.
///
/// The wire representation is tagged by a `type` field, e.g.
/// `{"type":"KeepAlive"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Announce the beginning of an audio stream.
    StartStream,
    /// Ask the server to finalize and close the stream.
    CloseStream,
    /// Application-level heartbeat that prevents server-side idle teardown.
    KeepAlive,
    /// Report an error condition to the server.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl ControlMessage {
    /// Build an `Error` control frame. The message text is mandatory.
    pub fn error(message: impl Into<String>) -> DeepgramResult<Self> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(DeepgramError::InvalidArgument(
                "Error control message requires a message".to_string(),
            ));
        }
        Ok(Self::Error {
            message,
            code: None,
            details: None,
        })
    }

    /// Build an `Error` control frame carrying a status code and details.
    pub fn error_with_details(
        message: impl Into<String>,
        code: i32,
        details: impl Into<String>,
    ) -> DeepgramResult<Self> {
        let mut frame = Self::error(message)?;
        if let Self::Error { code: c, details: d, .. } = &mut frame {
            *c = Some(code);
            *d = Some(details.into());
        }
        Ok(frame)
    }
}

// =============================================================================
// Incoming Messages (Server to Client)
// =============================================================================

/// A transcription event as it arrives off the wire.
///
/// Field names follow the server's snake_case schema. Everything is optional
/// or defaulted; the server freely omits fields on non-transcript events.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranscriptResponse {
    #[serde(rename = "type", default)]
    pub response_type: String,
    #[serde(default)]
    pub channel_index: Option<Vec<u32>>,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub speech_final: bool,
    #[serde(default)]
    pub from_finalize: bool,
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Channel {
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Alternative {
    pub transcript: String,
    pub confidence: f64,
    #[serde(default)]
    pub words: Vec<Word>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub model_info: Option<ModelInfo>,
    #[serde(default)]
    pub model_uuid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub version: String,
    pub arch: String,
}

impl TranscriptResponse {
    /// Condense this event into a [`TranscriptMessage`], or `None` when the
    /// event carries no channel or no alternatives (metadata-only events).
    pub fn to_message(&self) -> Option<TranscriptMessage> {
        let channel = self.channel.as_ref()?;
        let alternative = channel.alternatives.first()?;

        let channel_id = self
            .channel_index
            .as_ref()
            .and_then(|indices| indices.first())
            .map(|index| index.to_string())
            .unwrap_or_else(|| "default".to_string());

        Some(TranscriptMessage::new(
            alternative.transcript.clone(),
            alternative.confidence,
            channel_id,
            self.start,
            self.duration,
            alternative.words.clone(),
            self.is_final,
        ))
    }
}

// =============================================================================
// Condensed transcript
// =============================================================================

/// A single word with its timing and confidence.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Word {
    pub word: String,
    pub start: f64,
    pub end: f64,
    pub confidence: f64,
    #[serde(default)]
    pub punctuated_word: Option<String>,
}

impl Word {
    /// The server reports `end = -1` for a word whose end the model has not
    /// yet committed to.
    pub fn is_open_ended(&self) -> bool {
        self.end == -1.0
    }
}

/// The transcription payload handed to `on_transcript` callbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptMessage {
    /// The transcribed text of the first alternative.
    pub transcript: String,
    /// Confidence score, clamped to `[0.0, 1.0]`.
    pub confidence: f64,
    /// Channel identifier; `"default"` when the event carried no index.
    pub channel: String,
    /// Start offset of the segment, in seconds.
    pub start: f64,
    /// Duration of the segment, in seconds.
    pub duration: f64,
    /// Word-level timings, possibly empty.
    pub words: Vec<Word>,
    /// `true` for a final result, `false` for an interim hypothesis.
    pub is_final: bool,
}

impl TranscriptMessage {
    pub fn new(
        transcript: String,
        confidence: f64,
        channel: String,
        start: f64,
        duration: f64,
        words: Vec<Word>,
        is_final: bool,
    ) -> Self {
        Self {
            transcript,
            confidence: confidence.clamp(0.0, 1.0),
            channel,
            start,
            duration,
            words,
            is_final,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RESPONSE: &str = r#"
    {
        "type": "Results",
        "channel_index": [0, 1],
        "duration": 1.98,
        "start": 0.0,
        "is_final": true,
        "speech_final": true,
        "channel": {
            "alternatives": [
                {
                    "transcript": "Hello world",
                    "confidence": 0.925,
                    "words": [
                        {"word": "hello", "start": 0.1, "end": 0.5, "confidence": 0.92, "punctuated_word": "Hello"},
                        {"word": "world", "start": 0.6, "end": 1.1, "confidence": 0.93, "punctuated_word": "world"}
                    ]
                }
            ]
        },
        "metadata": {
            "request_id": "req-123",
            "model_info": {"name": "nova-2", "version": "2024-01-09", "arch": "nova"},
            "model_uuid": "uuid-456"
        }
    }
    "#;

    #[test]
    fn keep_alive_serializes_to_tagged_json() {
        let json = serde_json::to_string(&ControlMessage::KeepAlive).unwrap();
        assert_eq!(json, r#"{"type":"KeepAlive"}"#);
    }

    #[test]
    fn stream_control_frames_serialize_with_exact_type_names() {
        assert_eq!(
            serde_json::to_string(&ControlMessage::StartStream).unwrap(),
            r#"{"type":"StartStream"}"#
        );
        assert_eq!(
            serde_json::to_string(&ControlMessage::CloseStream).unwrap(),
            r#"{"type":"CloseStream"}"#
        );
    }

    #[test]
    fn error_frame_requires_message() {
        assert!(ControlMessage::error("").is_err());
        assert!(ControlMessage::error("   ").is_err());

        let frame = ControlMessage::error("boom").unwrap();
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"type":"Error","message":"boom"}"#);
    }

    #[test]
    fn error_frame_carries_code_and_details() {
        let frame = ControlMessage::error_with_details("boom", 42, "stack").unwrap();
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(
            json,
            r#"{"type":"Error","message":"boom","code":42,"details":"stack"}"#
        );
    }

    #[test]
    fn control_frames_round_trip() {
        for frame in [
            ControlMessage::StartStream,
            ControlMessage::CloseStream,
            ControlMessage::KeepAlive,
            ControlMessage::error("oops").unwrap(),
        ] {
            let json = serde_json::to_string(&frame).unwrap();
            let parsed: ControlMessage = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, frame);
        }
    }

    #[test]
    fn sample_response_parses() {
        let response: TranscriptResponse = serde_json::from_str(SAMPLE_RESPONSE).unwrap();
        assert_eq!(response.response_type, "Results");
        assert_eq!(response.channel_index, Some(vec![0, 1]));
        assert!(response.is_final);
        assert!(response.speech_final);
        assert!(!response.from_finalize);

        let channel = response.channel.as_ref().unwrap();
        let alternative = &channel.alternatives[0];
        assert_eq!(alternative.transcript, "Hello world");
        assert_eq!(alternative.confidence, 0.925);
        assert_eq!(alternative.words.len(), 2);

        let metadata = response.metadata.as_ref().unwrap();
        assert_eq!(metadata.request_id.as_deref(), Some("req-123"));
        assert_eq!(metadata.model_uuid.as_deref(), Some("uuid-456"));
        assert_eq!(metadata.model_info.as_ref().unwrap().name, "nova-2");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let json = r#"{"type": "Results", "brand_new_field": {"x": 1}, "start": 0.5}"#;
        let response: TranscriptResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.start, 0.5);
        assert!(response.channel.is_none());
    }

    #[test]
    fn to_message_maps_fields() {
        let response: TranscriptResponse = serde_json::from_str(SAMPLE_RESPONSE).unwrap();
        let message = response.to_message().unwrap();
        assert_eq!(message.transcript, "Hello world");
        assert_eq!(message.confidence, 0.925);
        assert_eq!(message.channel, "0");
        assert_eq!(message.start, 0.0);
        assert_eq!(message.duration, 1.98);
        assert_eq!(message.words.len(), 2);
        assert!(message.is_final);
        assert_eq!(message.words[0].punctuated_word.as_deref(), Some("Hello"));
    }

    #[test]
    fn to_message_defaults_channel_when_index_missing() {
        let json = r#"
        {
            "type": "Results",
            "channel": {"alternatives": [{"transcript": "hi", "confidence": 0.5}]}
        }
        "#;
        let response: TranscriptResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.to_message().unwrap().channel, "default");
    }

    #[test]
    fn to_message_is_none_without_alternatives() {
        let no_channel: TranscriptResponse =
            serde_json::from_str(r#"{"type": "Metadata"}"#).unwrap();
        assert!(no_channel.to_message().is_none());

        let empty_alternatives: TranscriptResponse =
            serde_json::from_str(r#"{"type": "Results", "channel": {"alternatives": []}}"#)
                .unwrap();
        assert!(empty_alternatives.to_message().is_none());
    }

    #[test]
    fn word_end_sentinel_marks_open_ended() {
        let json = r#"{"word": "um", "start": 2.0, "end": -1, "confidence": 0.4}"#;
        let word: Word = serde_json::from_str(json).unwrap();
        assert!(word.is_open_ended());
        assert!(word.end < word.start);

        let closed: Word = serde_json::from_str(
            r#"{"word": "um", "start": 2.0, "end": 2.4, "confidence": 0.4}"#,
        )
        .unwrap();
        assert!(!closed.is_open_ended());
    }

    #[test]
    fn transcript_message_clamps_confidence() {
        let high = TranscriptMessage::new("x".into(), 1.7, "0".into(), 0.0, 1.0, vec![], true);
        assert_eq!(high.confidence, 1.0);

        let low = TranscriptMessage::new("x".into(), -0.3, "0".into(), 0.0, 1.0, vec![], false);
        assert_eq!(low.confidence, 0.0);
    }
}
