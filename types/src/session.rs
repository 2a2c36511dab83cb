use crate::tools::Tool;

/// The short-lived credential minted by the token broker for one realtime
/// session. The client never sees the long-lived API key.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EphemeralCredential {
    value: String,
    #[serde(default)]
    expires_at: Option<i64>,
}

impl EphemeralCredential {
    pub fn new(value: String, expires_at: Option<i64>) -> Self {
        Self { value, expires_at }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.expires_at
    }
}

/// The broker's response body, passed through from the session-create call.
/// Only `client_secret` is consumed by the transport; the rest is carried
/// opaquely.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RealtimeSessionResponse {
    #[serde(default)]
    client_secret: Option<EphemeralCredential>,

    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl RealtimeSessionResponse {
    pub fn client_secret(&self) -> Option<&EphemeralCredential> {
        self.client_secret.as_ref()
    }
}

/// Configuration for input audio transcription on the session.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InputAudioTranscription {
    model: String,
}

impl InputAudioTranscription {
    pub fn whisper() -> Self {
        Self {
            model: "whisper-1".to_string(),
        }
    }
}

/// Server-side voice activity detection configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    kind: String,
    threshold: f32,
    prefix_padding_ms: u32,
    silence_duration_ms: u32,
}

impl TurnDetection {
    /// The VAD tuning the assistant runs with in production.
    pub fn server_vad() -> Self {
        Self {
            kind: "server_vad".to_string(),
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 800,
        }
    }
}

/// The body POSTed by the token broker to the provider's session endpoint.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionCreateRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_transcription: Option<InputAudioTranscription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    turn_detection: Option<TurnDetection>,
}

impl SessionCreateRequest {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            voice: None,
            instructions: None,
            tools: vec![],
            tool_choice: None,
            input_audio_transcription: None,
            turn_detection: None,
        }
    }

    pub fn with_voice(mut self, voice: &str) -> Self {
        self.voice = Some(voice.to_string());
        self
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.instructions = Some(instructions.to_string());
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_choice_auto(mut self) -> Self {
        self.tool_choice = Some("auto".to_string());
        self
    }

    pub fn with_input_audio_transcription(mut self, t: InputAudioTranscription) -> Self {
        self.input_audio_transcription = Some(t);
        self
    }

    pub fn with_turn_detection(mut self, t: TurnDetection) -> Self {
        self.turn_detection = Some(t);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_round_trips() {
        let body = r#"{"client_secret":{"value":"ek_abc","expires_at":1735689600},"id":"sess_1"}"#;
        let resp: RealtimeSessionResponse = serde_json::from_str(body).unwrap();
        let secret = resp.client_secret().unwrap();
        assert_eq!(secret.value(), "ek_abc");
        assert_eq!(secret.expires_at(), Some(1735689600));

        let back = serde_json::to_value(&resp).unwrap();
        assert_eq!(back["client_secret"]["value"], "ek_abc");
        assert_eq!(back["id"], "sess_1");
    }

    #[test]
    fn missing_client_secret_is_none() {
        let resp: RealtimeSessionResponse = serde_json::from_str(r#"{"error":"nope"}"#).unwrap();
        assert!(resp.client_secret().is_none());
    }

    #[test]
    fn session_request_serializes_vad_constants() {
        let req = SessionCreateRequest::new("gpt-4o-realtime-preview-2024-12-17")
            .with_voice("alloy")
            .with_tool_choice_auto()
            .with_input_audio_transcription(InputAudioTranscription::whisper())
            .with_turn_detection(TurnDetection::server_vad());
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["turn_detection"]["type"], "server_vad");
        assert_eq!(json["turn_detection"]["silence_duration_ms"], 800);
        assert_eq!(json["input_audio_transcription"]["model"], "whisper-1");
        assert_eq!(json["tool_choice"], "auto");
    }
}
