/// Details carried by an `error` event.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorDetails {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorDetails {
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or("unknown error")
    }
}

/// `error` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorEvent {
    #[serde(default)]
    event_id: Option<String>,

    /// Details about the error
    error: ErrorDetails,
}

impl ErrorEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn error(&self) -> &ErrorDetails {
        &self.error
    }
}

/// `session.created` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionCreatedEvent {
    #[serde(default)]
    event_id: Option<String>,

    /// The session resource, kept opaque; nothing in the reducer reads it.
    #[serde(default)]
    session: serde_json::Value,
}

impl SessionCreatedEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn session(&self) -> &serde_json::Value {
        &self.session
    }
}

/// `input_audio_buffer.speech_started` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SpeechStartedEvent {
    #[serde(default)]
    event_id: Option<String>,

    /// Milliseconds since the session started when speech was detected
    #[serde(default)]
    audio_start_ms: Option<i32>,
    /// The ID of the user message item that will be created when speech stops
    #[serde(default)]
    item_id: Option<String>,
}

impl SpeechStartedEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn audio_start_ms(&self) -> Option<i32> {
        self.audio_start_ms
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }
}

/// `input_audio_buffer.speech_stopped` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SpeechStoppedEvent {
    #[serde(default)]
    event_id: Option<String>,

    /// Milliseconds since the session started when speech stopped
    #[serde(default)]
    audio_end_ms: Option<i32>,
    #[serde(default)]
    item_id: Option<String>,
}

impl SpeechStoppedEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn audio_end_ms(&self) -> Option<i32> {
        self.audio_end_ms
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }
}

/// `conversation.item.input_audio_transcription.completed` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InputAudioTranscriptionCompletedEvent {
    #[serde(default)]
    event_id: Option<String>,

    /// The ID of the user message item
    #[serde(default)]
    item_id: Option<String>,

    /// The transcribed text
    #[serde(default)]
    transcript: String,
}

impl InputAudioTranscriptionCompletedEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }
}

/// `response.created` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseCreatedEvent {
    #[serde(default)]
    event_id: Option<String>,

    #[serde(default)]
    response: serde_json::Value,
}

impl ResponseCreatedEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn response(&self) -> &serde_json::Value {
        &self.response
    }
}

/// `response.audio_transcript.delta` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseAudioTranscriptDeltaEvent {
    #[serde(default)]
    event_id: Option<String>,

    #[serde(default)]
    response_id: Option<String>,
    #[serde(default)]
    item_id: Option<String>,
    /// The delta in the audio transcript
    #[serde(default)]
    delta: String,
}

impl ResponseAudioTranscriptDeltaEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn response_id(&self) -> Option<&str> {
        self.response_id.as_deref()
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    pub fn delta(&self) -> &str {
        &self.delta
    }
}

/// `response.audio_transcript.done` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseAudioTranscriptDoneEvent {
    #[serde(default)]
    event_id: Option<String>,

    #[serde(default)]
    response_id: Option<String>,
    #[serde(default)]
    item_id: Option<String>,
    /// The completed audio transcript
    #[serde(default)]
    transcript: Option<String>,
}

impl ResponseAudioTranscriptDoneEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn response_id(&self) -> Option<&str> {
        self.response_id.as_deref()
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    pub fn transcript(&self) -> Option<&str> {
        self.transcript.as_deref()
    }
}

/// `response.function_call_arguments.delta` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionCallArgumentsDeltaEvent {
    #[serde(default)]
    event_id: Option<String>,

    #[serde(default)]
    response_id: Option<String>,
    #[serde(default)]
    item_id: Option<String>,
    /// The ID of the function call
    call_id: String,
    /// The name of the function; only guaranteed on the first delta
    #[serde(default)]
    name: Option<String>,
    /// The delta in the function calling arguments
    #[serde(default)]
    delta: String,
}

impl FunctionCallArgumentsDeltaEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn response_id(&self) -> Option<&str> {
        self.response_id.as_deref()
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn delta(&self) -> &str {
        &self.delta
    }
}

/// `response.function_call_arguments.done` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionCallArgumentsDoneEvent {
    #[serde(default)]
    event_id: Option<String>,

    #[serde(default)]
    response_id: Option<String>,
    #[serde(default)]
    item_id: Option<String>,
    /// The ID of the function call
    call_id: String,
    #[serde(default)]
    name: Option<String>,
    /// The completed function calling arguments
    #[serde(default)]
    arguments: String,
}

impl FunctionCallArgumentsDoneEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn response_id(&self) -> Option<&str> {
        self.response_id.as_deref()
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn arguments(&self) -> &str {
        &self.arguments
    }
}

/// `response.done` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseDoneEvent {
    #[serde(default)]
    event_id: Option<String>,

    #[serde(default)]
    response: serde_json::Value,
}

impl ResponseDoneEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn response(&self) -> &serde_json::Value {
        &self.response
    }
}
