pub mod client;
pub mod server;

use client::*;
use server::*;

/// Events sent to the model over the control channel.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate(ConversationItemCreateEvent),
    #[serde(rename = "response.create")]
    ResponseCreate(ResponseCreateEvent),
}

/// Events received from the model over the control channel.
///
/// The provider's event vocabulary is open-ended; frames whose `type` is not
/// represented here are delivered as [`ServerEvent::Unknown`] by the
/// transport rather than rejected.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "error")]
    Error(ErrorEvent),
    #[serde(rename = "session.created")]
    SessionCreated(SessionCreatedEvent),
    #[serde(rename = "input_audio_buffer.speech_started")]
    InputAudioBufferSpeechStarted(SpeechStartedEvent),
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    InputAudioBufferSpeechStopped(SpeechStoppedEvent),
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputAudioTranscriptionCompleted(InputAudioTranscriptionCompletedEvent),
    #[serde(rename = "response.created")]
    ResponseCreated(ResponseCreatedEvent),
    #[serde(rename = "response.audio_transcript.delta")]
    ResponseAudioTranscriptDelta(ResponseAudioTranscriptDeltaEvent),
    #[serde(rename = "response.audio_transcript.done")]
    ResponseAudioTranscriptDone(ResponseAudioTranscriptDoneEvent),
    #[serde(rename = "response.function_call_arguments.delta")]
    ResponseFunctionCallArgumentsDelta(FunctionCallArgumentsDeltaEvent),
    #[serde(rename = "response.function_call_arguments.done")]
    ResponseFunctionCallArgumentsDone(FunctionCallArgumentsDoneEvent),
    #[serde(rename = "response.done")]
    ResponseDone(ResponseDoneEvent),
    /// Any frame with an unrecognized `type`. Never produced by serde;
    /// constructed by the transport after the tagged parse fails.
    #[serde(skip)]
    Unknown(serde_json::Value),
}

impl ServerEvent {
    /// The wire `type` discriminant, or the raw `type` field for unknown
    /// frames.
    pub fn kind(&self) -> &str {
        match self {
            ServerEvent::Error(_) => "error",
            ServerEvent::SessionCreated(_) => "session.created",
            ServerEvent::InputAudioBufferSpeechStarted(_) => "input_audio_buffer.speech_started",
            ServerEvent::InputAudioBufferSpeechStopped(_) => "input_audio_buffer.speech_stopped",
            ServerEvent::InputAudioTranscriptionCompleted(_) => {
                "conversation.item.input_audio_transcription.completed"
            }
            ServerEvent::ResponseCreated(_) => "response.created",
            ServerEvent::ResponseAudioTranscriptDelta(_) => "response.audio_transcript.delta",
            ServerEvent::ResponseAudioTranscriptDone(_) => "response.audio_transcript.done",
            ServerEvent::ResponseFunctionCallArgumentsDelta(_) => {
                "response.function_call_arguments.delta"
            }
            ServerEvent::ResponseFunctionCallArgumentsDone(_) => {
                "response.function_call_arguments.done"
            }
            ServerEvent::ResponseDone(_) => "response.done",
            ServerEvent::Unknown(raw) => raw
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_transcription_completed() {
        let frame = r#"{
            "type": "conversation.item.input_audio_transcription.completed",
            "event_id": "ev_1",
            "item_id": "item_1",
            "transcript": "add a task"
        }"#;
        let event: ServerEvent = serde_json::from_str(frame).unwrap();
        match event {
            ServerEvent::InputAudioTranscriptionCompleted(e) => {
                assert_eq!(e.transcript(), "add a task");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn parses_function_call_delta_without_name() {
        // Later deltas for a call id omit the function name.
        let frame = r#"{
            "type": "response.function_call_arguments.delta",
            "call_id": "call_1",
            "delta": "{\"title\":"
        }"#;
        let event: ServerEvent = serde_json::from_str(frame).unwrap();
        match event {
            ServerEvent::ResponseFunctionCallArgumentsDelta(e) => {
                assert_eq!(e.call_id(), "call_1");
                assert_eq!(e.delta(), "{\"title\":");
                assert!(e.name().is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn unknown_type_fails_tagged_parse() {
        let frame = r#"{"type": "rate_limits.updated", "rate_limits": []}"#;
        assert!(serde_json::from_str::<ServerEvent>(frame).is_err());
    }

    #[test]
    fn serializes_user_message_item() {
        let event = ClientEvent::ConversationItemCreate(ConversationItemCreateEvent::new(
            Item::user_message("hello"),
        ));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "conversation.item.create");
        assert_eq!(json["item"]["type"], "message");
        assert_eq!(json["item"]["role"], "user");
        assert_eq!(json["item"]["content"][0]["type"], "input_text");
        assert_eq!(json["item"]["content"][0]["text"], "hello");
    }

    #[test]
    fn serializes_function_call_output_item() {
        let event = ClientEvent::ConversationItemCreate(ConversationItemCreateEvent::new(
            Item::function_call_output("call_9", r#"{"success":true}"#),
        ));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["item"]["type"], "function_call_output");
        assert_eq!(json["item"]["call_id"], "call_9");
        assert_eq!(json["item"]["output"], r#"{"success":true}"#);
    }
}
