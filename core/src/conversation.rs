//! Event reducer for one realtime voice session.
//!
//! The transport delivers inbound control-channel events asynchronously and
//! out of the caller's control, so the conversation is driven entirely by
//! events: the state is a pure function of the event stream, and every side
//! effect (tool execution, results sent back to the model, updates toward
//! the host) flows through the collaborators passed into `handle_event`.

use crate::Update;
use crate::language::Language;
use crate::store::Store;
use crate::tools::{self, ToolKind, ToolNotice, ToolOutcome};
use anyhow::Result;
use async_trait::async_trait;
use friday_realtime_types::ServerEvent;
#[cfg(test)]
use mockall::automock;
use std::collections::HashMap;

/// The single conversation state. Exactly one holds at any time; all
/// transitions are driven by inbound events, never by timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Connecting,
    Idle,
    Listening,
    Processing,
    Speaking,
    /// Terminal until the host re-runs the transport's `init` and builds a
    /// fresh conversation; there is no automatic recovery.
    Error,
}

/// The send seam back into the session transport. The reducer only ever
/// needs the tool-result return path; implementations are expected to no-op
/// when the underlying channel has closed.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ControlChannel: Send + Sync {
    async fn send_tool_result(&self, call_id: &str, output: String) -> Result<()>;
}

/// A tool call whose arguments are still streaming in.
#[derive(Debug, Clone, Default)]
struct PendingToolCall {
    name: String,
    arguments: String,
}

/// Pure transition function: `(state, event) -> state'`.
///
/// Kept separate from the effectful handler so the state machine is
/// testable without any collaborator.
pub fn transition(state: ConversationState, event: &ServerEvent) -> ConversationState {
    match event {
        ServerEvent::SessionCreated(_) => ConversationState::Idle,
        ServerEvent::InputAudioBufferSpeechStarted(_) => ConversationState::Listening,
        ServerEvent::InputAudioBufferSpeechStopped(_) => ConversationState::Processing,
        ServerEvent::ResponseCreated(_) => ConversationState::Processing,
        ServerEvent::ResponseAudioTranscriptDelta(_) => ConversationState::Speaking,
        ServerEvent::ResponseDone(_) => ConversationState::Idle,
        ServerEvent::Error(_) => ConversationState::Error,
        _ => state,
    }
}

/// Mutable conversation state for one active session. Private, single-owner;
/// a new session gets a new value, so the pending-call map and transcript
/// buffers can never leak across sessions.
pub struct VoiceConversation {
    state: ConversationState,
    language: Language,
    user_transcript: Option<String>,
    assistant_response: String,
    pending_calls: HashMap<String, PendingToolCall>,
}

impl VoiceConversation {
    pub fn new(language: Language) -> Self {
        Self {
            state: ConversationState::Connecting,
            language,
            user_transcript: None,
            assistant_response: String::new(),
            pending_calls: HashMap::new(),
        }
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// True while at least one tool call has unconsumed argument deltas.
    /// Between tool-call episodes this must be false; a nonempty map after
    /// teardown marks an unresolved call, which is discarded, never
    /// replayed.
    pub fn has_pending_calls(&self) -> bool {
        !self.pending_calls.is_empty()
    }

    /// Mark the session failed from outside the event stream (transport
    /// `init` errors surface here).
    pub async fn fail(&mut self, update_tx: &tokio::sync::mpsc::Sender<Update>) -> Result<()> {
        self.state = ConversationState::Error;
        update_tx.send(Update::State(self.state)).await?;
        Ok(())
    }

    /// Reduce one inbound event into state, buffers, and side effects.
    pub async fn handle_event<S, C>(
        conversation: &mut VoiceConversation,
        store: &S,
        control: &C,
        event: ServerEvent,
        update_tx: &tokio::sync::mpsc::Sender<Update>,
    ) -> Result<()>
    where
        S: Store + ?Sized,
        C: ControlChannel + ?Sized,
    {
        let next = transition(conversation.state, &event);
        if next != conversation.state {
            conversation.state = next;
            update_tx.send(Update::State(next)).await?;
        }

        match event {
            ServerEvent::SessionCreated(e) => {
                tracing::info!(event_id = ?e.event_id(), "session created");
            }

            ServerEvent::InputAudioBufferSpeechStarted(_) => {
                update_tx.send(Update::PartialTranscriptCleared).await?;
            }

            ServerEvent::InputAudioBufferSpeechStopped(_) => {}

            ServerEvent::InputAudioTranscriptionCompleted(e) => {
                let text = e.transcript().to_string();
                conversation.user_transcript = Some(text.clone());
                update_tx.send(Update::UserTranscript(text)).await?;
                update_tx.send(Update::PartialTranscriptCleared).await?;
            }

            ServerEvent::ResponseCreated(_) => {
                conversation.assistant_response.clear();
            }

            ServerEvent::ResponseAudioTranscriptDelta(e) => {
                conversation.assistant_response.push_str(e.delta());
                update_tx
                    .send(Update::AssistantText(conversation.assistant_response.clone()))
                    .await?;
            }

            ServerEvent::ResponseAudioTranscriptDone(e) => {
                // Prefer the final transcript for display; the accumulated
                // buffer stays authoritative for the persisted turn.
                let text = e
                    .transcript()
                    .map(str::to_string)
                    .unwrap_or_else(|| conversation.assistant_response.clone());
                update_tx.send(Update::AssistantText(text)).await?;
            }

            ServerEvent::ResponseFunctionCallArgumentsDelta(e) => {
                // Deltas for one call id are appended in receipt order; the
                // fragments assemble a single JSON document. Calls are keyed
                // strictly by call id so interleaved calls cannot mix.
                let entry = conversation
                    .pending_calls
                    .entry(e.call_id().to_string())
                    .or_default();
                if entry.name.is_empty() {
                    if let Some(name) = e.name() {
                        entry.name = name.to_string();
                    }
                }
                entry.arguments.push_str(e.delta());
            }

            ServerEvent::ResponseFunctionCallArgumentsDone(e) => {
                let call_id = e.call_id().to_string();
                let pending = conversation.pending_calls.remove(&call_id);

                let (name, arguments) = match pending {
                    Some(p) if !p.arguments.is_empty() => {
                        let name = if p.name.is_empty() {
                            e.name().unwrap_or_default().to_string()
                        } else {
                            p.name
                        };
                        (name, p.arguments)
                    }
                    // No deltas were seen; fall back to the completed
                    // arguments carried by the event itself.
                    _ => (
                        e.name().unwrap_or_default().to_string(),
                        e.arguments().to_string(),
                    ),
                };

                let outcome = match serde_json::from_str::<serde_json::Value>(&arguments) {
                    Ok(args) => {
                        tools::execute_tool(store, &name, args, conversation.language).await
                    }
                    Err(err) => {
                        tracing::warn!(call_id = %call_id, tool = %name, error = %err,
                            "tool call arguments did not parse");
                        ToolOutcome::failure(format!("Error executing {}: invalid arguments", name))
                    }
                };

                if outcome.success {
                    if let Some(data) = &outcome.data {
                        if let Some(kind) = ToolKind::from_tool_name(&name) {
                            update_tx
                                .send(Update::ToolNotice(ToolNotice {
                                    kind,
                                    success: true,
                                    data: data.clone(),
                                }))
                                .await?;
                        }
                    }
                }

                // The model must never be left waiting on a call, so the
                // result (success or failure) always goes back keyed by the
                // same call id. A closed channel is the transport's concern.
                let serialized = serde_json::to_string(&outcome)?;
                if let Err(err) = control.send_tool_result(&call_id, serialized).await {
                    tracing::warn!(call_id = %call_id, error = %err, "failed to return tool result");
                }
            }

            ServerEvent::ResponseDone(_) => {
                // A tool-call-only response carries no spoken text; the
                // user's utterance stays buffered until the follow-up
                // response that does speak. Both buffers clear together on
                // emission, so each exchange yields exactly one turn.
                if !conversation.assistant_response.is_empty() {
                    if let Some(user) = conversation.user_transcript.take() {
                        update_tx
                            .send(Update::Turn {
                                user,
                                assistant: conversation.assistant_response.clone(),
                            })
                            .await?;
                        conversation.assistant_response.clear();
                    }
                }
            }

            ServerEvent::Error(e) => {
                tracing::error!(
                    code = ?e.error().code(),
                    message = %e.error().message(),
                    "realtime session error"
                );
            }

            ServerEvent::Unknown(raw) => {
                // The provider may add event types at any time; tolerate and
                // log them without touching conversation state.
                tracing::debug!(
                    kind = raw.get("type").and_then(|t| t.as_str()).unwrap_or("unknown"),
                    "ignoring unrecognized event"
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockStore;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn event(frame: serde_json::Value) -> ServerEvent {
        serde_json::from_value(frame).unwrap()
    }

    fn drain(rx: &mut mpsc::Receiver<Update>) -> Vec<Update> {
        let mut updates = vec![];
        while let Ok(u) = rx.try_recv() {
            updates.push(u);
        }
        updates
    }

    async fn feed(
        conversation: &mut VoiceConversation,
        store: &MockStore,
        control: &MockControlChannel,
        tx: &mpsc::Sender<Update>,
        frames: Vec<serde_json::Value>,
    ) {
        for frame in frames {
            VoiceConversation::handle_event(conversation, store, control, event(frame), tx)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn full_exchange_accumulates_and_emits_one_turn() {
        let store = MockStore::new();
        let control = MockControlChannel::new();
        let (tx, mut rx) = mpsc::channel(64);
        let mut conversation = VoiceConversation::new(Language::En);

        feed(
            &mut conversation,
            &store,
            &control,
            &tx,
            vec![
                json!({"type": "session.created", "session": {}}),
                json!({"type": "input_audio_buffer.speech_started"}),
                json!({"type": "input_audio_buffer.speech_stopped"}),
                json!({
                    "type": "conversation.item.input_audio_transcription.completed",
                    "transcript": "say hi"
                }),
                json!({"type": "response.created", "response": {}}),
                json!({"type": "response.audio_transcript.delta", "delta": "Hi"}),
                json!({"type": "response.audio_transcript.delta", "delta": " there"}),
                json!({"type": "response.audio_transcript.done"}),
                json!({"type": "response.done", "response": {}}),
            ],
        )
        .await;

        assert_eq!(conversation.state(), ConversationState::Idle);

        let updates = drain(&mut rx);
        let turns: Vec<_> = updates
            .iter()
            .filter_map(|u| match u {
                Update::Turn { user, assistant } => Some((user.clone(), assistant.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(turns, vec![("say hi".to_string(), "Hi there".to_string())]);

        // The last assistant text surfaced equals the accumulated buffer.
        let last_text = updates
            .iter()
            .rev()
            .find_map(|u| match u {
                Update::AssistantText(t) => Some(t.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_text, "Hi there");
    }

    #[tokio::test]
    async fn done_transcript_overrides_displayed_text() {
        let store = MockStore::new();
        let control = MockControlChannel::new();
        let (tx, mut rx) = mpsc::channel(64);
        let mut conversation = VoiceConversation::new(Language::En);

        feed(
            &mut conversation,
            &store,
            &control,
            &tx,
            vec![
                json!({"type": "response.created", "response": {}}),
                json!({"type": "response.audio_transcript.delta", "delta": "Hi ther"}),
                json!({"type": "response.audio_transcript.done", "transcript": "Hi there"}),
            ],
        )
        .await;

        let updates = drain(&mut rx);
        let last_text = updates
            .iter()
            .rev()
            .find_map(|u| match u {
                Update::AssistantText(t) => Some(t.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_text, "Hi there");
    }

    #[tokio::test]
    async fn second_response_without_new_transcript_emits_no_turn() {
        let store = MockStore::new();
        let control = MockControlChannel::new();
        let (tx, mut rx) = mpsc::channel(64);
        let mut conversation = VoiceConversation::new(Language::En);

        feed(
            &mut conversation,
            &store,
            &control,
            &tx,
            vec![
                json!({
                    "type": "conversation.item.input_audio_transcription.completed",
                    "transcript": "hello"
                }),
                json!({"type": "response.created", "response": {}}),
                json!({"type": "response.audio_transcript.delta", "delta": "Hey"}),
                json!({"type": "response.done", "response": {}}),
                // A follow-up response with no new user utterance.
                json!({"type": "response.created", "response": {}}),
                json!({"type": "response.audio_transcript.delta", "delta": "Still here"}),
                json!({"type": "response.done", "response": {}}),
            ],
        )
        .await;

        let turn_count = drain(&mut rx)
            .iter()
            .filter(|u| matches!(u, Update::Turn { .. }))
            .count();
        assert_eq!(turn_count, 1);
    }

    #[tokio::test]
    async fn tool_call_response_keeps_user_transcript_for_spoken_follow_up() {
        let mut store = MockStore::new();
        store
            .expect_insert_task()
            .withf(|fields| fields.title == "Call Anna")
            .returning(|fields| {
                Ok(crate::store::Task {
                    id: None,
                    title: fields.title.clone(),
                    client: None,
                    priority: fields.priority,
                    completed: false,
                    created_at: None,
                })
            })
            .once();

        let mut control = MockControlChannel::new();
        control
            .expect_send_tool_result()
            .returning(|_, _| Ok(()))
            .once();

        let (tx, mut rx) = mpsc::channel(64);
        let mut conversation = VoiceConversation::new(Language::En);

        // The tool-call response speaks nothing; the confirmation arrives in
        // a follow-up response after the tool result goes back to the model.
        feed(
            &mut conversation,
            &store,
            &control,
            &tx,
            vec![
                json!({
                    "type": "conversation.item.input_audio_transcription.completed",
                    "transcript": "add a task to call Anna"
                }),
                json!({"type": "response.created", "response": {}}),
                json!({"type": "response.function_call_arguments.done",
                       "call_id": "call_1", "name": "add_task",
                       "arguments": "{\"title\":\"Call Anna\"}"}),
                json!({"type": "response.done", "response": {}}),
                json!({"type": "response.created", "response": {}}),
                json!({"type": "response.audio_transcript.delta", "delta": "Task added."}),
                json!({"type": "response.done", "response": {}}),
            ],
        )
        .await;

        let turns: Vec<_> = drain(&mut rx)
            .iter()
            .filter_map(|u| match u {
                Update::Turn { user, assistant } => Some((user.clone(), assistant.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            turns,
            vec![(
                "add a task to call Anna".to_string(),
                "Task added.".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn interleaved_argument_deltas_stay_keyed_by_call_id() {
        let mut store = MockStore::new();
        store
            .expect_insert_task()
            .withf(|fields| fields.title == "Call Anna")
            .returning(|fields| {
                Ok(crate::store::Task {
                    id: Some("t-1".to_string()),
                    title: fields.title.clone(),
                    client: fields.client.clone(),
                    priority: fields.priority,
                    completed: false,
                    created_at: None,
                })
            })
            .once();
        store
            .expect_insert_generated_file()
            .withf(|fields| fields.filename == "memo.txt" && fields.content == "draft")
            .returning(|fields| {
                Ok(crate::store::GeneratedFile {
                    id: Some("f-1".to_string()),
                    filename: fields.filename.clone(),
                    content: fields.content.clone(),
                    mime_type: fields.mime_type.clone(),
                    created_at: None,
                })
            })
            .once();

        let mut control = MockControlChannel::new();
        control
            .expect_send_tool_result()
            .withf(|call_id, output| {
                let outcome: ToolOutcome = serde_json::from_str(output).unwrap();
                (call_id == "call_a" || call_id == "call_b") && outcome.success
            })
            .returning(|_, _| Ok(()))
            .times(2);

        let (tx, _rx) = mpsc::channel(64);
        let mut conversation = VoiceConversation::new(Language::En);

        // Two calls in flight, deltas interleaved; each JSON document must
        // assemble from its own call id's fragments, in receipt order.
        feed(
            &mut conversation,
            &store,
            &control,
            &tx,
            vec![
                json!({"type": "response.function_call_arguments.delta",
                       "call_id": "call_a", "name": "add_task", "delta": "{\"title\":"}),
                json!({"type": "response.function_call_arguments.delta",
                       "call_id": "call_b", "name": "generate_file",
                       "delta": "{\"filename\":\"memo.txt\","}),
                json!({"type": "response.function_call_arguments.delta",
                       "call_id": "call_a", "delta": "\"Call Anna\"}"}),
                json!({"type": "response.function_call_arguments.delta",
                       "call_id": "call_b", "delta": "\"content\":\"draft\"}"}),
                json!({"type": "response.function_call_arguments.done",
                       "call_id": "call_a", "name": "add_task", "arguments": ""}),
                json!({"type": "response.function_call_arguments.done",
                       "call_id": "call_b", "name": "generate_file", "arguments": ""}),
            ],
        )
        .await;

        // Accumulation completed and was cleaned up.
        assert!(!conversation.has_pending_calls());
    }

    #[tokio::test]
    async fn done_without_deltas_uses_event_arguments() {
        let mut store = MockStore::new();
        store
            .expect_insert_task()
            .withf(|fields| fields.title == "Ship it")
            .returning(|fields| {
                Ok(crate::store::Task {
                    id: None,
                    title: fields.title.clone(),
                    client: None,
                    priority: fields.priority,
                    completed: false,
                    created_at: None,
                })
            })
            .once();

        let mut control = MockControlChannel::new();
        control
            .expect_send_tool_result()
            .returning(|_, _| Ok(()))
            .once();

        let (tx, _rx) = mpsc::channel(64);
        let mut conversation = VoiceConversation::new(Language::En);

        feed(
            &mut conversation,
            &store,
            &control,
            &tx,
            vec![json!({
                "type": "response.function_call_arguments.done",
                "call_id": "call_1",
                "name": "add_task",
                "arguments": "{\"title\":\"Ship it\"}"
            })],
        )
        .await;
    }

    #[tokio::test]
    async fn malformed_arguments_still_send_failure_result() {
        let mut store = MockStore::new();
        store.expect_insert_task().never();

        let mut control = MockControlChannel::new();
        control
            .expect_send_tool_result()
            .withf(|call_id, output| {
                let outcome: ToolOutcome = serde_json::from_str(output).unwrap();
                call_id == "call_bad" && !outcome.success && !outcome.message.is_empty()
            })
            .returning(|_, _| Ok(()))
            .once();

        let (tx, _rx) = mpsc::channel(64);
        let mut conversation = VoiceConversation::new(Language::En);

        feed(
            &mut conversation,
            &store,
            &control,
            &tx,
            vec![
                json!({"type": "response.function_call_arguments.delta",
                       "call_id": "call_bad", "name": "add_task", "delta": "{\"title\": tru"}),
                json!({"type": "response.function_call_arguments.done",
                       "call_id": "call_bad", "name": "add_task", "arguments": ""}),
            ],
        )
        .await;

        assert!(!conversation.has_pending_calls());
    }

    #[tokio::test]
    async fn dropped_send_does_not_abort_the_turn() {
        let mut store = MockStore::new();
        store
            .expect_insert_task()
            .returning(|fields| {
                Ok(crate::store::Task {
                    id: None,
                    title: fields.title.clone(),
                    client: None,
                    priority: fields.priority,
                    completed: false,
                    created_at: None,
                })
            })
            .once();

        let mut control = MockControlChannel::new();
        control
            .expect_send_tool_result()
            .returning(|_, _| Err(anyhow::anyhow!("channel closed")))
            .once();

        let (tx, _rx) = mpsc::channel(64);
        let mut conversation = VoiceConversation::new(Language::En);

        let result = VoiceConversation::handle_event(
            &mut conversation,
            &store,
            &control,
            event(json!({
                "type": "response.function_call_arguments.done",
                "call_id": "call_1",
                "name": "add_task",
                "arguments": "{\"title\":\"Late\"}"
            })),
            &tx,
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn unknown_event_changes_nothing() {
        let store = MockStore::new();
        let control = MockControlChannel::new();
        let (tx, mut rx) = mpsc::channel(64);
        let mut conversation = VoiceConversation::new(Language::En);

        feed(
            &mut conversation,
            &store,
            &control,
            &tx,
            vec![json!({"type": "session.created", "session": {}})],
        )
        .await;
        drain(&mut rx);

        VoiceConversation::handle_event(
            &mut conversation,
            &store,
            &control,
            ServerEvent::Unknown(json!({"type": "rate_limits.updated", "rate_limits": []})),
            &tx,
        )
        .await
        .unwrap();

        assert_eq!(conversation.state(), ConversationState::Idle);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn transition_table() {
        use ConversationState::*;
        let cases: Vec<(ConversationState, serde_json::Value, ConversationState)> = vec![
            (Connecting, json!({"type": "session.created", "session": {}}), Idle),
            (Idle, json!({"type": "input_audio_buffer.speech_started"}), Listening),
            (Listening, json!({"type": "input_audio_buffer.speech_stopped"}), Processing),
            (Processing, json!({"type": "response.created", "response": {}}), Processing),
            (Processing, json!({"type": "response.audio_transcript.delta", "delta": "x"}), Speaking),
            (Speaking, json!({"type": "response.done", "response": {}}), Idle),
            (Speaking, json!({"type": "error", "error": {"message": "boom"}}), Error),
            // Events that never move the state.
            (Listening, json!({
                "type": "conversation.item.input_audio_transcription.completed",
                "transcript": "hi"
            }), Listening),
            (Speaking, json!({"type": "response.audio_transcript.done"}), Speaking),
        ];
        for (from, frame, to) in cases {
            let e: ServerEvent = serde_json::from_value(frame).unwrap();
            assert_eq!(transition(from, &e), to, "from {:?} on {}", from, e.kind());
        }
    }

    #[test]
    fn unknown_event_leaves_any_state() {
        use ConversationState::*;
        let unknown = ServerEvent::Unknown(json!({"type": "conversation.item.created"}));
        for state in [Connecting, Idle, Listening, Processing, Speaking, Error] {
            assert_eq!(transition(state, &unknown), state);
        }
    }
}
