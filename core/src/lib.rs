pub mod conversation;
pub mod language;
pub mod messages;
pub mod prompts;
pub mod store;
pub mod tools;

use crate::conversation::ConversationState;
use crate::tools::ToolNotice;

/// Updates the conversation core emits toward the host.
///
/// This enum is the primary API for decoupling the event reducer's
/// decision-making from the host's rendering and persistence of side
/// effects. The host consumes these from a channel and never reaches into
/// the reducer's state.
#[derive(Debug, Clone)]
pub enum Update {
    /// The conversation moved to a new state.
    State(ConversationState),
    /// The user's utterance was finalized by transcription.
    UserTranscript(String),
    /// Any in-progress partial transcript display should be cleared.
    PartialTranscriptCleared,
    /// The assistant's response text so far (progressive reveal).
    AssistantText(String),
    /// A tool call completed with persisted data worth surfacing.
    ToolNotice(ToolNotice),
    /// One finalized exchange, emitted exactly once, for chat history.
    Turn { user: String, assistant: String },
}
