/// A content part of a user message item.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "input_text")]
    InputText { text: String },
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// A conversation item created by the client.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum Item {
    #[serde(rename = "message")]
    Message {
        role: MessageRole,
        content: Vec<ContentPart>,
    },
    /// The return path for a completed tool call: the serialized result,
    /// keyed by the originating call id.
    #[serde(rename = "function_call_output")]
    FunctionCallOutput { call_id: String, output: String },
}

impl Item {
    pub fn user_message(text: &str) -> Self {
        Item::Message {
            role: MessageRole::User,
            content: vec![ContentPart::InputText {
                text: text.to_string(),
            }],
        }
    }

    pub fn function_call_output(call_id: &str, output: &str) -> Self {
        Item::FunctionCallOutput {
            call_id: call_id.to_string(),
            output: output.to_string(),
        }
    }
}

/// `conversation.item.create` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConversationItemCreateEvent {
    item: Item,
}

impl ConversationItemCreateEvent {
    pub fn new(item: Item) -> Self {
        Self { item }
    }

    pub fn item(&self) -> &Item {
        &self.item
    }
}

/// `response.create` event
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ResponseCreateEvent {}

impl ResponseCreateEvent {
    pub fn new() -> Self {
        Self::default()
    }
}
