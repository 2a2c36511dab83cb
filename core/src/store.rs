//! The persistence collaborator behind the tool executor.
//!
//! The hosted platform exposes its tables over a PostgREST-style interface;
//! each operation here is a single-row insert-and-return. The `Store` trait
//! exists so the executor and the reducer can be tested against a mock
//! without a live backend.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store rejected insert with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("store returned an unreadable row: {0}")]
    Decode(String),
    #[error("store returned no row for the insert")]
    EmptyInsert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TaskFields {
    pub title: String,
    pub client: Option<String>,
    pub priority: Priority,
    pub completed: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub client: Option<String>,
    pub priority: Priority,
    pub completed: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AppointmentFields {
    pub title: String,
    pub client: Option<String>,
    /// ISO-8601 timestamp; validated upstream, stored verbatim.
    pub date: String,
    pub duration: i64,
    pub location: Option<String>,
    pub color: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Appointment {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub client: Option<String>,
    pub date: String,
    pub duration: i64,
    #[serde(default)]
    pub location: Option<String>,
    pub color: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GeneratedFileFields {
    pub filename: String,
    pub content: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GeneratedFile {
    #[serde(default)]
    pub id: Option<String>,
    pub filename: String,
    pub content: String,
    pub mime_type: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Who said a persisted chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatMessageFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub role: ChatRole,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_task(&self, fields: TaskFields) -> Result<Task, StoreError>;

    async fn insert_appointment(&self, fields: AppointmentFields)
        -> Result<Appointment, StoreError>;

    async fn insert_generated_file(
        &self,
        fields: GeneratedFileFields,
    ) -> Result<GeneratedFile, StoreError>;

    async fn insert_message(&self, fields: ChatMessageFields) -> Result<ChatMessage, StoreError>;
}

/// `Store` implementation over a Supabase-style PostgREST endpoint.
pub struct PostgrestStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl PostgrestStore {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn insert_row<F, R>(&self, table: &str, fields: &F) -> Result<R, StoreError>
    where
        F: serde::Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            // Ask PostgREST to echo the created row back.
            .header("Prefer", "return=representation")
            .json(fields)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // PostgREST returns the representation as a one-element array.
        let mut rows: Vec<R> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        if rows.is_empty() {
            return Err(StoreError::EmptyInsert);
        }
        Ok(rows.remove(0))
    }
}

#[async_trait]
impl Store for PostgrestStore {
    async fn insert_task(&self, fields: TaskFields) -> Result<Task, StoreError> {
        self.insert_row("tasks", &fields).await
    }

    async fn insert_appointment(
        &self,
        fields: AppointmentFields,
    ) -> Result<Appointment, StoreError> {
        self.insert_row("appointments", &fields).await
    }

    async fn insert_generated_file(
        &self,
        fields: GeneratedFileFields,
    ) -> Result<GeneratedFile, StoreError> {
        self.insert_row("generated_files", &fields).await
    }

    async fn insert_message(&self, fields: ChatMessageFields) -> Result<ChatMessage, StoreError> {
        self.insert_row("messages", &fields).await
    }
}
