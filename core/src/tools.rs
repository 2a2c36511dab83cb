//! Tool schemas and the executor dispatching model-issued tool calls.
//!
//! The schemas are shared by the realtime-session broker and the chat
//! endpoint; the executor is shared by the event reducer and any
//! server-side tool post-processing. One definition, consumed everywhere.

use crate::language::Language;
use crate::messages;
use crate::store::{
    AppointmentFields, GeneratedFileFields, Priority, Store, TaskFields,
};
use friday_realtime_types::tools::{FunctionTool, Tool};
use serde_json::json;

/// Default display color for appointments created by voice.
const APPOINTMENT_COLOR: &str = "blue";
/// Default appointment length in minutes.
const DEFAULT_DURATION_MIN: i64 = 30;
/// Default MIME type for generated files.
const DEFAULT_MIME_TYPE: &str = "text/plain";

/// The uniform envelope returned for every tool call, success or not.
/// Serialized unchanged both back to the model and toward the host UI.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolOutcome {
    pub fn failure(message: String) -> Self {
        Self {
            success: false,
            message,
            data: None,
        }
    }
}

/// What a tool call created, derived by stripping the verb prefix from the
/// tool name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Task,
    Appointment,
    File,
}

impl ToolKind {
    pub fn from_tool_name(name: &str) -> Option<Self> {
        match name {
            "add_task" => Some(ToolKind::Task),
            "add_appointment" => Some(ToolKind::Appointment),
            "generate_file" => Some(ToolKind::File),
            _ => None,
        }
    }
}

/// Structured notification for the host UI, emitted alongside the
/// model-facing result when a call persisted data.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolNotice {
    #[serde(rename = "type")]
    pub kind: ToolKind,
    pub success: bool,
    pub data: serde_json::Value,
}

/// The three tool schemas advertised on every session.
pub fn schemas() -> Vec<Tool> {
    vec![
        Tool::Function(FunctionTool::new(
            "add_task".to_string(),
            "Add a new task to the user's task list. Use this when they ask to create, add, or remember a task or to-do item.".to_string(),
            json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "The task title" },
                    "client": { "type": "string", "description": "Optional client name associated with the task" },
                    "priority": { "type": "string", "enum": ["low", "medium", "high"], "description": "Task priority level" }
                },
                "required": ["title", "priority"]
            }),
        )),
        Tool::Function(FunctionTool::new(
            "add_appointment".to_string(),
            "Add a new appointment or reminder to the user's calendar. Use when they want to schedule something or set a reminder.".to_string(),
            json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "The appointment title" },
                    "client": { "type": "string", "description": "Optional client or person name" },
                    "date": { "type": "string", "description": "ISO 8601 date string for when the appointment is scheduled" },
                    "duration": { "type": "number", "description": "Duration in minutes (default 30)" },
                    "location": { "type": "string", "description": "Optional location" }
                },
                "required": ["title", "date"]
            }),
        )),
        Tool::Function(FunctionTool::new(
            "generate_file".to_string(),
            "Generate and create a file with content such as documents, contracts, emails, letters, code, or notes. ALWAYS use this tool when asked to write, create, or generate any text document.".to_string(),
            json!({
                "type": "object",
                "properties": {
                    "filename": { "type": "string", "description": "Name of the file with extension (e.g., contract.txt, email.txt)" },
                    "content": { "type": "string", "description": "The complete file content" },
                    "mime_type": { "type": "string", "description": "MIME type of the file (default text/plain)" }
                },
                "required": ["filename", "content"]
            }),
        )),
    ]
}

#[derive(Debug, serde::Deserialize)]
struct AddTaskArgs {
    title: String,
    #[serde(default)]
    client: Option<String>,
    #[serde(default)]
    priority: Priority,
}

#[derive(Debug, serde::Deserialize)]
struct AddAppointmentArgs {
    title: String,
    #[serde(default)]
    client: Option<String>,
    date: String,
    #[serde(default)]
    duration: Option<i64>,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct GenerateFileArgs {
    filename: String,
    content: String,
    #[serde(default)]
    mime_type: Option<String>,
}

/// Run one tool call against the store.
///
/// Never returns an error: every failure mode, including an unknown tool
/// name, malformed arguments, and a rejected insert, is folded into a
/// `ToolOutcome` so a bad call cannot abort the surrounding turn.
pub async fn execute_tool<S: Store + ?Sized>(
    store: &S,
    name: &str,
    args: serde_json::Value,
    language: Language,
) -> ToolOutcome {
    tracing::debug!(tool = name, "executing tool call");
    match name {
        "add_task" => add_task(store, args, language).await,
        "add_appointment" => add_appointment(store, args, language).await,
        "generate_file" => generate_file(store, args, language).await,
        other => ToolOutcome::failure(format!("Unknown tool: {}", other)),
    }
}

async fn add_task<S: Store + ?Sized>(
    store: &S,
    args: serde_json::Value,
    language: Language,
) -> ToolOutcome {
    let args: AddTaskArgs = match serde_json::from_value(args) {
        Ok(args) => args,
        Err(e) => return invalid_arguments("add_task", &e.to_string()),
    };
    if args.title.trim().is_empty() {
        return invalid_arguments("add_task", "title must not be empty");
    }

    let fields = TaskFields {
        title: args.title,
        client: args.client,
        priority: args.priority,
        completed: false,
    };
    match store.insert_task(fields).await {
        Ok(task) => {
            let message = messages::task_added(language, &task.title);
            ToolOutcome {
                success: true,
                message,
                data: serde_json::to_value(task).ok(),
            }
        }
        Err(e) => execution_failed("add_task", &e.to_string()),
    }
}

async fn add_appointment<S: Store + ?Sized>(
    store: &S,
    args: serde_json::Value,
    language: Language,
) -> ToolOutcome {
    let args: AddAppointmentArgs = match serde_json::from_value(args) {
        Ok(args) => args,
        // A missing date lands here; it is never defaulted to "now".
        Err(e) => return invalid_arguments("add_appointment", &e.to_string()),
    };
    if args.title.trim().is_empty() {
        return invalid_arguments("add_appointment", "title must not be empty");
    }
    if args.date.trim().is_empty() {
        return invalid_arguments("add_appointment", "date must not be empty");
    }

    let fields = AppointmentFields {
        title: args.title,
        client: args.client,
        date: args.date,
        duration: args.duration.unwrap_or(DEFAULT_DURATION_MIN),
        location: args.location,
        color: APPOINTMENT_COLOR.to_string(),
    };
    match store.insert_appointment(fields).await {
        Ok(appointment) => {
            let message = messages::appointment_scheduled(language, &appointment.title);
            ToolOutcome {
                success: true,
                message,
                data: serde_json::to_value(appointment).ok(),
            }
        }
        Err(e) => execution_failed("add_appointment", &e.to_string()),
    }
}

async fn generate_file<S: Store + ?Sized>(
    store: &S,
    args: serde_json::Value,
    language: Language,
) -> ToolOutcome {
    let args: GenerateFileArgs = match serde_json::from_value(args) {
        Ok(args) => args,
        Err(e) => return invalid_arguments("generate_file", &e.to_string()),
    };
    if args.filename.trim().is_empty() {
        return invalid_arguments("generate_file", "filename must not be empty");
    }

    let fields = GeneratedFileFields {
        filename: args.filename,
        content: args.content,
        mime_type: args.mime_type.unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
    };
    match store.insert_generated_file(fields).await {
        Ok(file) => {
            let message = messages::file_generated(language, &file.filename);
            ToolOutcome {
                success: true,
                message,
                data: serde_json::to_value(file).ok(),
            }
        }
        Err(e) => execution_failed("generate_file", &e.to_string()),
    }
}

fn invalid_arguments(tool: &str, detail: &str) -> ToolOutcome {
    tracing::warn!(tool, detail, "rejected tool call arguments");
    ToolOutcome::failure(format!("Invalid arguments for {}: {}", tool, detail))
}

fn execution_failed(tool: &str, detail: &str) -> ToolOutcome {
    tracing::error!(tool, detail, "tool execution failed");
    ToolOutcome::failure(format!("Error executing {}: {}", tool, detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MockStore, StoreError, Task};
    use serde_json::json;

    fn created_task(fields: &TaskFields) -> Task {
        Task {
            id: Some("t-1".to_string()),
            title: fields.title.clone(),
            client: fields.client.clone(),
            priority: fields.priority,
            completed: fields.completed,
            created_at: Some("2025-01-01T09:00:00Z".to_string()),
        }
    }

    #[tokio::test]
    async fn add_task_persists_and_confirms() {
        let mut store = MockStore::new();
        store
            .expect_insert_task()
            .withf(|fields| {
                fields.title == "Call client" && fields.priority == Priority::High && !fields.completed
            })
            .returning(|fields| Ok(created_task(&fields)))
            .once();

        let args = json!({"title": "Call client", "priority": "high"});
        let outcome = execute_tool(&store, "add_task", args, Language::En).await;

        assert!(outcome.success);
        assert!(outcome.message.contains("Call client"));
        let data = outcome.data.unwrap();
        assert_eq!(data["title"], "Call client");
        assert_eq!(data["completed"], false);
    }

    #[tokio::test]
    async fn add_task_defaults_priority_to_medium() {
        let mut store = MockStore::new();
        store
            .expect_insert_task()
            .withf(|fields| fields.priority == Priority::Medium)
            .returning(|fields| Ok(created_task(&fields)))
            .once();

        let outcome =
            execute_tool(&store, "add_task", json!({"title": "Buy milk"}), Language::En).await;
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn add_task_localizes_confirmation() {
        let mut store = MockStore::new();
        store
            .expect_insert_task()
            .returning(|fields| Ok(created_task(&fields)))
            .once();

        let outcome =
            execute_tool(&store, "add_task", json!({"title": "Chiamare Anna"}), Language::It).await;
        assert!(outcome.message.starts_with("Attività"));
        assert!(outcome.message.contains("Chiamare Anna"));
    }

    #[tokio::test]
    async fn appointment_missing_date_never_reaches_store() {
        let mut store = MockStore::new();
        store.expect_insert_appointment().never();

        let args = json!({"title": "Dentist"});
        let outcome = execute_tool(&store, "add_appointment", args, Language::En).await;

        assert!(!outcome.success);
        assert!(outcome.data.is_none());
    }

    #[tokio::test]
    async fn appointment_defaults_duration_and_color() {
        let mut store = MockStore::new();
        store
            .expect_insert_appointment()
            .withf(|fields| fields.duration == 30 && fields.color == "blue")
            .returning(|fields| {
                Ok(crate::store::Appointment {
                    id: Some("a-1".to_string()),
                    title: fields.title.clone(),
                    client: fields.client.clone(),
                    date: fields.date.clone(),
                    duration: fields.duration,
                    location: fields.location.clone(),
                    color: fields.color.clone(),
                    created_at: None,
                })
            })
            .once();

        let args = json!({"title": "Dentist", "date": "2025-03-01T10:00:00Z"});
        let outcome = execute_tool(&store, "add_appointment", args, Language::En).await;
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn generate_file_defaults_mime_type() {
        let mut store = MockStore::new();
        store
            .expect_insert_generated_file()
            .withf(|fields| fields.mime_type == "text/plain")
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

        let args = json!({"filename": "notes.txt", "content": "hello"});
        let outcome = execute_tool(&store, "generate_file", args, Language::En).await;
        assert!(outcome.success);
        assert_eq!(outcome.data.unwrap()["mime_type"], "text/plain");
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_not_executed() {
        let mut store = MockStore::new();
        store.expect_insert_task().never();
        store.expect_insert_appointment().never();
        store.expect_insert_generated_file().never();

        let outcome = execute_tool(&store, "delete_universe", json!({}), Language::En).await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Unknown tool: delete_universe");
    }

    #[tokio::test]
    async fn store_failure_becomes_failure_outcome() {
        let mut store = MockStore::new();
        store
            .expect_insert_task()
            .returning(|_| {
                Err(StoreError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                })
            })
            .once();

        let outcome =
            execute_tool(&store, "add_task", json!({"title": "Anything"}), Language::En).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("add_task"));
    }

    #[test]
    fn outcome_round_trips_through_json() {
        let outcome = ToolOutcome {
            success: true,
            message: "Task \"Call client\" added to your list.".to_string(),
            data: Some(json!({"id": "t-1", "title": "Call client"})),
        };
        let text = serde_json::to_string(&outcome).unwrap();
        let back: ToolOutcome = serde_json::from_str(&text).unwrap();
        assert_eq!(back, outcome);
    }

    #[test]
    fn tool_kind_strips_verb_prefix() {
        assert_eq!(ToolKind::from_tool_name("add_task"), Some(ToolKind::Task));
        assert_eq!(
            ToolKind::from_tool_name("add_appointment"),
            Some(ToolKind::Appointment)
        );
        assert_eq!(ToolKind::from_tool_name("generate_file"), Some(ToolKind::File));
        assert_eq!(ToolKind::from_tool_name("delete_universe"), None);
    }

    #[test]
    fn schemas_cover_the_three_tools() {
        let names: Vec<String> = schemas()
            .iter()
            .map(|Tool::Function(f)| f.name().to_string())
            .collect();
        assert_eq!(names, ["add_task", "add_appointment", "generate_file"]);
    }
}
