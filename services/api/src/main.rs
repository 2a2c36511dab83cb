mod config;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::post,
};
use secrecy::ExposeSecret;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use friday_core::language::Language;
use friday_core::{prompts, tools};
use friday_realtime_types::SessionCreateRequest;
use friday_realtime_types::session::{InputAudioTranscription, TurnDetection};

const REALTIME_SESSIONS_URL: &str = "https://api.openai.com/v1/realtime/sessions";
const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const REALTIME_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";
const REALTIME_VOICE: &str = "alloy";
const CHAT_MAX_TOKENS: u32 = 500;

#[derive(Clone)]
struct AppState {
    http: reqwest::Client,
    config: Arc<config::Config>,
}

#[derive(serde::Deserialize)]
struct RealtimeSessionRequest {
    #[serde(default)]
    language: Language,
}

#[derive(serde::Deserialize)]
struct ChatRequest {
    messages: Vec<serde_json::Value>,
    #[serde(default)]
    language: Language,
}

#[derive(serde::Serialize)]
struct ChatResponse {
    reply: String,
}

fn session_create_body(language: Language) -> SessionCreateRequest {
    SessionCreateRequest::new(REALTIME_MODEL)
        .with_voice(REALTIME_VOICE)
        .with_instructions(prompts::voice_instructions(language))
        .with_tools(tools::schemas())
        .with_tool_choice_auto()
        .with_input_audio_transcription(InputAudioTranscription::whisper())
        .with_turn_detection(TurnDetection::server_vad())
}

fn error_body(message: &str) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": message }))
}

/// Mints an ephemeral realtime session for one client.
///
/// The long-lived API key stays on this server; the client only ever sees
/// the short-lived `client_secret` in the passthrough response body.
async fn create_realtime_session(
    State(state): State<AppState>,
    Json(request): Json<RealtimeSessionRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    info!(language = request.language.code(), "minting realtime session");

    let response = state
        .http
        .post(REALTIME_SESSIONS_URL)
        .bearer_auth(state.config.openai_api_key.expose_secret())
        .json(&session_create_body(request.language))
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "session create request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body("Failed to create session"))
        })?;

    let status = response.status();
    let payload: serde_json::Value = response.json().await.map_err(|e| {
        tracing::error!(error = %e, "session create response was not JSON");
        (StatusCode::INTERNAL_SERVER_ERROR, error_body("Failed to create session"))
    })?;

    if !status.is_success() {
        tracing::error!(status = %status, body = %payload, "session create rejected");
        let status =
            StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return Err((status, Json(payload)));
    }

    Ok(Json(payload))
}

/// Text chat fallback: one round trip through the chat completions API with
/// the assistant's system prompt prepended.
async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<serde_json::Value>)> {
    let mut messages = vec![serde_json::json!({
        "role": "system",
        "content": prompts::chat_instructions(request.language),
    })];
    messages.extend(request.messages);

    let response = state
        .http
        .post(CHAT_COMPLETIONS_URL)
        .bearer_auth(state.config.openai_api_key.expose_secret())
        .json(&serde_json::json!({
            "model": state.config.chat_model,
            "messages": messages,
            "max_tokens": CHAT_MAX_TOKENS,
        }))
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "chat completion request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body("An unexpected error occurred"))
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %body, "chat completion rejected");
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err((
                StatusCode::TOO_MANY_REQUESTS,
                error_body("Rate limit exceeded. Please try again later."),
            ));
        }
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            error_body(&format!("OpenAI API error: {}", status.as_u16())),
        ));
    }

    let payload: serde_json::Value = response.json().await.map_err(|e| {
        tracing::error!(error = %e, "chat completion response was not JSON");
        (StatusCode::INTERNAL_SERVER_ERROR, error_body("An unexpected error occurred"))
    })?;

    let reply = payload["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or("Sorry, I could not generate a response.")
        .to_string();

    Ok(Json(ChatResponse { reply }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    // Permissive CORS so the browser client can call both endpoints.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let bind_address = config.bind_address;
    let state = AppState {
        http: reqwest::Client::new(),
        config: Arc::new(config),
    };

    let app = Router::new()
        .route("/realtime-session", post(create_realtime_session))
        .route("/chat", post(chat))
        .layer(cors)
        .with_state(state);

    info!("Starting token broker, listening on {}", bind_address);
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_body_carries_tools_and_vad() {
        let body = serde_json::to_value(session_create_body(Language::En)).unwrap();
        assert_eq!(body["model"], REALTIME_MODEL);
        assert_eq!(body["voice"], "alloy");
        assert_eq!(body["tools"].as_array().unwrap().len(), 3);
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["turn_detection"]["type"], "server_vad");
        assert_eq!(body["input_audio_transcription"]["model"], "whisper-1");
    }

    #[test]
    fn session_instructions_follow_language() {
        let en = serde_json::to_value(session_create_body(Language::En)).unwrap();
        let it = serde_json::to_value(session_create_body(Language::It)).unwrap();
        assert_ne!(en["instructions"], it["instructions"]);
    }
}
