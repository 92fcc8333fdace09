use crate::conversation::{
    ChatError, Conversation, ConversationEvent, ConversationSnapshot, EventSink,
};
use crate::db::Database;
use crate::doc_processor::ExtractError;
use crate::llm::gemini::{GeminiConfig, GeminiProvider, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::llm::LlmError;
use std::path::Path;
use std::sync::Arc;
use tauri::{AppHandle, Emitter, State};

/// Event channel the webview listens on.
pub const CONVERSATION_EVENT: &str = "conversation-event";

const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Forwards conversation events to every webview.
pub struct WebviewEvents {
    app: AppHandle,
}

impl WebviewEvents {
    pub fn new(app: AppHandle) -> Self {
        WebviewEvents { app }
    }
}

impl EventSink for WebviewEvents {
    fn emit(&self, event: ConversationEvent) {
        if let Err(e) = self.app.emit(CONVERSATION_EVENT, event) {
            tracing::warn!("Failed to emit conversation event: {}", e);
        }
    }
}

fn setting_or(db: &Database, key: &str, default: &str) -> String {
    db.get_setting(key)
        .ok()
        .flatten()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Build the Gemini provider from stored settings, falling back to the
/// `GEMINI_API_KEY` environment variable for the key.
fn resolve_provider(db: &Database) -> Result<GeminiProvider, LlmError> {
    let api_key = db
        .get_setting("gemini_api_key")
        .ok()
        .flatten()
        .filter(|k| !k.trim().is_empty())
        .or_else(|| std::env::var(API_KEY_ENV).ok())
        .ok_or(LlmError::MissingApiKey)?;

    let provider = GeminiProvider::new(GeminiConfig {
        api_key,
        base_url: setting_or(db, "gemini_base_url", DEFAULT_BASE_URL),
        model: setting_or(db, "gemini_model", DEFAULT_MODEL),
    });
    tracing::debug!(model = provider.model(), "Resolved reply provider");
    Ok(provider)
}

#[tauri::command]
pub fn load_conversation(conversation: State<'_, Conversation>) -> ConversationSnapshot {
    conversation.snapshot()
}

#[tauri::command]
pub async fn send_message(
    db: State<'_, Arc<Database>>,
    conversation: State<'_, Conversation>,
    text: String,
) -> Result<Option<i64>, ChatError> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    let provider = resolve_provider(&db)?;
    conversation.submit(&provider, &text).await
}

#[tauri::command]
pub async fn upload_document(
    conversation: State<'_, Conversation>,
    file_path: String,
) -> Result<String, ChatError> {
    let path = Path::new(&file_path);
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    let bytes = tokio::fs::read(path).await.map_err(ExtractError::from)?;
    conversation.ingest(file_name, bytes).await
}

#[tauri::command]
pub fn clear_conversation(conversation: State<'_, Conversation>) {
    conversation.clear();
}
