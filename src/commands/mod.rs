pub mod chat;
pub mod settings;

/// Frontend logging command, writes into the backend's log sink.
#[tauri::command]
pub fn log_debug(level: String, source: String, message: String) {
    crate::logging::log_frontend(&level, &source, &message);
}
