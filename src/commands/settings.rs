use crate::db::Database;
use std::collections::HashMap;
use std::sync::Arc;
use tauri::State;

const SETTING_KEYS: &[&str] = &["gemini_api_key", "gemini_base_url", "gemini_model"];

/// Keep the first and last four characters of long secrets.
fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return value.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

#[tauri::command]
pub fn get_settings(db: State<'_, Arc<Database>>) -> Result<HashMap<String, String>, String> {
    let mut map = HashMap::new();
    for key in SETTING_KEYS {
        if let Some(value) = db.get_setting(key).map_err(|e| e.to_string())? {
            // Mask API keys for display
            if key.ends_with("_api_key") {
                map.insert(key.to_string(), mask_secret(&value));
            } else {
                map.insert(key.to_string(), value);
            }
        }
    }
    Ok(map)
}

#[tauri::command]
pub fn set_setting(db: State<'_, Arc<Database>>, key: String, value: String) -> Result<(), String> {
    if !SETTING_KEYS.contains(&key.as_str()) {
        return Err(format!("Unknown setting key: {}", key));
    }
    tracing::info!(key = %key, "Updating setting");
    db.set_setting(&key, &value).map_err(|e| e.to_string())
}

#[tauri::command]
pub fn delete_setting(db: State<'_, Arc<Database>>, key: String) -> Result<(), String> {
    db.delete_setting(&key).map_err(|e| e.to_string())
}
