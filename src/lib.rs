pub mod conversation;
pub mod db;
pub mod doc_processor;
pub mod llm;
pub mod logging;

#[cfg(feature = "desktop")]
mod commands;

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use conversation::reveal::RevealAnimator;
    use conversation::Conversation;
    use db::Database;
    use doc_processor::{ExtractorSlot, PdfTextExtractor};
    use std::sync::Arc;
    use tauri::Manager;

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_dialog::init())
        .setup(|app| {
            let app_dir = app.path().app_data_dir()?;
            logging::init_logging(Some(&app_dir.join("logs")));

            let database = Arc::new(Database::new(&app_dir)?);

            let extractors = Arc::new(ExtractorSlot::new());
            extractors.init(Arc::new(PdfTextExtractor));
            tracing::info!(available = extractors.is_available(), "PDF extractor initialised");

            let events = Arc::new(commands::chat::WebviewEvents::new(app.handle().clone()));
            let conversation = Conversation::restore(
                database.clone(),
                extractors,
                events,
                RevealAnimator::default(),
            );

            app.manage(database);
            app.manage(conversation);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::chat::load_conversation,
            commands::chat::send_message,
            commands::chat::upload_document,
            commands::chat::clear_conversation,
            commands::settings::get_settings,
            commands::settings::set_setting,
            commands::settings::delete_setting,
            commands::log_debug,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
