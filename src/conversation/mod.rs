//! Conversation state: the message list, the attached document context, and
//! the submit/reveal flow that drives them.
//!
//! Every mutation is written through to the `chat_messages` slot of the
//! database and announced on the [`EventSink`]. At most one submission is in
//! flight at a time: `submit` is rejected with [`ChatError::Busy`] until the
//! previous reply has finished revealing or failed.

pub mod reveal;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{Local, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::db::models::{Message, Sender};
use crate::db::{Database, HISTORY_SLOT};
use crate::doc_processor::{self, ExtractError, ExtractorSlot, ParsedDocument};
use crate::llm::{LlmError, ReplyService, Role, Turn};
use reveal::{RevealAnimator, RevealHandle};

pub const FALLBACK_REPLY: &str = "AI response not available.";
pub const ERROR_REPLY: &str = "Error fetching response.";
pub const DOCUMENT_CONTEXT_HEADER: &str = "[Uploaded PDF Content]";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    MessageAppended { message: Message },
    MessageUpdated { id: i64, text: String, done: bool },
    LoadingChanged { loading: bool },
    DocumentAttached { file_name: String },
    Cleared,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: ConversationEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationSnapshot {
    pub messages: Vec<Message>,
    pub loading: bool,
    pub file_name: Option<String>,
    pub has_document: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("A reply is still in progress")]
    Busy,
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl Serialize for ChatError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Request turns for a submission: the prior transcript, then `text` with the
/// document context appended when there is one.
pub fn build_turns(history: &[Message], text: &str, document: Option<&str>) -> Vec<Turn> {
    let mut turns: Vec<Turn> = history.iter().map(Turn::from).collect();
    let content = match document {
        Some(doc) => format!("{text}\n\n{DOCUMENT_CONTEXT_HEADER}\n{doc}"),
        None => text.to_string(),
    };
    turns.push(Turn::text(Role::User, content));
    turns
}

fn display_time() -> String {
    Local::now().format("%H:%M").to_string()
}

struct State {
    messages: Vec<Message>,
    document_text: Option<String>,
    file_name: Option<String>,
    reveal: Option<RevealHandle>,
    // Bumped on clear so replies to a wiped conversation are dropped.
    generation: u64,
    last_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        let id = Utc::now().timestamp_millis().max(self.last_id + 1);
        self.last_id = id;
        id
    }

    fn new_message(&mut self, sender: Sender, text: String) -> Message {
        Message {
            id: self.next_id(),
            text,
            sender,
            timestamp: display_time(),
        }
    }
}

struct Shared {
    state: Mutex<State>,
    loading: watch::Sender<bool>,
    db: Arc<Database>,
    extractors: Arc<ExtractorSlot>,
    events: Arc<dyn EventSink>,
    animator: RevealAnimator,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &State) {
        let result = serde_json::to_string(&state.messages)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                self.db
                    .save_slot(HISTORY_SLOT, &json)
                    .map_err(|e| e.to_string())
            });
        if let Err(e) = result {
            tracing::warn!("Failed to persist conversation: {}", e);
        }
    }

    fn set_loading(&self, loading: bool) {
        if self.loading.send_replace(loading) != loading {
            self.events.emit(ConversationEvent::LoadingChanged { loading });
        }
    }

    fn append(&self, state: &mut State, message: Message) {
        state.messages.push(message.clone());
        self.persist(state);
        self.events
            .emit(ConversationEvent::MessageAppended { message });
    }

    fn reveal_frame(&self, id: i64, frame: &str, done: bool) {
        let mut state = self.lock();
        match state.messages.last_mut() {
            Some(last) if last.id == id => last.text = frame.to_string(),
            _ => return,
        }
        self.persist(&state);
        self.events.emit(ConversationEvent::MessageUpdated {
            id,
            text: frame.to_string(),
            done,
        });

        if done {
            state.reveal = None;
            self.set_loading(false);
            tracing::debug!(id, "Reveal finished");
        }
    }
}

fn restore_messages(db: &Database) -> Vec<Message> {
    match db.load_slot(HISTORY_SLOT) {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!("Ignoring malformed saved conversation: {}", e);
            Vec::new()
        }),
        Ok(None) => Vec::new(),
        Err(e) => {
            tracing::warn!("Failed to read saved conversation: {}", e);
            Vec::new()
        }
    }
}

#[derive(Clone)]
pub struct Conversation {
    shared: Arc<Shared>,
}

impl Conversation {
    /// Build the conversation from whatever was persisted. Missing or
    /// malformed history starts an empty conversation.
    pub fn restore(
        db: Arc<Database>,
        extractors: Arc<ExtractorSlot>,
        events: Arc<dyn EventSink>,
        animator: RevealAnimator,
    ) -> Self {
        let messages = restore_messages(&db);
        let last_id = messages.iter().map(|m| m.id).max().unwrap_or(0);
        tracing::info!(count = messages.len(), "Restored conversation");

        let (loading, _) = watch::channel(false);
        Conversation {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    messages,
                    document_text: None,
                    file_name: None,
                    reveal: None,
                    generation: 0,
                    last_id,
                }),
                loading,
                db,
                extractors,
                events,
                animator,
            }),
        }
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        let state = self.shared.lock();
        ConversationSnapshot {
            messages: state.messages.clone(),
            loading: self.is_loading(),
            file_name: state.file_name.clone(),
            has_document: state.document_text.is_some(),
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        self.shared.lock().messages.clone()
    }

    pub fn is_loading(&self) -> bool {
        *self.shared.loading.borrow()
    }

    /// Resolves once no submission is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.shared.loading.subscribe();
        let _ = rx.wait_for(|loading| !*loading).await;
    }

    /// Send `text` to the reply service and start revealing the answer.
    ///
    /// Blank input is ignored and returns `Ok(None)`. Otherwise the user
    /// message is appended before the request goes out, and the id of the bot
    /// message that follows it is returned. Service failures do not surface as
    /// errors: they become a fixed error message in the transcript.
    pub async fn submit(
        &self,
        replies: &dyn ReplyService,
        text: &str,
    ) -> Result<Option<i64>, ChatError> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let (turns, generation) = {
            let mut state = self.shared.lock();
            if self.is_loading() {
                return Err(ChatError::Busy);
            }

            let turns = build_turns(&state.messages, text, state.document_text.as_deref());
            let message = state.new_message(Sender::User, text.to_string());
            self.shared.append(&mut state, message);
            self.shared.set_loading(true);
            (turns, state.generation)
        };

        let result = replies.reply(&turns).await;

        let mut state = self.shared.lock();
        if state.generation != generation {
            tracing::debug!("Conversation cleared while waiting, dropping reply");
            return Ok(None);
        }

        match result {
            Ok(reply) => {
                let full_text = if reply.is_empty() {
                    tracing::warn!("Reply service returned no text");
                    FALLBACK_REPLY.to_string()
                } else {
                    reply
                };
                Ok(Some(self.start_reveal(&mut state, full_text)))
            }
            Err(e) => {
                tracing::error!("Reply service failed: {}", e);
                let message = state.new_message(Sender::Bot, ERROR_REPLY.to_string());
                let id = message.id;
                self.shared.append(&mut state, message);
                self.shared.set_loading(false);
                Ok(Some(id))
            }
        }
    }

    fn start_reveal(&self, state: &mut State, full_text: String) -> i64 {
        let message = state.new_message(Sender::Bot, String::new());
        let id = message.id;
        self.shared.append(state, message);

        tracing::debug!(id, chars = full_text.chars().count(), "Starting reveal");
        let shared = Arc::clone(&self.shared);
        let handle = self
            .shared
            .animator
            .start(full_text, move |frame, done| shared.reveal_frame(id, frame, done));
        state.reveal = Some(handle);
        id
    }

    /// Extract text from an uploaded file and keep it as context for the
    /// following submissions. Nothing is added to the transcript.
    ///
    /// On failure the previous document context is left as it was and the
    /// error is returned to the caller.
    pub async fn ingest(&self, file_name: String, bytes: Vec<u8>) -> Result<String, ChatError> {
        let extractors = Arc::clone(&self.shared.extractors);
        let name = file_name.clone();
        let parsed = tokio::task::spawn_blocking(move || {
            doc_processor::parse_bytes(&name, &bytes, &extractors)
        })
        .await
        .map_err(|e| ExtractError::Pdf(format!("extraction task failed: {}", e)))?
        .inspect_err(|e| tracing::warn!(file = %file_name, "Document extraction failed: {}", e))?;

        self.attach_document(parsed);
        Ok(file_name)
    }

    pub fn attach_document(&self, document: ParsedDocument) {
        let mut state = self.shared.lock();
        let ParsedDocument { file_name, content } = document;
        tracing::info!(file = %file_name, chars = content.len(), "Attached document");

        state.document_text = if content.trim().is_empty() {
            None
        } else {
            Some(content)
        };
        state.file_name = Some(file_name.clone());
        self.shared
            .events
            .emit(ConversationEvent::DocumentAttached { file_name });
    }

    /// Empty the transcript and drop the document context. Any running reveal
    /// is aborted and a reply still in flight will be discarded.
    pub fn clear(&self) {
        let mut state = self.shared.lock();
        if let Some(reveal) = state.reveal.take() {
            if !reveal.is_finished() {
                reveal.abort();
                tracing::debug!("Aborted running reveal");
            }
        }
        state.messages.clear();
        state.document_text = None;
        state.file_name = None;
        state.generation += 1;

        if let Err(e) = self.shared.db.remove_slot(HISTORY_SLOT) {
            tracing::warn!("Failed to remove saved conversation: {}", e);
        }
        self.shared.set_loading(false);
        self.shared.events.emit(ConversationEvent::Cleared);
        tracing::info!("Conversation cleared");
    }
}
