//! Chat controller: session lifecycle and the streaming turn cycle
//!
//! The controller exclusively owns the session collection. Every mutation
//! is written back through the [`SessionStore`]. At most one turn streams
//! at a time; its events are addressed to the session that was active when
//! the turn was submitted, so switching or deleting sessions mid-stream
//! never misroutes text.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::ai::{ChatBackend, StreamEvent, StreamFailure};
use crate::state::{session_title, ChatSession, Message, DEFAULT_SESSION_TITLE};
use crate::store::SessionStore;

/// Canned prompts offered while the transcript is empty
pub const SUGGESTIONS: [&str; 4] = [
    "Explain quantum physics",
    "Draft an email",
    "Analyze some code",
    "Write a poem",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    Streaming,
}

struct InFlightTurn {
    session_id: String,
    events: mpsc::Receiver<StreamEvent>,
}

pub struct ChatController {
    store: SessionStore,
    backend: Arc<dyn ChatBackend>,
    sessions: Vec<ChatSession>,
    active_id: Option<String>,
    input: String,
    turn: Option<InFlightTurn>,
}

impl ChatController {
    /// Load the persisted sessions; nothing is active until the user picks one
    pub fn new(store: SessionStore, backend: Arc<dyn ChatBackend>) -> Self {
        let sessions = store.load();
        tracing::info!("Chat controller started with {} sessions", sessions.len());
        Self {
            store,
            backend,
            sessions,
            active_id: None,
            input: String::new(),
            turn: None,
        }
    }

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn active_session(&self) -> Option<&ChatSession> {
        let id = self.active_id.as_deref()?;
        self.sessions.iter().find(|s| s.id == id)
    }

    /// Messages of the active session, empty when none is active
    pub fn messages(&self) -> &[Message] {
        self.active_session()
            .map(|s| s.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn state(&self) -> ChatState {
        if self.turn.is_some() {
            ChatState::Streaming
        } else {
            ChatState::Idle
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.turn.is_some()
    }

    /// Id of the session the in-flight turn writes into
    pub fn streaming_session_id(&self) -> Option<&str> {
        self.turn.as_ref().map(|t| t.session_id.as_str())
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut String {
        &mut self.input
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    /// Whether submit would currently be accepted
    pub fn can_submit(&self) -> bool {
        !self.is_streaming() && !self.input.trim().is_empty()
    }

    pub fn suggestions(&self) -> &'static [&'static str] {
        &SUGGESTIONS
    }

    /// Copy suggestion `index` into the input
    pub fn use_suggestion(&mut self, index: usize) -> bool {
        match SUGGESTIONS.get(index) {
            Some(suggestion) => {
                self.input = suggestion.to_string();
                true
            }
            None => false,
        }
    }

    /// Start an empty session at the top of the list and make it active
    pub fn create_session(&mut self) -> &ChatSession {
        let session = ChatSession::new(DEFAULT_SESSION_TITLE);
        tracing::debug!("Created session {}", session.id);
        self.active_id = Some(session.id.clone());
        self.sessions.insert(0, session);
        self.persist();
        &self.sessions[0]
    }

    pub fn select_session(&mut self, id: &str) -> bool {
        if self.sessions.iter().any(|s| s.id == id) {
            self.active_id = Some(id.to_string());
            true
        } else {
            false
        }
    }

    /// Remove a session; clears the active pointer if it pointed at it
    pub fn delete_session(&mut self, id: &str) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        if self.sessions.len() == before {
            return false;
        }

        if self.active_id.as_deref() == Some(id) {
            self.active_id = None;
        }
        tracing::debug!("Deleted session {}", id);
        self.persist();
        true
    }

    /// Submit the current input as a new turn.
    ///
    /// Rejected while a turn is streaming or when the input is blank. On
    /// acceptance the user message and an empty model placeholder are
    /// appended to the active session (created if absent), the input is
    /// cleared and the stream is opened.
    pub fn submit(&mut self) -> bool {
        if !self.can_submit() {
            return false;
        }

        let text = std::mem::take(&mut self.input);
        let session_id = self.ensure_active_session(&text);

        let Some(session) = self.sessions.iter_mut().find(|s| s.id == session_id) else {
            return false;
        };
        if session.is_untitled() {
            session.title = session_title(&text);
        }
        session.messages.push(Message::user(text.clone()));
        session.messages.push(Message::placeholder());
        session.touch();
        self.persist();

        // Each turn is stateless from the service's point of view
        let events = self.backend.stream_turn(&text, &[]);
        self.turn = Some(InFlightTurn { session_id, events });
        true
    }

    fn ensure_active_session(&mut self, first_input: &str) -> String {
        if let Some(id) = self.active_session().map(|s| s.id.clone()) {
            return id;
        }

        let session = ChatSession::new(session_title(first_input));
        let id = session.id.clone();
        self.sessions.insert(0, session);
        self.active_id = Some(id.clone());
        id
    }

    /// Wait for the next event of the in-flight turn.
    ///
    /// Pends forever while idle, so it can sit in a `select!` next to input
    /// events. A stream that closes without a terminal event reads as
    /// `Finished`.
    pub async fn next_stream_event(&mut self) -> StreamEvent {
        match self.turn.as_mut() {
            Some(turn) => turn.events.recv().await.unwrap_or(StreamEvent::Finished),
            None => std::future::pending().await,
        }
    }

    /// Apply one stream event to the originating session
    pub fn apply_stream_event(&mut self, event: StreamEvent) {
        let Some(session_id) = self.turn.as_ref().map(|t| t.session_id.clone()) else {
            return;
        };

        let terminal = event.is_terminal();
        match event {
            StreamEvent::Snapshot(text) => {
                self.update_placeholder(&session_id, |content| *content = text);
            }
            StreamEvent::Failed(failure) => {
                tracing::error!("Chat turn in session {} failed: {:?}", session_id, failure);
                self.update_placeholder(&session_id, |content| render_failure(content, &failure));
            }
            StreamEvent::Finished => {
                tracing::debug!("Chat turn in session {} finished", session_id);
            }
        }

        if terminal {
            self.turn = None;
        }
    }

    /// Drain the in-flight turn to completion
    pub async fn finish_turn(&mut self) {
        while self.is_streaming() {
            let event = self.next_stream_event().await;
            self.apply_stream_event(event);
        }
    }

    fn update_placeholder(&mut self, session_id: &str, update: impl FnOnce(&mut String)) {
        // The session may have been deleted mid-stream; its text is dropped
        let Some(session) = self.sessions.iter_mut().find(|s| s.id == session_id) else {
            return;
        };
        let Some(last) = session.messages.last_mut() else {
            return;
        };
        update(&mut last.content);
        session.touch();
        self.persist();
    }

    fn persist(&self) {
        self.store.persist(&self.sessions);
    }
}

fn render_failure(content: &mut String, failure: &StreamFailure) {
    if content.is_empty() {
        *content = failure.to_string();
    } else {
        content.push_str("\n\n");
        content.push_str(&failure.to_string());
    }
}
