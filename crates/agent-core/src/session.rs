//! Session Management
//!
//! Manages chat sessions with conversation history. Each session sits
//! behind its own async mutex so that one question at a time runs against
//! it; different sessions never share mutable state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::message::{Conversation, Role};

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chat session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    pub id: SessionId,

    /// Conversation history
    pub conversation: Conversation,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last activity timestamp
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session, starting with the greeting turn
    pub fn new() -> Self {
        Self::with_id(SessionId::new())
    }

    /// Create with specific ID
    pub fn with_id(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            conversation: Conversation::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the activity timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Preview of the first user question
    pub fn title(&self) -> String {
        self.conversation
            .messages()
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| {
                let preview: String = m.content.chars().take(50).collect();
                if m.content.chars().count() > 50 {
                    format!("{preview}...")
                } else {
                    preview
                }
            })
            .unwrap_or_else(|| format!("Session {}", self.id.0.chars().take(8).collect::<String>()))
    }

    /// Message count
    pub fn message_count(&self) -> usize {
        self.conversation.len()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to one session
pub type SessionHandle = Arc<Mutex<Session>>;

/// In-memory session registry
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a fresh session
    pub async fn create(&self) -> SessionHandle {
        let session = Session::new();
        let id = session.id.clone();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id.clone(), handle.clone());
        tracing::info!(session = %id, "Session created");
        handle
    }

    /// Look up a session
    pub async fn get(&self, id: &SessionId) -> Result<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AgentError::Session(format!("Unknown session: {id}")))
    }

    /// End a session, dropping its conversation
    pub async fn remove(&self, id: &SessionId) -> Result<()> {
        self.sessions
            .write()
            .await
            .remove(id)
            .map(|_| tracing::info!(session = %id, "Session ended"))
            .ok_or_else(|| AgentError::Session(format!("Unknown session: {id}")))
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
