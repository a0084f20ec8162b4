//! Session controller
//!
//! Drives one conversation through its states:
//!
//! ```text
//! Idle --select_persona--> Idle           (conversation re-seeded)
//! Idle --submit(text)----> AwaitingReply  (user turn appended)
//! AwaitingReply --reply--> Idle           (assistant turn appended)
//! AwaitingReply --fail---> Error          (user turn kept)
//! Error --acknowledge----> Idle
//! ```
//!
//! `AwaitingReply` doubles as the single-flight lock: while a completion is
//! in flight every mutating call is refused with [`SessionError::Busy`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::Persona;
use crate::conversation::{ConversationState, Role};
use crate::providers::{CompletionClient, CompletionError};

/// Where a session stands in its request/reply cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    AwaitingReply,
    Error { message: String },
}

/// Result of a submission that was not refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input, nothing happened
    Ignored,
    Replied(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("A reply is still being generated")]
    Busy,

    #[error("The last request failed; acknowledge the error first")]
    AwaitingAcknowledgement,

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("Completion task ended unexpectedly: {0}")]
    Interrupted(String),
}

/// One displayable turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedTurn {
    pub role: Role,
    pub text: String,
    /// `right` for the user, `left` for everyone else
    pub align: &'static str,
}

impl RenderedTurn {
    fn new(role: Role, text: &str) -> Self {
        Self {
            role,
            text: text.to_string(),
            align: match role {
                Role::User => "right",
                _ => "left",
            },
        }
    }
}

/// Point-in-time view of a session for the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub persona: Option<Persona>,
    pub state: SessionState,
    pub turns: Vec<RenderedTurn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct SessionInner {
    persona: Option<Persona>,
    state: SessionState,
    conversation: Option<ConversationState>,
    updated_at: DateTime<Utc>,
    last_active: Instant,
}

impl SessionInner {
    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.last_active = Instant::now();
    }
}

pub struct SessionController {
    id: Uuid,
    created_at: DateTime<Utc>,
    client: Arc<dyn CompletionClient>,
    max_input_tokens: usize,
    inner: Arc<Mutex<SessionInner>>,
}

impl SessionController {
    pub fn new(id: Uuid, client: Arc<dyn CompletionClient>, max_input_tokens: usize) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            client,
            max_input_tokens,
            inner: Arc::new(Mutex::new(SessionInner {
                persona: None,
                state: SessionState::Idle,
                conversation: None,
                updated_at: now,
                last_active: Instant::now(),
            })),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Switch persona and start the conversation over with its seed prompt
    pub async fn select_persona(&self, id: &str) -> Result<Persona, SessionError> {
        let mut inner = self.inner.lock().await;
        ensure_idle(&inner.state)?;

        let persona = Persona::lookup(id);
        if persona == Persona::Default {
            tracing::debug!("Unknown persona '{}', using default prompt", id);
        }

        inner
            .conversation
            .get_or_insert_with(|| ConversationState::seeded(persona.seed_prompt()))
            .reset(persona.seed_prompt());
        inner.persona = Some(persona);
        inner.touch();

        tracing::info!("Session {} now talks as {}", self.id, persona.label());
        Ok(persona)
    }

    /// Send the user's text to the model and record the reply.
    ///
    /// Blank text is ignored. On failure the user turn stays in the
    /// conversation and the session moves to the error state.
    pub async fn submit(&self, text: &str) -> Result<SubmitOutcome, SessionError> {
        if text.trim().is_empty() {
            return Ok(SubmitOutcome::Ignored);
        }

        let messages = {
            let mut inner = self.inner.lock().await;
            ensure_idle(&inner.state)?;

            let persona = inner.persona.unwrap_or_default();
            let conversation = inner
                .conversation
                .get_or_insert_with(|| ConversationState::seeded(persona.seed_prompt()));
            conversation.append_user(text);

            let approx = conversation.approx_tokens();
            if approx > self.max_input_tokens {
                tracing::warn!(
                    "Session {} holds ~{} tokens, above the {} token context window",
                    self.id,
                    approx,
                    self.max_input_tokens
                );
            }

            let messages = conversation.memory().to_vec();
            inner.state = SessionState::AwaitingReply;
            inner.touch();
            messages
        };

        // Once issued, a completion runs to the end even if the caller goes away
        let client = Arc::clone(&self.client);
        let inner = Arc::clone(&self.inner);
        let session_id = self.id;
        let task = tokio::spawn(async move {
            let result = match AssertUnwindSafe(client.complete(&messages))
                .catch_unwind()
                .await
            {
                Ok(result) => result.map_err(SessionError::from),
                Err(panic) => Err(SessionError::Interrupted(panic_message(panic.as_ref()))),
            };

            let mut inner = inner.lock().await;
            inner.touch();
            match result {
                Ok(reply) => {
                    if let Some(conversation) = inner.conversation.as_mut() {
                        conversation.append_assistant(&reply);
                    }
                    inner.state = SessionState::Idle;
                    tracing::debug!("Session {} received a reply", session_id);
                    Ok(reply)
                }
                Err(err) => {
                    tracing::warn!("Session {} completion failed: {}", session_id, err);
                    inner.state = SessionState::Error {
                        message: err.to_string(),
                    };
                    Err(err)
                }
            }
        });

        match task.await {
            Ok(result) => result.map(SubmitOutcome::Replied),
            Err(join_err) => {
                let message = join_err.to_string();
                let mut inner = self.inner.lock().await;
                if inner.state == SessionState::AwaitingReply {
                    inner.state = SessionState::Error {
                        message: message.clone(),
                    };
                    inner.touch();
                }
                tracing::error!("Session {} completion task failed: {}", self.id, message);
                Err(SessionError::Interrupted(message))
            }
        }
    }

    /// Leave the error state. The conversation is not touched.
    pub async fn acknowledge(&self) {
        let mut inner = self.inner.lock().await;
        if matches!(inner.state, SessionState::Error { .. }) {
            inner.state = SessionState::Idle;
            inner.touch();
        }
    }

    /// Whether the session has been left alone for at least `ttl`.
    /// A session waiting for a reply never expires.
    pub async fn is_expired(&self, ttl: Duration) -> bool {
        let inner = self.inner.lock().await;
        inner.state != SessionState::AwaitingReply && inner.last_active.elapsed() >= ttl
    }

    #[cfg(test)]
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state.clone()
    }

    /// The seed prompt and every turn since, as sent to the model
    #[cfg(test)]
    pub async fn conversation(&self) -> Option<ConversationState> {
        self.inner.lock().await.conversation.clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        let turns = inner
            .conversation
            .as_ref()
            .map(|c| {
                c.renderable_turns()
                    .map(|(role, text)| RenderedTurn::new(role, text))
                    .collect()
            })
            .unwrap_or_default();

        SessionSnapshot {
            id: self.id,
            persona: inner.persona,
            state: inner.state.clone(),
            turns,
            created_at: self.created_at,
            updated_at: inner.updated_at,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("completion client panicked: {detail}")
}

fn ensure_idle(state: &SessionState) -> Result<(), SessionError> {
    match state {
        SessionState::Idle => Ok(()),
        SessionState::AwaitingReply => Err(SessionError::Busy),
        SessionState::Error { .. } => Err(SessionError::AwaitingAcknowledgement),
    }
}
