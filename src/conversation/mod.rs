//! Conversation types and state management
//!
//! A conversation keeps two views of the same exchange:
//! - the *memory*, role-tagged messages sent to the completion provider
//! - the *display log*, `"Human: ..."` / `"AI: ..."` lines rendered to the user
//!
//! The first entry of both is the persona seed. It is a `system` message in
//! memory and a bare line in the display log, and it is never rendered.

use serde::{Deserialize, Serialize};

const HUMAN_PREFIX: &str = "Human: ";
const AI_PREFIX: &str = "AI: ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Transcript and model memory of a single session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationState {
    memory: Vec<Message>,
    log: Vec<String>,
}

impl ConversationState {
    /// Start a conversation seeded with a persona prompt
    pub fn seeded(seed_prompt: &str) -> Self {
        let mut state = Self {
            memory: Vec::new(),
            log: Vec::new(),
        };
        state.reset(seed_prompt);
        state
    }

    /// Discard every turn and start over from `seed_prompt`
    pub fn reset(&mut self, seed_prompt: &str) {
        self.memory.clear();
        self.log.clear();
        self.memory.push(Message::new(Role::System, seed_prompt));
        self.log.push(seed_prompt.to_string());
    }

    /// Append a user turn. Callers filter out blank input beforehand.
    pub fn append_user(&mut self, text: &str) {
        self.memory.push(Message::new(Role::User, text));
        self.log.push(format!("{HUMAN_PREFIX}{text}"));
    }

    pub fn append_assistant(&mut self, text: &str) {
        self.memory.push(Message::new(Role::Assistant, text));
        self.log.push(format!("{AI_PREFIX}{text}"));
    }

    /// Messages sent to the completion provider, seed first
    pub fn memory(&self) -> &[Message] {
        &self.memory
    }

    #[cfg(test)]
    pub fn display_log(&self) -> &[String] {
        &self.log
    }

    /// The seed prompt this conversation was started with
    #[cfg(test)]
    pub fn seed_prompt(&self) -> &str {
        self.log.first().map(String::as_str).unwrap_or_default()
    }

    /// Every display line after the seed, as `(role, text)` in insertion order.
    ///
    /// Borrowing ties the iterator to the current state; derive a new one
    /// after each append.
    pub fn renderable_turns(&self) -> impl Iterator<Item = (Role, &str)> + '_ {
        self.log.iter().skip(1).filter_map(|line| {
            if let Some(text) = line.strip_prefix(HUMAN_PREFIX) {
                Some((Role::User, text))
            } else {
                line.strip_prefix(AI_PREFIX)
                    .map(|text| (Role::Assistant, text))
            }
        })
    }

    /// Rough token count of the memory (four characters per token)
    pub fn approx_tokens(&self) -> usize {
        let chars: usize = self
            .memory
            .iter()
            .map(|m| m.content.chars().count())
            .sum();
        chars.div_ceil(4)
    }
}
