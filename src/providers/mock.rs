//! Test doubles for [`CompletionClient`]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::conversation::Message;

use super::{CompletionClient, CompletionError};

#[derive(Default)]
struct Script {
    replies: VecDeque<Result<String, CompletionError>>,
    seen: Vec<Vec<Message>>,
}

/// Answers with pre-recorded results, in order, and records every request
#[derive(Clone, Default)]
pub struct ScriptedClient {
    script: Arc<Mutex<Script>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Result<String, CompletionError>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                replies: replies.into(),
                seen: Vec::new(),
            })),
            gate: None,
        }
    }

    pub fn replying(reply: &str) -> Self {
        Self::new(vec![Ok(reply.to_string())])
    }

    /// Hold every call until [`ScriptedClient::release`] is called
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn calls(&self) -> usize {
        self.script.lock().unwrap().seen.len()
    }

    /// Messages received by the most recent call
    pub fn last_request(&self) -> Option<Vec<Message>> {
        self.script.lock().unwrap().seen.last().cloned()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, CompletionError> {
        self.script.lock().unwrap().seen.push(messages.to_vec());

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .expect("gate closed")
                .forget();
        }

        self.script
            .lock()
            .unwrap()
            .replies
            .pop_front()
            .unwrap_or_else(|| Err(CompletionError::Network("script exhausted".into())))
    }
}

/// Panics inside `complete` once released
#[derive(Clone)]
pub struct PanickingClient {
    gate: Arc<Semaphore>,
    calls: Arc<AtomicUsize>,
}

impl PanickingClient {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for PanickingClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.acquire().await.expect("gate closed").forget();
        panic!("provider exploded");
    }
}
