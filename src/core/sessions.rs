//! Registry of live sessions
//!
//! Sessions are independent: each owns its conversation and its own
//! single-flight state. Sessions left idle past their TTL are dropped by a
//! background sweep; nothing outlives the process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::config::SessionSettings;
use crate::providers::CompletionClient;

use super::session::{SessionController, SessionError};

pub struct SessionManager {
    client: Arc<dyn CompletionClient>,
    max_input_tokens: usize,
    sessions: RwLock<HashMap<Uuid, Arc<SessionController>>>,
}

impl SessionManager {
    pub fn new(client: Arc<dyn CompletionClient>, max_input_tokens: usize) -> Self {
        Self {
            client,
            max_input_tokens,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Open a new session, optionally selecting a persona right away
    pub async fn create(
        &self,
        persona: Option<&str>,
    ) -> Result<Arc<SessionController>, SessionError> {
        let session = Arc::new(SessionController::new(
            Uuid::new_v4(),
            Arc::clone(&self.client),
            self.max_input_tokens,
        ));

        if let Some(persona) = persona {
            session.select_persona(persona).await?;
        }

        self.sessions
            .write()
            .await
            .insert(session.id(), Arc::clone(&session));

        tracing::info!("Opened session {}", session.id());
        Ok(session)
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<SessionController>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Drop a session and its conversation. Returns false if it did not exist.
    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            tracing::info!("Closed session {}", id);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop every session idle for at least `ttl`. Sessions waiting for a
    /// reply are kept. Returns how many were dropped.
    pub async fn sweep_expired(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions.write().await;

        let mut expired = Vec::new();
        for (id, session) in sessions.iter() {
            if session.is_expired(ttl).await {
                expired.push(*id);
            }
        }
        for id in &expired {
            sessions.remove(id);
            tracing::info!("Expired idle session {}", id);
        }

        expired.len()
    }

    /// Run [`SessionManager::sweep_expired`] periodically. The task ends once
    /// the manager is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, settings: &SessionSettings) -> JoinHandle<()> {
        let manager = Arc::downgrade(self);
        let ttl = settings.idle_ttl();
        let period = settings.sweep_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let removed = manager.sweep_expired(ttl).await;
                if removed > 0 {
                    tracing::debug!("Session sweep dropped {} idle session(s)", removed);
                }
            }
        })
    }
}
