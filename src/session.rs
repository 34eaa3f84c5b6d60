//! Session manager.
//!
//! One record per logical client connection, keyed by an opaque UUIDv7 id.
//! A session moves `Uninitialized -> Active -> Closed`; a closed session is
//! removed from the table, so it is indistinguishable from an id that never
//! existed. In-flight invocations watch their session and fail with a
//! transport error when it closes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{BankError, Result};

/// The kind of connection a session is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Stdio,
    Http,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => f.write_str("stdio"),
            Self::Http => f.write_str("http"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Active,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The client terminated the session.
    ClientClosed,
    IdleTimeout,
    /// The connection dropped under an invocation.
    TransportError(String),
    Shutdown,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClientClosed => f.write_str("closed by client"),
            Self::IdleTimeout => f.write_str("idle timeout"),
            Self::TransportError(msg) => write!(f, "transport error: {msg}"),
            Self::Shutdown => f.write_str("server shutdown"),
        }
    }
}

/// Resolves once the session closes.
pub type CloseSignal = watch::Receiver<Option<CloseReason>>;

struct SessionRecord {
    transport: Transport,
    state: SessionState,
    created_at: DateTime<Utc>,
    last_activity: Instant,
    closed: watch::Sender<Option<CloseReason>>,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub transport: Transport,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub idle_secs: u64,
}

pub struct SessionManager {
    sessions: Mutex<HashMap<String, SessionRecord>>,
    idle_timeout: Duration,
}

impl SessionManager {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Mint a session for a handshake on `transport`.
    pub async fn create(&self, transport: Transport) -> String {
        let id = uuid::Uuid::now_v7().to_string();
        let (closed, _) = watch::channel(None);
        let record = SessionRecord {
            transport,
            state: SessionState::Uninitialized,
            created_at: Utc::now(),
            last_activity: Instant::now(),
            closed,
        };
        self.sessions.lock().await.insert(id.clone(), record);
        tracing::info!(session = %id, transport = %transport, "session created");
        id
    }

    /// Record activity on `id`, promoting it to `Active`. Unknown, closed, and
    /// expired sessions are rejected.
    pub async fn touch(&self, id: &str) -> Result<SessionState> {
        let mut sessions = self.sessions.lock().await;
        let expired = match sessions.get(id) {
            None => return Err(BankError::NoValidSession),
            Some(record) => record.last_activity.elapsed() > self.idle_timeout,
        };
        if expired {
            if let Some(record) = sessions.remove(id) {
                record.closed.send_replace(Some(CloseReason::IdleTimeout));
            }
            tracing::info!(session = %id, "session expired on access");
            return Err(BankError::NoValidSession);
        }
        let Some(record) = sessions.get_mut(id) else {
            return Err(BankError::NoValidSession);
        };
        record.last_activity = Instant::now();
        record.state = SessionState::Active;
        Ok(record.state)
    }

    /// Watch for the session closing. Fails if the session is not live.
    pub async fn subscribe_close(&self, id: &str) -> Result<CloseSignal> {
        self.sessions
            .lock()
            .await
            .get(id)
            .map(|r| r.closed.subscribe())
            .ok_or(BankError::NoValidSession)
    }

    /// Close and remove the session. Returns `false` if it was not live.
    pub async fn close(&self, id: &str, reason: CloseReason) -> bool {
        let removed = self.sessions.lock().await.remove(id);
        match removed {
            Some(record) => {
                tracing::info!(session = %id, transport = %record.transport, reason = %reason, "session closed");
                record.closed.send_replace(Some(reason));
                true
            }
            None => false,
        }
    }

    pub async fn state(&self, id: &str) -> SessionState {
        self.sessions
            .lock()
            .await
            .get(id)
            .map_or(SessionState::Closed, |r| r.state)
    }

    pub async fn info(&self, id: &str) -> Option<SessionInfo> {
        self.sessions.lock().await.get(id).map(|r| SessionInfo {
            id: id.to_string(),
            transport: r.transport,
            state: r.state,
            created_at: r.created_at,
            idle_secs: r.last_activity.elapsed().as_secs(),
        })
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Close every session idle beyond the timeout. Returns the closed ids.
    pub async fn reap_idle(&self) -> Vec<String> {
        let mut sessions = self.sessions.lock().await;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, r)| r.last_activity.elapsed() > self.idle_timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            if let Some(record) = sessions.remove(id) {
                record.closed.send_replace(Some(CloseReason::IdleTimeout));
            }
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "reaped idle sessions");
        }
        expired
    }

    /// Close every live session.
    pub async fn close_all(&self, reason: CloseReason) {
        let drained: Vec<(String, SessionRecord)> = self.sessions.lock().await.drain().collect();
        for (id, record) in drained {
            tracing::debug!(session = %id, "closing session");
            record.closed.send_replace(Some(reason.clone()));
        }
    }

    /// Run [`Self::reap_idle`] every `interval` until the manager is dropped.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = weak.upgrade() else { break };
                manager.reap_idle().await;
            }
        })
    }
}

/// Wait until `signal` reports a close.
pub async fn closed(signal: &mut CloseSignal) -> CloseReason {
    loop {
        if let Some(reason) = signal.borrow_and_update().clone() {
            return reason;
        }
        if signal.changed().await.is_err() {
            return CloseReason::Shutdown;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handshake_then_touch_activates() {
        let manager = SessionManager::new(Duration::from_secs(60));
        let id = manager.create(Transport::Stdio).await;
        assert_eq!(manager.state(&id).await, SessionState::Uninitialized);
        assert_eq!(manager.touch(&id).await.unwrap(), SessionState::Active);
    }

    #[tokio::test]
    async fn closed_session_is_unknown() {
        let manager = SessionManager::new(Duration::from_secs(60));
        let id = manager.create(Transport::Http).await;
        assert!(manager.close(&id, CloseReason::ClientClosed).await);
        assert!(matches!(manager.touch(&id).await, Err(BankError::NoValidSession)));
        assert!(matches!(manager.touch("nope").await, Err(BankError::NoValidSession)));
        assert_eq!(manager.state(&id).await, SessionState::Closed);
        assert!(!manager.close(&id, CloseReason::ClientClosed).await);
    }

    #[tokio::test]
    async fn close_signals_watchers() {
        let manager = SessionManager::new(Duration::from_secs(60));
        let id = manager.create(Transport::Stdio).await;
        let mut signal = manager.subscribe_close(&id).await.unwrap();
        manager.close(&id, CloseReason::ClientClosed).await;
        assert_eq!(closed(&mut signal).await, CloseReason::ClientClosed);
    }

    #[tokio::test]
    async fn idle_sessions_are_reaped() {
        let manager = SessionManager::new(Duration::from_millis(30));
        let id = manager.create(Transport::Http).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(manager.reap_idle().await, vec![id.clone()]);
        assert!(manager.touch(&id).await.is_err());
    }

    #[tokio::test]
    async fn expired_session_rejected_before_reaper_runs() {
        let manager = SessionManager::new(Duration::from_millis(30));
        let id = manager.create(Transport::Http).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(matches!(manager.touch(&id).await, Err(BankError::NoValidSession)));
        assert_eq!(manager.active_count().await, 0);
    }
}
