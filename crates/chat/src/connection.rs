use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    AwaitingPairing,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::AwaitingPairing => "awaiting_pairing",
            Self::Connected => "connected",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub pairing_code: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Shared view of the chat transport's lifecycle. Constructed once at startup and
/// handed to both the transport runner (writer) and the HTTP surface (reader).
#[derive(Debug)]
pub struct ConnectionHandle {
    inner: RwLock<ConnectionSnapshot>,
}

impl Default for ConnectionHandle {
    fn default() -> Self {
        Self {
            inner: RwLock::new(ConnectionSnapshot {
                state: ConnectionState::Disconnected,
                pairing_code: None,
                updated_at: Utc::now(),
            }),
        }
    }
}

impl ConnectionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> ConnectionSnapshot {
        self.inner.read().await.clone()
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.read().await.state
    }

    /// Latest pairing code, present only while the transport waits to be paired.
    pub async fn pairing_code(&self) -> Option<String> {
        self.inner.read().await.pairing_code.clone()
    }

    pub async fn publish_pairing_code(&self, code: impl Into<String>) {
        let mut inner = self.inner.write().await;
        inner.state = ConnectionState::AwaitingPairing;
        inner.pairing_code = Some(code.into());
        inner.updated_at = Utc::now();
    }

    pub async fn mark_connected(&self) {
        self.set(ConnectionState::Connected).await;
    }

    pub async fn mark_disconnected(&self) {
        self.set(ConnectionState::Disconnected).await;
    }

    async fn set(&self, state: ConnectionState) {
        let mut inner = self.inner.write().await;
        inner.state = state;
        inner.pairing_code = None;
        inner.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectionHandle, ConnectionState};

    #[tokio::test]
    async fn pairing_code_is_cleared_once_connected() {
        let handle = ConnectionHandle::new();
        assert_eq!(handle.state().await, ConnectionState::Disconnected);

        handle.publish_pairing_code("2@abc,def").await;
        assert_eq!(handle.state().await, ConnectionState::AwaitingPairing);
        assert_eq!(handle.pairing_code().await.as_deref(), Some("2@abc,def"));

        handle.mark_connected().await;
        let snapshot = handle.snapshot().await;
        assert_eq!(snapshot.state, ConnectionState::Connected);
        assert_eq!(snapshot.pairing_code, None);
    }
}
