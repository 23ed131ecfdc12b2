use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use recarga_core::config::ChatConfig;

use crate::connection::ConnectionHandle;
use crate::events::{EventDispatcher, InboundMessage, Outbound};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport send failed: {0}")]
    Send(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl From<&ChatConfig> for ReconnectPolicy {
    fn from(config: &ChatConfig) -> Self {
        Self {
            max_retries: config.reconnect_max_retries,
            base_delay_ms: config.reconnect_base_delay_ms,
            max_delay_ms: config.reconnect_max_delay_ms,
        }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// A chat network adapter. `connect` may publish a pairing code on the handle
/// while it waits for the account to be linked.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn connect(&self, connection: &ConnectionHandle) -> Result<(), TransportError>;
    /// `None` means the stream closed cleanly.
    async fn next_message(&self) -> Result<Option<InboundMessage>, TransportError>;
    async fn send_text(&self, identity: &str, text: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopTransport;

#[async_trait]
impl ChatTransport for NoopTransport {
    async fn connect(&self, _connection: &ConnectionHandle) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_message(&self) -> Result<Option<InboundMessage>, TransportError> {
        Ok(None)
    }

    async fn send_text(&self, _identity: &str, _text: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Connect-and-pump loop. Messages are dispatched one at a time in arrival order.
pub struct TransportRunner {
    transport: Arc<dyn ChatTransport>,
    dispatcher: Arc<EventDispatcher>,
    connection: Arc<ConnectionHandle>,
    reconnect_policy: ReconnectPolicy,
}

impl TransportRunner {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        dispatcher: Arc<EventDispatcher>,
        connection: Arc<ConnectionHandle>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, connection, reconnect_policy }
    }

    pub fn connection(&self) -> Arc<ConnectionHandle> {
        self.connection.clone()
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            let outcome = self.connect_and_pump(attempt).await;
            self.connection.mark_disconnected().await;

            match outcome {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        event_name = "transport.connection_failed",
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "chat transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "chat transport retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening chat transport connection");
        self.transport.connect(&self.connection).await?;
        self.connection.mark_connected().await;
        info!(event_name = "transport.connected", attempt, "chat transport connected");

        loop {
            let Some(message) = self.transport.next_message().await? else {
                info!(attempt, "chat transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };

            let replies = self.dispatcher.dispatch(&message).await;
            self.deliver(&message.message_id, replies).await;
        }
    }

    /// A failed send is logged and skipped; the remaining replies still go out.
    async fn deliver(&self, correlation_id: &str, replies: Vec<Outbound>) {
        for reply in replies {
            match self.transport.send_text(&reply.identity, &reply.text).await {
                Ok(()) => debug!(
                    event_name = "egress.chat.message_sent",
                    correlation_id,
                    identity = %reply.identity,
                    "sent chat message"
                ),
                Err(error) => warn!(
                    event_name = "egress.chat.message_sent",
                    correlation_id,
                    identity = %reply.identity,
                    error = %error,
                    "failed to send chat message; continuing"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{ChatTransport, ReconnectPolicy, TransportError, TransportRunner};
    use crate::connection::{ConnectionHandle, ConnectionState};
    use crate::events::{EventContext, EventDispatcher, InboundMessage, MessageHandler, Outbound};

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        messages: VecDeque<Result<Option<InboundMessage>, TransportError>>,
        send_results: VecDeque<Result<(), TransportError>>,
        connect_attempts: usize,
        sent: Vec<(String, String)>,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            messages: Vec<Result<Option<InboundMessage>, TransportError>>,
            send_results: Vec<Result<(), TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    messages: messages.into(),
                    send_results: send_results.into(),
                    connect_attempts: 0,
                    sent: Vec::new(),
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn sent(&self) -> Vec<(String, String)> {
            self.state.lock().await.sent.clone()
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn connect(&self, connection: &ConnectionHandle) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            connection.publish_pairing_code("pairing-code").await;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_message(&self) -> Result<Option<InboundMessage>, TransportError> {
            let mut state = self.state.lock().await;
            state.messages.pop_front().unwrap_or(Ok(None))
        }

        async fn send_text(&self, identity: &str, text: &str) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            let result = state.send_results.pop_front().unwrap_or(Ok(()));
            if result.is_ok() {
                state.sent.push((identity.to_owned(), text.to_owned()));
            }
            result
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    struct EchoHandler;

    #[async_trait]
    impl MessageHandler for EchoHandler {
        async fn handle(&self, message: &InboundMessage, _ctx: &EventContext) -> Vec<Outbound> {
            vec![
                Outbound::new(&message.identity, format!("echo {}", message.text)),
                Outbound::new("operator", format!("saw {}", message.message_id)),
            ]
        }
    }

    fn echo_dispatcher() -> Arc<EventDispatcher> {
        Arc::new(EventDispatcher::new("operator", Arc::new(EchoHandler), Arc::new(EchoHandler)))
    }

    fn immediate(max_retries: u32) -> ReconnectPolicy {
        ReconnectPolicy { max_retries, base_delay_ms: 0, max_delay_ms: 0 }
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![Ok(Some(InboundMessage::text("m-1", "user", "hola"))), Ok(None)],
            vec![],
        ));
        let connection = Arc::new(ConnectionHandle::new());

        let runner = TransportRunner::new(
            transport.clone(),
            echo_dispatcher(),
            connection.clone(),
            immediate(2),
        );
        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(
            transport.sent().await,
            vec![
                ("user".to_owned(), "echo hola".to_owned()),
                ("operator".to_owned(), "saw m-1".to_owned())
            ]
        );
        assert_eq!(connection.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
            vec![],
        ));

        let runner = TransportRunner::new(
            transport.clone(),
            echo_dispatcher(),
            Arc::new(ConnectionHandle::new()),
            immediate(2),
        );

        runner.start().await.expect("runner should degrade gracefully");
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn failed_send_does_not_stop_remaining_replies() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![Ok(Some(InboundMessage::text("m-1", "user", "hola"))), Ok(None)],
            vec![Err(TransportError::Send("rate limited".to_owned()))],
        ));

        let runner = TransportRunner::new(
            transport.clone(),
            echo_dispatcher(),
            Arc::new(ConnectionHandle::new()),
            immediate(0),
        );
        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.sent().await, vec![("operator".to_owned(), "saw m-1".to_owned())]);
    }

    #[test]
    fn backoff_is_capped() {
        let policy = ReconnectPolicy { max_retries: 10, base_delay_ms: 250, max_delay_ms: 5_000 };
        assert_eq!(policy.backoff(0).as_millis(), 250);
        assert_eq!(policy.backoff(2).as_millis(), 1_000);
        assert_eq!(policy.backoff(9).as_millis(), 5_000);
    }
}
