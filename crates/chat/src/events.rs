use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;
use tracing::info;

use recarga_core::config::OperatorConfig;

use crate::dialogs::OperatorService;
use crate::funnel::FunnelService;
use crate::stores::Stores;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

/// One message as delivered by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub message_id: String,
    pub identity: String,
    pub text: String,
    pub attachment: Option<Attachment>,
}

impl InboundMessage {
    pub fn text(
        message_id: impl Into<String>,
        identity: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            identity: identity.into(),
            text: text.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outbound {
    pub identity: String,
    pub text: String,
}

impl Outbound {
    pub fn new(identity: impl Into<String>, text: impl Into<String>) -> Self {
        Self { identity: identity.into(), text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl EventContext {
    pub fn for_message(message: &InboundMessage) -> Self {
        Self { correlation_id: message.message_id.clone() }
    }
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParticipantRole {
    Operator,
    Client,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operator => "operator",
            Self::Client => "client",
        }
    }
}

/// Turns one inbound message into the texts to send back. Handlers never fail;
/// problems are answered in-conversation.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &InboundMessage, ctx: &EventContext) -> Vec<Outbound>;
}

#[async_trait]
impl MessageHandler for FunnelService {
    async fn handle(&self, message: &InboundMessage, ctx: &EventContext) -> Vec<Outbound> {
        FunnelService::handle(self, message, ctx).await
    }
}

#[async_trait]
impl MessageHandler for OperatorService {
    async fn handle(&self, message: &InboundMessage, ctx: &EventContext) -> Vec<Outbound> {
        OperatorService::handle(self, message, ctx).await
    }
}

/// One async mutex per identity so messages from the same participant are
/// handled strictly one after another, while different participants proceed
/// concurrently.
#[derive(Default)]
pub struct IdentityLocks {
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IdentityLocks {
    pub async fn acquire(&self, identity: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop slots nobody holds or waits on.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(identity.to_owned()).or_default().clone()
        };
        slot.lock_owned().await
    }

    pub fn tracked(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Classifies the sender and hands the message to the operator or client side.
pub struct EventDispatcher {
    operator_identity: String,
    operator: Arc<dyn MessageHandler>,
    client: Arc<dyn MessageHandler>,
    locks: IdentityLocks,
}

impl EventDispatcher {
    pub fn new(
        operator_identity: impl Into<String>,
        operator: Arc<dyn MessageHandler>,
        client: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            operator_identity: operator_identity.into(),
            operator,
            client,
            locks: IdentityLocks::default(),
        }
    }

    pub fn from_stores(stores: &Stores, config: &OperatorConfig) -> Self {
        Self::new(
            config.identity.clone(),
            Arc::new(OperatorService::new(stores, config.dialog_replacement)),
            Arc::new(FunnelService::new(stores, config.identity.clone())),
        )
    }

    pub fn role_of(&self, identity: &str) -> ParticipantRole {
        if identity == self.operator_identity {
            ParticipantRole::Operator
        } else {
            ParticipantRole::Client
        }
    }

    pub async fn dispatch(&self, message: &InboundMessage) -> Vec<Outbound> {
        let ctx = EventContext::for_message(message);
        let role = self.role_of(&message.identity);
        let _turn = self.locks.acquire(&message.identity).await;

        info!(
            event_name = "ingress.chat.message_received",
            correlation_id = %ctx.correlation_id,
            identity = %message.identity,
            role = role.as_str(),
            has_attachment = message.attachment.is_some(),
            "received chat message"
        );

        match role {
            ParticipantRole::Operator => self.operator.handle(message, &ctx).await,
            ParticipantRole::Client => self.client.handle(message, &ctx).await,
        }
    }
}
