#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use recarga_chat::events::{Attachment, EventDispatcher, InboundMessage, Outbound};
use recarga_chat::Stores;
use recarga_core::config::{DialogReplacementPolicy, OperatorConfig};
use recarga_core::domain::catalog::{OfferDraft, PaymentMethodDraft, Product, ProductDraft};
use recarga_core::domain::dialog::OperatorDialog;
use recarga_core::domain::session::Session;
use recarga_db::repositories::{
    InMemoryCatalogRepository, InMemoryDialogRepository, InMemoryOrderRepository,
    InMemorySessionRepository,
};
use recarga_db::{
    CatalogRepository, DialogRepository, InMemoryBlobStore, RepositoryError, SessionRepository,
};

pub const OPERATOR: &str = "operator@chat";
pub const USER: &str = "user@chat";

/// Session store whose writes can be switched to fail.
#[derive(Default)]
pub struct FlakySessions {
    inner: InMemorySessionRepository,
    fail_writes: AtomicBool,
}

impl FlakySessions {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionRepository for FlakySessions {
    async fn get_or_create(&self, identity: &str) -> Result<Session, RepositoryError> {
        self.inner.get_or_create(identity).await
    }

    async fn save(&self, session: &Session) -> Result<(), RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Decode("injected write failure".to_owned()));
        }
        self.inner.save(session).await
    }
}

/// Dialog store whose `clear` can be switched to fail.
#[derive(Default)]
pub struct FlakyDialogs {
    inner: InMemoryDialogRepository,
    fail_clears: AtomicBool,
}

impl FlakyDialogs {
    pub fn fail_clears(&self, fail: bool) {
        self.fail_clears.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DialogRepository for FlakyDialogs {
    async fn find(&self, operator_identity: &str)
        -> Result<Option<OperatorDialog>, RepositoryError> {
        self.inner.find(operator_identity).await
    }

    async fn save(&self, dialog: &OperatorDialog) -> Result<(), RepositoryError> {
        self.inner.save(dialog).await
    }

    async fn clear(&self, operator_identity: &str) -> Result<bool, RepositoryError> {
        if self.fail_clears.load(Ordering::SeqCst) {
            return Err(RepositoryError::Decode("injected clear failure".to_owned()));
        }
        self.inner.clear(operator_identity).await
    }
}

pub struct Harness {
    pub catalog: Arc<InMemoryCatalogRepository>,
    pub sessions: Arc<FlakySessions>,
    pub dialogs: Arc<FlakyDialogs>,
    pub orders: Arc<InMemoryOrderRepository>,
    pub blobs: Arc<InMemoryBlobStore>,
    pub dispatcher: EventDispatcher,
    sequence: std::sync::atomic::AtomicU64,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(DialogReplacementPolicy::Replace)
    }

    pub fn with_policy(policy: DialogReplacementPolicy) -> Self {
        let catalog = Arc::new(InMemoryCatalogRepository::default());
        let sessions = Arc::new(FlakySessions::default());
        let dialogs = Arc::new(FlakyDialogs::default());
        let orders = Arc::new(InMemoryOrderRepository::default());
        let blobs = Arc::new(InMemoryBlobStore::default());

        let stores = Stores {
            catalog: catalog.clone(),
            sessions: sessions.clone(),
            dialogs: dialogs.clone(),
            orders: orders.clone(),
            blobs: blobs.clone(),
        };
        let config =
            OperatorConfig { identity: OPERATOR.to_owned(), dialog_replacement: policy };
        let dispatcher = EventDispatcher::from_stores(&stores, &config);

        Self {
            catalog,
            sessions,
            dialogs,
            orders,
            blobs,
            dispatcher,
            sequence: std::sync::atomic::AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> String {
        format!("msg-{}", self.sequence.fetch_add(1, Ordering::SeqCst))
    }

    pub async fn send(&self, identity: &str, text: &str) -> Vec<Outbound> {
        let message = InboundMessage::text(self.next_id(), identity, text);
        self.dispatcher.dispatch(&message).await
    }

    pub async fn user(&self, text: &str) -> Vec<Outbound> {
        self.send(USER, text).await
    }

    pub async fn operator(&self, text: &str) -> Vec<Outbound> {
        self.send(OPERATOR, text).await
    }

    pub async fn user_image(&self, caption: &str) -> Vec<Outbound> {
        let message = InboundMessage::text(self.next_id(), USER, caption).with_attachment(
            Attachment { bytes: vec![0x89, 0x50, 0x4e, 0x47], mime_type: Some("image/png".into()) },
        );
        self.dispatcher.dispatch(&message).await
    }

    pub async fn session(&self, identity: &str) -> Session {
        self.sessions.get_or_create(identity).await.expect("session")
    }

    pub async fn product(&self, menu_index: u32, name: &str) -> Product {
        self.catalog
            .create_product(ProductDraft {
                menu_index,
                name: name.to_owned(),
                description: String::new(),
            })
            .await
            .expect("create product")
    }

    pub async fn offer(
        &self,
        product: &Product,
        menu_index: u32,
        description: &str,
        mobile: i64,
        card: i64,
    ) {
        self.catalog
            .create_offer(
                product.id,
                OfferDraft {
                    menu_index,
                    description: description.to_owned(),
                    price_mobile: mobile,
                    price_card: card,
                    price_usd: None,
                },
            )
            .await
            .expect("create offer");
    }

    pub async fn card_method(&self, menu_index: u32, label: &str) {
        self.catalog
            .create_payment_method(PaymentMethodDraft::card(menu_index, label, "9200 1111", "5555"))
            .await
            .expect("create card method");
    }

    pub async fn field(&self, product: &Product, name: &str) {
        self.catalog.create_field(product.id, name, true).await.expect("create field");
    }

    /// "Game A" (1): offer X 100/150, no fields; one card method.
    pub async fn seed_game_a(&self) -> Product {
        let product = self.product(1, "Game A").await;
        self.offer(&product, 1, "X", 100, 150).await;
        self.card_method(1, "Banco Metro").await;
        product
    }

    /// "Game B" (2): one field "player id", one offer.
    pub async fn seed_game_b(&self) -> Product {
        let product = self.product(2, "Game B").await;
        self.offer(&product, 1, "110 diamantes", 250, 300).await;
        self.field(&product, "player id").await;
        product
    }
}

pub fn texts_for<'a>(replies: &'a [Outbound], identity: &str) -> Vec<&'a str> {
    replies.iter().filter(|r| r.identity == identity).map(|r| r.text.as_str()).collect()
}

pub fn joined(replies: &[Outbound], identity: &str) -> String {
    texts_for(replies, identity).join("\n")
}
