use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use recarga_core::domain::catalog::{
    CustomField, Offer, OfferDraft, OfferId, PaymentMethod, PaymentMethodDraft, PaymentMethodId,
    PaymentMethodType, Product, ProductDraft, ProductId,
};
use recarga_core::domain::dialog::{OfferUpdate, OperatorDialog};
use recarga_core::domain::order::{Order, OrderId};
use recarga_core::domain::session::Session;
use recarga_core::errors::ConversationError;

pub mod catalog;
pub mod dialog;
pub mod memory;
pub mod order;
pub mod session;

pub use catalog::SqlCatalogRepository;
pub use dialog::SqlDialogRepository;
pub use memory::{
    InMemoryCatalogRepository, InMemoryDialogRepository, InMemoryOrderRepository,
    InMemorySessionRepository,
};
pub use order::SqlOrderRepository;
pub use session::SqlSessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Maps unique-constraint violations to `Conflict` so callers can report them per item.
    pub(crate) fn from_write(error: sqlx::Error, what: impl FnOnce() -> String) -> Self {
        match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Conflict(what()),
            _ => Self::Database(error),
        }
    }
}

impl From<RepositoryError> for ConversationError {
    fn from(error: RepositoryError) -> Self {
        ConversationError::Internal(error.to_string())
    }
}

/// Read-modify access to the operator-managed catalog. Every lookup reads current
/// state; nothing is cached.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError>;
    async fn product_by_index(&self, menu_index: u32) -> Result<Option<Product>, RepositoryError>;
    async fn product_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;
    async fn create_product(&self, draft: ProductDraft) -> Result<Product, RepositoryError>;
    async fn rename_product(&self, id: ProductId, name: &str) -> Result<bool, RepositoryError>;
    /// Removes the product together with its offers and custom fields.
    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError>;

    async fn list_offers(&self, product_id: ProductId) -> Result<Vec<Offer>, RepositoryError>;
    async fn offer_by_index(
        &self,
        product_id: ProductId,
        menu_index: u32,
    ) -> Result<Option<Offer>, RepositoryError>;
    async fn offer_by_id(&self, id: OfferId) -> Result<Option<Offer>, RepositoryError>;
    async fn create_offer(
        &self,
        product_id: ProductId,
        draft: OfferDraft,
    ) -> Result<Offer, RepositoryError>;
    async fn update_offer(&self, id: OfferId, update: &OfferUpdate)
        -> Result<bool, RepositoryError>;
    async fn delete_offer(&self, id: OfferId) -> Result<bool, RepositoryError>;

    async fn list_payment_methods(
        &self,
        method_type: Option<PaymentMethodType>,
    ) -> Result<Vec<PaymentMethod>, RepositoryError>;
    async fn payment_method_by_index(
        &self,
        method_type: PaymentMethodType,
        menu_index: u32,
    ) -> Result<Option<PaymentMethod>, RepositoryError>;
    async fn payment_method_by_id(
        &self,
        id: PaymentMethodId,
    ) -> Result<Option<PaymentMethod>, RepositoryError>;
    async fn create_payment_method(
        &self,
        draft: PaymentMethodDraft,
    ) -> Result<PaymentMethod, RepositoryError>;
    /// Replaces the label and merges `details` into the stored mapping.
    async fn update_payment_method(
        &self,
        id: PaymentMethodId,
        label: &str,
        details: &BTreeMap<String, String>,
    ) -> Result<bool, RepositoryError>;
    async fn delete_payment_method(&self, id: PaymentMethodId) -> Result<bool, RepositoryError>;

    /// Fields in ascending `order`.
    async fn list_fields(&self, product_id: ProductId) -> Result<Vec<CustomField>, RepositoryError>;
    /// Appends a field after the current last one.
    async fn create_field(
        &self,
        product_id: ProductId,
        name: &str,
        required: bool,
    ) -> Result<CustomField, RepositoryError>;
    async fn delete_field(&self, product_id: ProductId, name: &str)
        -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Returns the stored session or persists a fresh idle one.
    async fn get_or_create(&self, identity: &str) -> Result<Session, RepositoryError>;
    async fn save(&self, session: &Session) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait DialogRepository: Send + Sync {
    async fn find(&self, operator_identity: &str)
        -> Result<Option<OperatorDialog>, RepositoryError>;
    /// Stores the dialog, replacing any other dialog of the same operator.
    async fn save(&self, dialog: &OperatorDialog) -> Result<(), RepositoryError>;
    async fn clear(&self, operator_identity: &str) -> Result<bool, RepositoryError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompletionOutcome {
    Completed(Order),
    AlreadyCompleted(Order),
    NotFound,
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts the order unless one with the same id exists. Returns whether a row was written.
    async fn create(&self, order: &Order) -> Result<bool, RepositoryError>;
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;
    /// Flips a pending order to completed exactly once.
    async fn complete(
        &self,
        id: &OrderId,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<CompletionOutcome, RepositoryError>;
}
