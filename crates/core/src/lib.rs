pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod text;

pub use domain::catalog::{
    CustomField, CustomFieldId, Offer, OfferDraft, OfferId, PaymentMethod, PaymentMethodDraft,
    PaymentMethodId, PaymentMethodType, Product, ProductDraft, ProductId,
};
pub use domain::dialog::{DialogKind, DialogState, OfferUpdate, OperatorDialog};
pub use domain::order::{Order, OrderId, OrderStatus};
pub use domain::session::Session;
pub use errors::{ConversationError, DomainError};
pub use flows::{FunnelEngine, FunnelState, FunnelStep};
