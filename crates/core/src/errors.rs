use thiserror::Error;

use crate::domain::catalog::PaymentMethodType;
use crate::domain::order::{OrderId, OrderStatus};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid order transition from {from:?} to {to:?}")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },
}

/// Failures surfaced to the participant of a conversation step. None of them
/// advance the conversation; the caller re-prompts and the user may retry or cancel.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("invalid selection `{input}`")]
    InvalidSelection { input: String },
    #[error("{entity} `{reference}` not found")]
    NotFound { entity: &'static str, reference: String },
    #[error("nothing to select from")]
    EmptyCatalog,
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("invalid choice")]
    InvalidChoice,
    #[error("invalid price `{input}`")]
    InvalidPrice { input: String },
    #[error("an image attachment is required")]
    MissingAttachment,
    #[error("order {0} is already completed")]
    AlreadyCompleted(OrderId),
    #[error("no payment methods configured for {0:?}")]
    NoMethodsConfigured(PaymentMethodType),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConversationError {
    pub fn not_found(entity: &'static str, reference: impl ToString) -> Self {
        Self::NotFound { entity, reference: reference.to_string() }
    }

    pub fn invalid_selection(input: impl Into<String>) -> Self {
        Self::InvalidSelection { input: input.into() }
    }

    /// Text sent back to the participant. Internal details never leak.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidSelection { input } => {
                format!("❌ Opción inválida: \"{input}\". Responde con un número de la lista.")
            }
            Self::NotFound { entity, reference } => {
                format!("❌ No existe {entity} con referencia {reference}.")
            }
            Self::EmptyCatalog => {
                "⚠️ Esta opción no tiene elementos disponibles por ahora. Elige otra.".to_owned()
            }
            Self::MalformedInput(detail) => format!("❌ Formato incorrecto: {detail}"),
            Self::InvalidChoice => {
                "❌ Opción inválida. Responde 1 (Tarjeta) o 2 (Saldo móvil).".to_owned()
            }
            Self::InvalidPrice { input } => {
                format!("❌ Precio inválido: \"{input}\". Escribe un número entero.")
            }
            Self::MissingAttachment => {
                "📷 Envía la captura del pago como imagen para continuar.".to_owned()
            }
            Self::AlreadyCompleted(order_id) => {
                format!("⚠️ El pedido {order_id} ya estaba completado.")
            }
            Self::NoMethodsConfigured(method_type) => format!(
                "⚠️ No hay métodos de pago de tipo {} configurados. Contacta al administrador.",
                method_type.label()
            ),
            Self::Internal(_) => {
                "⚠️ Ocurrió un error interno. Intenta de nuevo en unos momentos.".to_owned()
            }
        }
    }
}
