use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// Payment label recorded for orders finalized through custom fields.
pub const PENDING_PAYMENT_LABEL: &str = "pending";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    /// Short, operator-typeable identifier (`ORD-` plus 12 hex digits of a v4 UUID).
    pub fn generate() -> Self {
        let raw = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
        Self(format!("ORD-{}", &raw[..12]))
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Completed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_identity: String,
    pub product_name: String,
    pub offer_descriptions: Vec<String>,
    pub payment_method_label: String,
    pub payment_details: BTreeMap<String, String>,
    pub screenshot_ref: Option<String>,
    pub field_values: BTreeMap<String, String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// The only admissible transition is Pending to Completed.
    pub fn complete(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != OrderStatus::Pending {
            return Err(DomainError::InvalidOrderTransition {
                from: self.status,
                to: OrderStatus::Completed,
            });
        }
        self.status = OrderStatus::Completed;
        self.completed_at = Some(at);
        Ok(())
    }
}
