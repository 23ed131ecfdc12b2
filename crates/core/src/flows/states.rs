use serde::{Deserialize, Serialize};

use crate::domain::catalog::{OfferId, PaymentMethodId, PaymentMethodType, ProductId};
use crate::domain::order::OrderId;

/// Fieldless view of [`FunnelState`], used for logs and the persisted `step` column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStep {
    Idle,
    AwaitingProductChoice,
    AwaitingOfferChoice,
    AwaitingFieldInput,
    AwaitingPaymentMethodType,
    AwaitingPaymentMethodChoice,
    AwaitingScreenshot,
}

impl FunnelStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingProductChoice => "awaiting_product_choice",
            Self::AwaitingOfferChoice => "awaiting_offer_choice",
            Self::AwaitingFieldInput => "awaiting_field_input",
            Self::AwaitingPaymentMethodType => "awaiting_payment_method_type",
            Self::AwaitingPaymentMethodChoice => "awaiting_payment_method_choice",
            Self::AwaitingScreenshot => "awaiting_screenshot",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "idle" => Some(Self::Idle),
            "awaiting_product_choice" => Some(Self::AwaitingProductChoice),
            "awaiting_offer_choice" => Some(Self::AwaitingOfferChoice),
            "awaiting_field_input" => Some(Self::AwaitingFieldInput),
            "awaiting_payment_method_type" => Some(Self::AwaitingPaymentMethodType),
            "awaiting_payment_method_choice" => Some(Self::AwaitingPaymentMethodChoice),
            "awaiting_screenshot" => Some(Self::AwaitingScreenshot),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    pub name: String,
    pub value: String,
}

/// Position of one end user in the funnel. Each variant owns exactly the selections
/// that are meaningful at that step, so leaving a step drops everything it collected.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum FunnelState {
    #[default]
    Idle,
    AwaitingProductChoice,
    AwaitingOfferChoice {
        product_id: ProductId,
    },
    AwaitingFieldInput {
        product_id: ProductId,
        offer_ids: Vec<OfferId>,
        field_index: usize,
        values: Vec<FieldValue>,
        order_id: OrderId,
    },
    AwaitingPaymentMethodType {
        product_id: ProductId,
        offer_ids: Vec<OfferId>,
    },
    AwaitingPaymentMethodChoice {
        product_id: ProductId,
        offer_ids: Vec<OfferId>,
        method_type: PaymentMethodType,
    },
    AwaitingScreenshot {
        product_id: ProductId,
        offer_ids: Vec<OfferId>,
        method_type: PaymentMethodType,
        method_id: PaymentMethodId,
        order_id: OrderId,
    },
}

impl FunnelState {
    pub fn step(&self) -> FunnelStep {
        match self {
            Self::Idle => FunnelStep::Idle,
            Self::AwaitingProductChoice => FunnelStep::AwaitingProductChoice,
            Self::AwaitingOfferChoice { .. } => FunnelStep::AwaitingOfferChoice,
            Self::AwaitingFieldInput { .. } => FunnelStep::AwaitingFieldInput,
            Self::AwaitingPaymentMethodType { .. } => FunnelStep::AwaitingPaymentMethodType,
            Self::AwaitingPaymentMethodChoice { .. } => FunnelStep::AwaitingPaymentMethodChoice,
            Self::AwaitingScreenshot { .. } => FunnelStep::AwaitingScreenshot,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn product_id(&self) -> Option<ProductId> {
        match self {
            Self::Idle | Self::AwaitingProductChoice => None,
            Self::AwaitingOfferChoice { product_id }
            | Self::AwaitingFieldInput { product_id, .. }
            | Self::AwaitingPaymentMethodType { product_id, .. }
            | Self::AwaitingPaymentMethodChoice { product_id, .. }
            | Self::AwaitingScreenshot { product_id, .. } => Some(*product_id),
        }
    }

    pub fn offer_ids(&self) -> &[OfferId] {
        match self {
            Self::AwaitingFieldInput { offer_ids, .. }
            | Self::AwaitingPaymentMethodType { offer_ids, .. }
            | Self::AwaitingPaymentMethodChoice { offer_ids, .. }
            | Self::AwaitingScreenshot { offer_ids, .. } => offer_ids,
            _ => &[],
        }
    }

    pub fn pending_order_id(&self) -> Option<&OrderId> {
        match self {
            Self::AwaitingFieldInput { order_id, .. } | Self::AwaitingScreenshot { order_id, .. } => {
                Some(order_id)
            }
            _ => None,
        }
    }
}
