use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::catalog::{OfferDraft, OfferId, PaymentMethodId, PaymentMethodType, ProductId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogKind {
    CreateCardMethod,
    CreateMobileMethod,
    BulkCreateProducts,
    BulkAddOffers,
    EditProductName,
    EditOffer,
    EditPaymentMethod,
}

impl DialogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateCardMethod => "create_card_method",
            Self::CreateMobileMethod => "create_mobile_method",
            Self::BulkCreateProducts => "bulk_create_products",
            Self::BulkAddOffers => "bulk_add_offers",
            Self::EditProductName => "edit_product_name",
            Self::EditOffer => "edit_offer",
            Self::EditPaymentMethod => "edit_payment_method",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "create_card_method" => Some(Self::CreateCardMethod),
            "create_mobile_method" => Some(Self::CreateMobileMethod),
            "bulk_create_products" => Some(Self::BulkCreateProducts),
            "bulk_add_offers" => Some(Self::BulkAddOffers),
            "edit_product_name" => Some(Self::EditProductName),
            "edit_offer" => Some(Self::EditOffer),
            "edit_payment_method" => Some(Self::EditPaymentMethod),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "at", rename_all = "snake_case")]
pub enum CardMethodStep {
    Index,
    Label { menu_index: u32 },
    CardNumber { menu_index: u32, label: String },
    ConfirmNumber { menu_index: u32, label: String, card_number: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "at", rename_all = "snake_case")]
pub enum MobileMethodStep {
    Index,
    Label { menu_index: u32 },
    PhoneNumber { menu_index: u32, label: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "at", rename_all = "snake_case")]
pub enum EditOfferStep {
    Description,
    PriceMobile { description: String },
    PriceCard { description: String, price_mobile: i64 },
    PriceUsd { description: String, price_mobile: i64, price_card: i64 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "at", rename_all = "snake_case")]
pub enum EditMethodStep {
    Label,
    CardNumber { label: String },
    ConfirmNumber { label: String, card_number: String },
    PhoneNumber { label: String },
}

/// One in-flight administrative dialog. The variant is the dialog kind and its
/// payload is the step together with everything collected so far.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DialogState {
    CreateCardMethod { step: CardMethodStep },
    CreateMobileMethod { step: MobileMethodStep },
    BulkCreateProducts { lines: Vec<String> },
    BulkAddOffers { product_id: ProductId, offers: Vec<OfferDraft> },
    EditProductName { product_id: ProductId },
    EditOffer { offer_id: OfferId, step: EditOfferStep },
    EditPaymentMethod {
        method_id: PaymentMethodId,
        method_type: PaymentMethodType,
        step: EditMethodStep,
    },
}

impl DialogState {
    pub fn kind(&self) -> DialogKind {
        match self {
            Self::CreateCardMethod { .. } => DialogKind::CreateCardMethod,
            Self::CreateMobileMethod { .. } => DialogKind::CreateMobileMethod,
            Self::BulkCreateProducts { .. } => DialogKind::BulkCreateProducts,
            Self::BulkAddOffers { .. } => DialogKind::BulkAddOffers,
            Self::EditProductName { .. } => DialogKind::EditProductName,
            Self::EditOffer { .. } => DialogKind::EditOffer,
            Self::EditPaymentMethod { .. } => DialogKind::EditPaymentMethod,
        }
    }

    /// Zero-based step number within the kind; `(kind, step)` addresses a prompt.
    pub fn step(&self) -> u32 {
        match self {
            Self::CreateCardMethod { step } => match step {
                CardMethodStep::Index => 0,
                CardMethodStep::Label { .. } => 1,
                CardMethodStep::CardNumber { .. } => 2,
                CardMethodStep::ConfirmNumber { .. } => 3,
            },
            Self::CreateMobileMethod { step } => match step {
                MobileMethodStep::Index => 0,
                MobileMethodStep::Label { .. } => 1,
                MobileMethodStep::PhoneNumber { .. } => 2,
            },
            Self::BulkCreateProducts { .. }
            | Self::BulkAddOffers { .. }
            | Self::EditProductName { .. } => 0,
            Self::EditOffer { step, .. } => match step {
                EditOfferStep::Description => 0,
                EditOfferStep::PriceMobile { .. } => 1,
                EditOfferStep::PriceCard { .. } => 2,
                EditOfferStep::PriceUsd { .. } => 3,
            },
            Self::EditPaymentMethod { step, .. } => match step {
                EditMethodStep::Label => 0,
                EditMethodStep::CardNumber { .. } | EditMethodStep::PhoneNumber { .. } => 1,
                EditMethodStep::ConfirmNumber { .. } => 2,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorDialog {
    pub operator_identity: String,
    pub state: DialogState,
    pub updated_at: DateTime<Utc>,
}

/// Replacement values gathered by an `EditOffer` dialog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferUpdate {
    pub description: String,
    pub price_mobile: i64,
    pub price_card: i64,
    pub price_usd: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::{CardMethodStep, DialogKind, DialogState, EditMethodStep};
    use crate::domain::catalog::{PaymentMethodId, PaymentMethodType};

    #[test]
    fn kind_names_round_trip() {
        for kind in [
            DialogKind::CreateCardMethod,
            DialogKind::CreateMobileMethod,
            DialogKind::BulkCreateProducts,
            DialogKind::BulkAddOffers,
            DialogKind::EditProductName,
            DialogKind::EditOffer,
            DialogKind::EditPaymentMethod,
        ] {
            assert_eq!(DialogKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn step_numbers_follow_collection_progress() {
        let state = DialogState::CreateCardMethod {
            step: CardMethodStep::ConfirmNumber {
                menu_index: 1,
                label: "BPA".to_owned(),
                card_number: "9200".to_owned(),
            },
        };
        assert_eq!(state.kind(), DialogKind::CreateCardMethod);
        assert_eq!(state.step(), 3);

        let mobile_edit = DialogState::EditPaymentMethod {
            method_id: PaymentMethodId(2),
            method_type: PaymentMethodType::MobileBalance,
            step: EditMethodStep::PhoneNumber { label: "Cubacel".to_owned() },
        };
        assert_eq!(mobile_edit.step(), 1);
    }

    #[test]
    fn state_json_is_self_describing() {
        let state = DialogState::BulkCreateProducts { lines: vec!["1 Game A".to_owned()] };
        let json = serde_json::to_value(&state).expect("serialize");
        assert_eq!(json["kind"], "bulk_create_products");
        let decoded: DialogState = serde_json::from_value(json).expect("deserialize");
        assert_eq!(decoded, state);
    }
}
