use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Detail keys stored in [`PaymentMethod::details`] for card methods.
pub const CARD_NUMBER_KEY: &str = "cardNumber";
pub const CONFIRM_NUMBER_KEY: &str = "confirmNumber";
/// Detail key stored in [`PaymentMethod::details`] for mobile-balance methods.
pub const PHONE_NUMBER_KEY: &str = "phoneNumber";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OfferId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PaymentMethodId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomFieldId(pub i64);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PaymentMethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A catalog entry the end user picks from the main menu.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub menu_index: u32,
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub menu_index: u32,
    pub name: String,
    pub description: String,
}

/// A purchasable option of a [`Product`]. Mobile and card prices are whole units;
/// the USD price is optional and may carry decimals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub product_id: ProductId,
    pub menu_index: u32,
    pub description: String,
    pub price_mobile: i64,
    pub price_card: i64,
    pub price_usd: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferDraft {
    pub menu_index: u32,
    pub description: String,
    pub price_mobile: i64,
    pub price_card: i64,
    pub price_usd: Option<Decimal>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodType {
    Card,
    MobileBalance,
}

impl PaymentMethodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::MobileBalance => "mobile_balance",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "card" => Some(Self::Card),
            "mobile_balance" => Some(Self::MobileBalance),
            _ => None,
        }
    }

    /// Menu choice shown to end users: `1` is card, `2` is mobile balance. Keycap
    /// glyphs count as the digits they render, like every other menu.
    pub fn from_choice(choice: &str) -> Option<Self> {
        match crate::text::parse_menu_index(choice)? {
            1 => Some(Self::Card),
            2 => Some(Self::MobileBalance),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Card => "Tarjeta",
            Self::MobileBalance => "Saldo móvil",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub method_type: PaymentMethodType,
    pub menu_index: u32,
    pub label: String,
    pub details: BTreeMap<String, String>,
}

impl PaymentMethod {
    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodDraft {
    pub method_type: PaymentMethodType,
    pub menu_index: u32,
    pub label: String,
    pub details: BTreeMap<String, String>,
}

impl PaymentMethodDraft {
    pub fn card(
        menu_index: u32,
        label: impl Into<String>,
        card_number: impl Into<String>,
        confirm_number: impl Into<String>,
    ) -> Self {
        let mut details = BTreeMap::new();
        details.insert(CARD_NUMBER_KEY.to_owned(), card_number.into());
        details.insert(CONFIRM_NUMBER_KEY.to_owned(), confirm_number.into());
        Self { method_type: PaymentMethodType::Card, menu_index, label: label.into(), details }
    }

    pub fn mobile(
        menu_index: u32,
        label: impl Into<String>,
        phone_number: impl Into<String>,
    ) -> Self {
        let mut details = BTreeMap::new();
        details.insert(PHONE_NUMBER_KEY.to_owned(), phone_number.into());
        Self {
            method_type: PaymentMethodType::MobileBalance,
            menu_index,
            label: label.into(),
            details,
        }
    }
}

/// Follow-up question asked after offer selection, in ascending `order`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomField {
    pub id: CustomFieldId,
    pub product_id: ProductId,
    pub name: String,
    pub order: u32,
    pub required: bool,
}
