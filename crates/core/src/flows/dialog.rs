use std::collections::BTreeMap;

use crate::domain::catalog::{
    OfferDraft, OfferId, PaymentMethodDraft, PaymentMethodId, PaymentMethodType, ProductId,
    CARD_NUMBER_KEY, CONFIRM_NUMBER_KEY, PHONE_NUMBER_KEY,
};
use crate::domain::dialog::{
    CardMethodStep, DialogState, EditMethodStep, EditOfferStep, MobileMethodStep, OfferUpdate,
};
use crate::errors::ConversationError;
use crate::text;

pub const PRODUCT_TABLE_TERMINATOR: &str = "/listo";
pub const OFFER_ENTRY_TERMINATOR: &str = "/fin";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DialogAdvance {
    /// Dialog stays open. `rejected` lists input lines that could not be used.
    Continue { state: DialogState, rejected: Vec<String> },
    Commit(DialogCommit),
}

/// Catalog mutation requested by a finished dialog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DialogCommit {
    CreatePaymentMethod(PaymentMethodDraft),
    CreateProducts { lines: Vec<String> },
    CreateOffers { product_id: ProductId, offers: Vec<OfferDraft>, rejected: Vec<String> },
    RenameProduct { product_id: ProductId, name: String },
    UpdateOffer { offer_id: OfferId, update: OfferUpdate },
    UpdatePaymentMethod {
        method_id: PaymentMethodId,
        label: String,
        details: BTreeMap<String, String>,
    },
}

/// Applies one operator message to an open dialog. Errors leave the dialog where it was.
pub fn advance(state: &DialogState, input: &str) -> Result<DialogAdvance, ConversationError> {
    match state {
        DialogState::CreateCardMethod { step } => advance_card(step, input),
        DialogState::CreateMobileMethod { step } => advance_mobile(step, input),
        DialogState::BulkCreateProducts { lines } => Ok(advance_product_table(lines, input)),
        DialogState::BulkAddOffers { product_id, offers } => {
            Ok(advance_offer_entry(*product_id, offers, input))
        }
        DialogState::EditProductName { product_id } => Ok(DialogAdvance::Commit(
            DialogCommit::RenameProduct { product_id: *product_id, name: required_text(input)? },
        )),
        DialogState::EditOffer { offer_id, step } => advance_offer_edit(*offer_id, step, input),
        DialogState::EditPaymentMethod { method_id, method_type, step } => {
            advance_method_edit(*method_id, *method_type, step, input)
        }
    }
}

fn advance_card(step: &CardMethodStep, input: &str) -> Result<DialogAdvance, ConversationError> {
    let next = match step {
        CardMethodStep::Index => CardMethodStep::Label { menu_index: menu_index(input)? },
        CardMethodStep::Label { menu_index } => {
            CardMethodStep::CardNumber { menu_index: *menu_index, label: required_text(input)? }
        }
        CardMethodStep::CardNumber { menu_index, label } => CardMethodStep::ConfirmNumber {
            menu_index: *menu_index,
            label: label.clone(),
            card_number: required_text(input)?,
        },
        CardMethodStep::ConfirmNumber { menu_index, label, card_number } => {
            return Ok(DialogAdvance::Commit(DialogCommit::CreatePaymentMethod(
                PaymentMethodDraft::card(
                    *menu_index,
                    label.clone(),
                    card_number.clone(),
                    required_text(input)?,
                ),
            )));
        }
    };
    Ok(continue_with(DialogState::CreateCardMethod { step: next }))
}

fn advance_mobile(
    step: &MobileMethodStep,
    input: &str,
) -> Result<DialogAdvance, ConversationError> {
    let next = match step {
        MobileMethodStep::Index => MobileMethodStep::Label { menu_index: menu_index(input)? },
        MobileMethodStep::Label { menu_index } => MobileMethodStep::PhoneNumber {
            menu_index: *menu_index,
            label: required_text(input)?,
        },
        MobileMethodStep::PhoneNumber { menu_index, label } => {
            return Ok(DialogAdvance::Commit(DialogCommit::CreatePaymentMethod(
                PaymentMethodDraft::mobile(*menu_index, label.clone(), required_text(input)?),
            )));
        }
    };
    Ok(continue_with(DialogState::CreateMobileMethod { step: next }))
}

fn advance_product_table(accumulated: &[String], input: &str) -> DialogAdvance {
    let mut lines = accumulated.to_vec();
    for line in text::lines(input) {
        if is_terminator(line, PRODUCT_TABLE_TERMINATOR) {
            return DialogAdvance::Commit(DialogCommit::CreateProducts { lines });
        }
        lines.push(line.to_owned());
    }
    continue_with(DialogState::BulkCreateProducts { lines })
}

fn advance_offer_entry(
    product_id: ProductId,
    accumulated: &[OfferDraft],
    input: &str,
) -> DialogAdvance {
    let mut offers = accumulated.to_vec();
    let mut rejected = Vec::new();
    for line in text::lines(input) {
        if is_terminator(line, OFFER_ENTRY_TERMINATOR) {
            return DialogAdvance::Commit(DialogCommit::CreateOffers {
                product_id,
                offers,
                rejected,
            });
        }
        match text::parse_offer_line(line) {
            Ok(draft) => offers.push(draft),
            Err(line) => rejected.push(line),
        }
    }
    DialogAdvance::Continue { state: DialogState::BulkAddOffers { product_id, offers }, rejected }
}

fn advance_offer_edit(
    offer_id: OfferId,
    step: &EditOfferStep,
    input: &str,
) -> Result<DialogAdvance, ConversationError> {
    let next = match step {
        EditOfferStep::Description => {
            EditOfferStep::PriceMobile { description: required_text(input)? }
        }
        EditOfferStep::PriceMobile { description } => EditOfferStep::PriceCard {
            description: description.clone(),
            price_mobile: price(input)?,
        },
        EditOfferStep::PriceCard { description, price_mobile } => EditOfferStep::PriceUsd {
            description: description.clone(),
            price_mobile: *price_mobile,
            price_card: price(input)?,
        },
        EditOfferStep::PriceUsd { description, price_mobile, price_card } => {
            let price_usd = text::parse_optional_usd(input)
                .map_err(|input| ConversationError::InvalidPrice { input })?;
            return Ok(DialogAdvance::Commit(DialogCommit::UpdateOffer {
                offer_id,
                update: OfferUpdate {
                    description: description.clone(),
                    price_mobile: *price_mobile,
                    price_card: *price_card,
                    price_usd,
                },
            }));
        }
    };
    Ok(continue_with(DialogState::EditOffer { offer_id, step: next }))
}

fn advance_method_edit(
    method_id: PaymentMethodId,
    method_type: PaymentMethodType,
    step: &EditMethodStep,
    input: &str,
) -> Result<DialogAdvance, ConversationError> {
    let next = match step {
        EditMethodStep::Label => {
            let label = required_text(input)?;
            match method_type {
                PaymentMethodType::Card => EditMethodStep::CardNumber { label },
                PaymentMethodType::MobileBalance => EditMethodStep::PhoneNumber { label },
            }
        }
        EditMethodStep::CardNumber { label } => EditMethodStep::ConfirmNumber {
            label: label.clone(),
            card_number: required_text(input)?,
        },
        EditMethodStep::ConfirmNumber { label, card_number } => {
            let details = BTreeMap::from([
                (CARD_NUMBER_KEY.to_owned(), card_number.clone()),
                (CONFIRM_NUMBER_KEY.to_owned(), required_text(input)?),
            ]);
            return Ok(DialogAdvance::Commit(DialogCommit::UpdatePaymentMethod {
                method_id,
                label: label.clone(),
                details,
            }));
        }
        EditMethodStep::PhoneNumber { label } => {
            let details = BTreeMap::from([(PHONE_NUMBER_KEY.to_owned(), required_text(input)?)]);
            return Ok(DialogAdvance::Commit(DialogCommit::UpdatePaymentMethod {
                method_id,
                label: label.clone(),
                details,
            }));
        }
    };
    Ok(continue_with(DialogState::EditPaymentMethod { method_id, method_type, step: next }))
}

fn continue_with(state: DialogState) -> DialogAdvance {
    DialogAdvance::Continue { state, rejected: Vec::new() }
}

fn is_terminator(line: &str, terminator: &str) -> bool {
    line.trim().eq_ignore_ascii_case(terminator)
}

fn menu_index(input: &str) -> Result<u32, ConversationError> {
    text::parse_menu_index(input).ok_or_else(|| ConversationError::invalid_selection(input.trim()))
}

fn price(input: &str) -> Result<i64, ConversationError> {
    text::parse_price(input)
        .ok_or_else(|| ConversationError::InvalidPrice { input: input.trim().to_owned() })
}

fn required_text(input: &str) -> Result<String, ConversationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ConversationError::MalformedInput("se esperaba un texto".to_owned()));
    }
    Ok(trimmed.to_owned())
}
