use serde::{Deserialize, Serialize};

use crate::domain::catalog::{OfferId, PaymentMethodId, PaymentMethodType, ProductId};
use crate::domain::order::OrderId;
use crate::flows::states::{FieldValue, FunnelState, FunnelStep};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: FunnelStep,
    pub to: FunnelStep,
}

/// Result of storing one custom-field answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldProgress {
    Next(FunnelState),
    Complete(CompletedFields),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedFields {
    pub product_id: ProductId,
    pub offer_ids: Vec<OfferId>,
    pub values: Vec<FieldValue>,
    pub order_id: OrderId,
}

/// Pure step arithmetic of the client funnel. Catalog lookups and persistence
/// happen in the caller; everything here is deterministic given its inputs
/// (order ids aside).
#[derive(Clone, Copy, Debug, Default)]
pub struct FunnelEngine;

impl FunnelEngine {
    pub fn outcome(from: &FunnelState, to: &FunnelState) -> TransitionOutcome {
        TransitionOutcome { from: from.step(), to: to.step() }
    }

    /// Previous state for a "back" request. `None` means there is nothing before
    /// the current step and the main menu is simply shown again.
    pub fn back(&self, current: &FunnelState) -> Option<FunnelState> {
        match current {
            FunnelState::Idle | FunnelState::AwaitingProductChoice => None,
            FunnelState::AwaitingOfferChoice { .. } => Some(FunnelState::AwaitingProductChoice),
            FunnelState::AwaitingFieldInput {
                product_id,
                offer_ids,
                field_index,
                values,
                order_id,
            } => {
                if *field_index == 0 {
                    return Some(FunnelState::AwaitingOfferChoice { product_id: *product_id });
                }
                let mut values = values.clone();
                values.truncate(field_index - 1);
                Some(FunnelState::AwaitingFieldInput {
                    product_id: *product_id,
                    offer_ids: offer_ids.clone(),
                    field_index: field_index - 1,
                    values,
                    order_id: order_id.clone(),
                })
            }
            FunnelState::AwaitingPaymentMethodType { product_id, .. } => {
                Some(FunnelState::AwaitingOfferChoice { product_id: *product_id })
            }
            FunnelState::AwaitingPaymentMethodChoice { product_id, offer_ids, .. } => {
                Some(FunnelState::AwaitingPaymentMethodType {
                    product_id: *product_id,
                    offer_ids: offer_ids.clone(),
                })
            }
            FunnelState::AwaitingScreenshot { product_id, offer_ids, method_type, .. } => {
                Some(FunnelState::AwaitingPaymentMethodChoice {
                    product_id: *product_id,
                    offer_ids: offer_ids.clone(),
                    method_type: *method_type,
                })
            }
        }
    }

    /// Branch taken after a valid offer selection.
    pub fn after_offer_selection(
        &self,
        product_id: ProductId,
        offer_ids: Vec<OfferId>,
        field_count: usize,
    ) -> FunnelState {
        if field_count == 0 {
            return FunnelState::AwaitingPaymentMethodType { product_id, offer_ids };
        }
        FunnelState::AwaitingFieldInput {
            product_id,
            offer_ids,
            field_index: 0,
            values: Vec::new(),
            order_id: OrderId::generate(),
        }
    }

    /// Stores `answer` under the current field name. `field_names` is the current
    /// ordered field list of the product; if it shrank since the prompt was sent the
    /// flow completes with what was collected.
    pub fn record_field(
        &self,
        current: &FunnelState,
        field_names: &[String],
        answer: &str,
    ) -> Option<FieldProgress> {
        let FunnelState::AwaitingFieldInput { product_id, offer_ids, field_index, values, order_id } =
            current
        else {
            return None;
        };

        let mut values = values.clone();
        if let Some(name) = field_names.get(*field_index) {
            values.push(FieldValue { name: name.clone(), value: answer.to_owned() });
        }
        let next_index = field_index + 1;

        if next_index < field_names.len() {
            return Some(FieldProgress::Next(FunnelState::AwaitingFieldInput {
                product_id: *product_id,
                offer_ids: offer_ids.clone(),
                field_index: next_index,
                values,
                order_id: order_id.clone(),
            }));
        }

        Some(FieldProgress::Complete(CompletedFields {
            product_id: *product_id,
            offer_ids: offer_ids.clone(),
            values,
            order_id: order_id.clone(),
        }))
    }

    pub fn choose_payment_type(
        &self,
        current: &FunnelState,
        method_type: PaymentMethodType,
    ) -> Option<FunnelState> {
        let FunnelState::AwaitingPaymentMethodType { product_id, offer_ids } = current else {
            return None;
        };
        Some(FunnelState::AwaitingPaymentMethodChoice {
            product_id: *product_id,
            offer_ids: offer_ids.clone(),
            method_type,
        })
    }

    /// Moves to screenshot upload and allocates the order id the proof is stored under.
    pub fn choose_payment_method(
        &self,
        current: &FunnelState,
        method_id: PaymentMethodId,
    ) -> Option<FunnelState> {
        let FunnelState::AwaitingPaymentMethodChoice { product_id, offer_ids, method_type } =
            current
        else {
            return None;
        };
        Some(FunnelState::AwaitingScreenshot {
            product_id: *product_id,
            offer_ids: offer_ids.clone(),
            method_type: *method_type,
            method_id,
            order_id: OrderId::generate(),
        })
    }
}
