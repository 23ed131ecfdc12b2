use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use recarga_core::domain::catalog::{Offer, OfferId, PaymentMethodType, ProductId};
use recarga_core::domain::order::{Order, OrderId, OrderStatus, PENDING_PAYMENT_LABEL};
use recarga_core::errors::ConversationError;
use recarga_core::flows::{CompletedFields, FieldProgress, FunnelEngine, FunnelState};
use recarga_core::text;
use recarga_db::{screenshot_key, BlobStore, CatalogRepository, OrderRepository, SessionRepository};

use crate::events::{EventContext, InboundMessage, Outbound};
use crate::messages;
use crate::stores::Stores;

/// What a single inbound message does to a session: an optional new state plus
/// the texts to send once that state is durable.
#[derive(Debug, Default)]
struct Transition {
    next: Option<FunnelState>,
    replies: Vec<String>,
    operator_notice: Option<String>,
}

impl Transition {
    fn stay(replies: Vec<String>) -> Self {
        Self { next: None, replies, operator_notice: None }
    }

    fn to(next: FunnelState, replies: Vec<String>) -> Self {
        Self { next: Some(next), replies, operator_notice: None }
    }

    fn notify_operator(mut self, notice: String) -> Self {
        self.operator_notice = Some(notice);
        self
    }
}

/// Drives the end-user conversation from browsing to a pending order.
pub struct FunnelService {
    catalog: Arc<dyn CatalogRepository>,
    sessions: Arc<dyn SessionRepository>,
    orders: Arc<dyn OrderRepository>,
    blobs: Arc<dyn BlobStore>,
    operator_identity: String,
    engine: FunnelEngine,
}

impl FunnelService {
    pub fn new(stores: &Stores, operator_identity: impl Into<String>) -> Self {
        Self {
            catalog: stores.catalog.clone(),
            sessions: stores.sessions.clone(),
            orders: stores.orders.clone(),
            blobs: stores.blobs.clone(),
            operator_identity: operator_identity.into(),
            engine: FunnelEngine,
        }
    }

    /// Consumes one message. Failures are answered with a corrective text and leave
    /// the stored session untouched.
    pub async fn handle(&self, message: &InboundMessage, ctx: &EventContext) -> Vec<Outbound> {
        match self.apply(message, ctx).await {
            Ok(replies) => replies,
            Err(error) => {
                if matches!(error, ConversationError::Internal(_)) {
                    warn!(
                        event_name = "funnel.step_failed",
                        correlation_id = %ctx.correlation_id,
                        identity = %message.identity,
                        error = %error,
                        "funnel step failed; session left unchanged"
                    );
                } else {
                    debug!(
                        event_name = "funnel.input_rejected",
                        correlation_id = %ctx.correlation_id,
                        identity = %message.identity,
                        error = %error,
                        "funnel input rejected"
                    );
                }
                vec![Outbound::new(&message.identity, error.user_message())]
            }
        }
    }

    async fn apply(
        &self,
        message: &InboundMessage,
        ctx: &EventContext,
    ) -> Result<Vec<Outbound>, ConversationError> {
        let mut session = self.sessions.get_or_create(&message.identity).await?;
        let transition = self.interpret(&session.state, message).await?;

        if let Some(next) = transition.next {
            let outcome = FunnelEngine::outcome(&session.state, &next);
            session.state = next;
            session.updated_at = Utc::now();
            self.sessions.save(&session).await?;
            info!(
                event_name = "funnel.step_applied",
                correlation_id = %ctx.correlation_id,
                identity = %message.identity,
                from = outcome.from.as_str(),
                to = outcome.to.as_str(),
                "funnel step applied"
            );
        }

        let mut outbound = transition
            .replies
            .into_iter()
            .map(|text| Outbound::new(&message.identity, text))
            .collect::<Vec<_>>();
        if let Some(notice) = transition.operator_notice {
            outbound.push(Outbound::new(&self.operator_identity, notice));
        }
        Ok(outbound)
    }

    async fn interpret(
        &self,
        state: &FunnelState,
        message: &InboundMessage,
    ) -> Result<Transition, ConversationError> {
        let input = message.text.trim();

        if let Some(order) = self.recorded_pending_order(state).await? {
            return Ok(finished(order));
        }
        if text::is_cancel(input) {
            return self.reset(state, true).await;
        }
        if text::is_back(input) {
            return self.back(state).await;
        }
        if offers_trigger_applies(state, message) {
            return self.reset(state, false).await;
        }

        match state {
            FunnelState::Idle => self.from_idle(input).await,
            FunnelState::AwaitingProductChoice => self.choose_product(input).await,
            FunnelState::AwaitingOfferChoice { product_id } => {
                self.choose_offers(*product_id, input).await
            }
            FunnelState::AwaitingFieldInput { .. } => self.record_field(state, message).await,
            FunnelState::AwaitingPaymentMethodType { .. } => {
                self.choose_payment_type(state, input).await
            }
            FunnelState::AwaitingPaymentMethodChoice { offer_ids, method_type, .. } => {
                self.choose_payment_method(state, offer_ids, *method_type, input).await
            }
            FunnelState::AwaitingScreenshot { .. } => self.accept_screenshot(state, message).await,
        }
    }

    async fn main_menu(&self) -> Result<String, ConversationError> {
        let products = self.catalog.list_products().await?;
        Ok(messages::main_menu(&products))
    }

    /// Cancel and the offers trigger both land here. An idle session is not written.
    async fn reset(
        &self,
        state: &FunnelState,
        cancelled: bool,
    ) -> Result<Transition, ConversationError> {
        let menu = self.main_menu().await?;
        if state.is_idle() {
            return Ok(Transition::stay(vec![menu]));
        }
        let mut replies = Vec::new();
        if cancelled {
            replies.push(messages::cancelled_notice());
        }
        replies.push(menu);
        Ok(Transition::to(FunnelState::Idle, replies))
    }

    async fn back(&self, state: &FunnelState) -> Result<Transition, ConversationError> {
        match self.engine.back(state) {
            None => Ok(Transition::stay(vec![self.main_menu().await?])),
            Some(previous) => {
                let prompt = self.prompt_for(&previous).await?;
                Ok(Transition::to(previous, vec![prompt]))
            }
        }
    }

    /// Regenerates the prompt a state waits on from current catalog data.
    async fn prompt_for(&self, state: &FunnelState) -> Result<String, ConversationError> {
        match state {
            FunnelState::Idle | FunnelState::AwaitingProductChoice => self.main_menu().await,
            FunnelState::AwaitingOfferChoice { product_id } => {
                let product = self
                    .catalog
                    .product_by_id(*product_id)
                    .await?
                    .ok_or_else(|| ConversationError::not_found("juego", product_id.0))?;
                let offers = self.catalog.list_offers(product.id).await?;
                Ok(messages::offer_menu(&product, &offers))
            }
            FunnelState::AwaitingFieldInput { product_id, field_index, .. } => {
                let fields = self.catalog.list_fields(*product_id).await?;
                let field = fields
                    .get(*field_index)
                    .ok_or_else(|| ConversationError::not_found("campo", field_index + 1))?;
                Ok(messages::field_prompt(&field.name, field_index + 1, fields.len()))
            }
            FunnelState::AwaitingPaymentMethodType { .. } => Ok(messages::payment_type_prompt()),
            FunnelState::AwaitingPaymentMethodChoice { method_type, .. } => {
                let methods = self.catalog.list_payment_methods(Some(*method_type)).await?;
                Ok(messages::payment_method_menu(*method_type, &methods))
            }
            FunnelState::AwaitingScreenshot { .. } => Ok(messages::screenshot_prompt()),
        }
    }

    /// The selected product vanished mid-flow; start over.
    async fn product_gone(&self) -> Result<Transition, ConversationError> {
        let menu = self.main_menu().await?;
        Ok(Transition::to(FunnelState::Idle, vec![messages::product_unavailable_notice(), menu]))
    }

    async fn from_idle(&self, input: &str) -> Result<Transition, ConversationError> {
        let products = self.catalog.list_products().await?;
        if products.is_empty() {
            return Ok(Transition::stay(vec![messages::empty_catalog_notice()]));
        }
        let names_a_product = text::parse_menu_index(input)
            .is_some_and(|index| products.iter().any(|p| p.menu_index == index));
        if names_a_product {
            return self.choose_product(input).await;
        }
        Ok(Transition::to(FunnelState::AwaitingProductChoice, vec![messages::main_menu(&products)]))
    }

    async fn choose_product(&self, input: &str) -> Result<Transition, ConversationError> {
        let index = text::parse_menu_index(input)
            .ok_or_else(|| ConversationError::invalid_selection(input))?;
        let product = self
            .catalog
            .product_by_index(index)
            .await?
            .ok_or_else(|| ConversationError::invalid_selection(input))?;
        let offers = self.catalog.list_offers(product.id).await?;
        if offers.is_empty() {
            return Err(ConversationError::EmptyCatalog);
        }
        Ok(Transition::to(
            FunnelState::AwaitingOfferChoice { product_id: product.id },
            vec![messages::offer_menu(&product, &offers)],
        ))
    }

    /// All-or-nothing: one unknown index rejects the whole selection.
    async fn choose_offers(
        &self,
        product_id: ProductId,
        input: &str,
    ) -> Result<Transition, ConversationError> {
        let Some(product) = self.catalog.product_by_id(product_id).await? else {
            return self.product_gone().await;
        };
        let indices = text::parse_menu_indices(input).map_err(ConversationError::invalid_selection)?;
        if indices.is_empty() {
            return Err(ConversationError::invalid_selection(input));
        }

        let mut offer_ids = Vec::with_capacity(indices.len());
        for index in indices {
            let offer = self
                .catalog
                .offer_by_index(product.id, index)
                .await?
                .ok_or_else(|| ConversationError::invalid_selection(index.to_string()))?;
            offer_ids.push(offer.id);
        }

        let fields = self.catalog.list_fields(product.id).await?;
        let next = self.engine.after_offer_selection(product.id, offer_ids, fields.len());
        let prompt = match fields.first() {
            Some(first) => messages::field_prompt(&first.name, 1, fields.len()),
            None => messages::payment_type_prompt(),
        };
        Ok(Transition::to(next, vec![prompt]))
    }

    async fn record_field(
        &self,
        state: &FunnelState,
        message: &InboundMessage,
    ) -> Result<Transition, ConversationError> {
        let FunnelState::AwaitingFieldInput { product_id, field_index, .. } = state else {
            return Err(ConversationError::Internal("session is not collecting fields".into()));
        };
        let fields = self.catalog.list_fields(*product_id).await?;
        if let Some(field) = fields.get(*field_index) {
            if field.required && message.text.trim().is_empty() {
                return Err(ConversationError::MalformedInput(format!(
                    "{} no puede quedar vacío.",
                    field.name
                )));
            }
        }

        let names = fields.iter().map(|f| f.name.clone()).collect::<Vec<_>>();
        match self.engine.record_field(state, &names, &message.text) {
            Some(FieldProgress::Next(next)) => {
                let prompt = self.prompt_for(&next).await?;
                Ok(Transition::to(next, vec![prompt]))
            }
            Some(FieldProgress::Complete(done)) => {
                self.finalize_fields(&message.identity, done).await
            }
            None => Err(ConversationError::Internal("session is not collecting fields".into())),
        }
    }

    async fn finalize_fields(
        &self,
        identity: &str,
        done: CompletedFields,
    ) -> Result<Transition, ConversationError> {
        let Some(product) = self.catalog.product_by_id(done.product_id).await? else {
            return self.product_gone().await;
        };
        let offers = self.load_offers(&done.offer_ids).await?;
        if offers.is_empty() {
            return self.product_gone().await;
        }

        let order = Order {
            id: done.order_id,
            user_identity: identity.to_owned(),
            product_name: product.name,
            offer_descriptions: offers.into_iter().map(|o| o.description).collect(),
            payment_method_label: PENDING_PAYMENT_LABEL.to_owned(),
            payment_details: BTreeMap::new(),
            screenshot_ref: None,
            field_values: done.values.into_iter().map(|v| (v.name, v.value)).collect(),
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        };
        let order = self.record_order(order).await?;
        Ok(finished(order))
    }

    async fn choose_payment_type(
        &self,
        state: &FunnelState,
        input: &str,
    ) -> Result<Transition, ConversationError> {
        let method_type =
            PaymentMethodType::from_choice(input).ok_or(ConversationError::InvalidChoice)?;
        let methods = self.catalog.list_payment_methods(Some(method_type)).await?;
        if methods.is_empty() {
            let notice = ConversationError::NoMethodsConfigured(method_type).user_message();
            return Ok(Transition::to(FunnelState::Idle, vec![notice]));
        }
        let next = self
            .engine
            .choose_payment_type(state, method_type)
            .ok_or_else(|| ConversationError::Internal("session is not choosing a type".into()))?;
        Ok(Transition::to(next, vec![messages::payment_method_menu(method_type, &methods)]))
    }

    async fn choose_payment_method(
        &self,
        state: &FunnelState,
        offer_ids: &[OfferId],
        method_type: PaymentMethodType,
        input: &str,
    ) -> Result<Transition, ConversationError> {
        let index = text::parse_menu_index(input)
            .ok_or_else(|| ConversationError::invalid_selection(input))?;
        let method = self
            .catalog
            .payment_method_by_index(method_type, index)
            .await?
            .ok_or_else(|| ConversationError::invalid_selection(input))?;
        let offers = self.load_offers(offer_ids).await?;
        let next = self
            .engine
            .choose_payment_method(state, method.id)
            .ok_or_else(|| ConversationError::Internal("session is not choosing a method".into()))?;
        Ok(Transition::to(next, vec![messages::payment_instructions(&method, &offers)]))
    }

    async fn accept_screenshot(
        &self,
        state: &FunnelState,
        message: &InboundMessage,
    ) -> Result<Transition, ConversationError> {
        let FunnelState::AwaitingScreenshot { product_id, offer_ids, method_id, order_id, .. } =
            state
        else {
            return Err(ConversationError::Internal("session is not awaiting a proof".into()));
        };
        let attachment = message.attachment.as_ref().ok_or(ConversationError::MissingAttachment)?;

        let Some(product) = self.catalog.product_by_id(*product_id).await? else {
            return self.product_gone().await;
        };
        let Some(method) = self.catalog.payment_method_by_id(*method_id).await? else {
            return self.product_gone().await;
        };
        let offers = self.load_offers(offer_ids).await?;
        if offers.is_empty() {
            return self.product_gone().await;
        }

        let reference = self.store_proof(order_id, attachment).await?;
        let order = Order {
            id: order_id.clone(),
            user_identity: message.identity.clone(),
            product_name: product.name,
            offer_descriptions: offers.into_iter().map(|o| o.description).collect(),
            payment_method_label: method.label,
            payment_details: method.details,
            screenshot_ref: Some(reference),
            field_values: BTreeMap::new(),
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        };
        let order = self.record_order(order).await?;
        Ok(finished(order))
    }

    async fn store_proof(
        &self,
        order_id: &OrderId,
        attachment: &crate::events::Attachment,
    ) -> Result<String, ConversationError> {
        let key = screenshot_key(order_id, attachment.mime_type.as_deref());
        Ok(self.blobs.put(&key, &attachment.bytes).await?)
    }

    /// Offers still present in the catalog, in selection order.
    async fn load_offers(&self, ids: &[OfferId]) -> Result<Vec<Offer>, ConversationError> {
        let mut offers = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(offer) = self.catalog.offer_by_id(*id).await? {
                offers.push(offer);
            }
        }
        Ok(offers)
    }

    /// Stores a new pending order. When an earlier attempt already stored it, the
    /// stored copy wins so retried input never rewrites what the operator sees.
    async fn record_order(&self, order: Order) -> Result<Order, ConversationError> {
        if self.orders.create(&order).await? {
            info!(
                event_name = "funnel.order_created",
                order_id = %order.id,
                identity = %order.user_identity,
                "pending order recorded"
            );
            return Ok(order);
        }
        debug!(order_id = %order.id, "order already recorded by an earlier attempt");
        self.orders
            .find_by_id(&order.id)
            .await?
            .ok_or_else(|| ConversationError::Internal(format!("order {} vanished", order.id)))
    }

    /// The order a session is still pointing at, if a previous pass stored it but
    /// failed before the session moved back to idle.
    async fn recorded_pending_order(
        &self,
        state: &FunnelState,
    ) -> Result<Option<Order>, ConversationError> {
        let Some(order_id) = state.pending_order_id() else {
            return Ok(None);
        };
        let stored = self.orders.find_by_id(order_id).await?;
        if stored.is_some() {
            debug!(order_id = %order_id, "finishing an order stored by an earlier attempt");
        }
        Ok(stored)
    }
}

/// Every finished order closes the session with the same pair of messages.
fn finished(order: Order) -> Transition {
    Transition::to(FunnelState::Idle, vec![messages::order_confirmation(&order)])
        .notify_operator(messages::operator_order_notice(&order))
}

/// The "oferta(s)" escape hatch. It never fires when idle, and a proof image
/// whose caption happens to mention offers is still accepted.
fn offers_trigger_applies(state: &FunnelState, message: &InboundMessage) -> bool {
    if state.is_idle() || !text::mentions_offers(&message.text) {
        return false;
    }
    !(matches!(state, FunnelState::AwaitingScreenshot { .. }) && message.attachment.is_some())
}
