use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use recarga_core::domain::catalog::{Offer, PaymentMethod, PaymentMethodType, Product};
use recarga_core::domain::dialog::{
    CardMethodStep, DialogState, EditMethodStep, EditOfferStep, MobileMethodStep,
};
use recarga_core::domain::order::OrderId;
use recarga_core::errors::ConversationError;
use recarga_core::text;
use recarga_db::{CatalogRepository, CompletionOutcome, OrderRepository};

use crate::events::Outbound;
use crate::messages;
use crate::stores::Stores;

pub const CANCEL_COMMAND: &str = "/cancelar";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateTarget {
    CardMethod,
    MobileMethod,
    ProductTable,
}

/// Catalog entity addressed by menu indices, as typed by the operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogTarget {
    Product { index: u32 },
    Offer { product_index: u32, offer_index: u32 },
    Method { method_type: PaymentMethodType, index: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldsCommand {
    Add { product_index: u32, name: String },
    Remove { product_index: u32, name: String },
    List { product_index: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListTarget {
    Products,
    Offers { product_index: u32 },
    Methods,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperatorCommand {
    Create(CreateTarget),
    AddOffers { product_index: u32 },
    Fields(FieldsCommand),
    Edit(CatalogTarget),
    List(ListTarget),
    Delete(CatalogTarget),
    Complete { order_id: String },
    Cancel,
    Help,
    /// Recognized verb with missing or unparsable arguments.
    Usage(&'static str),
    Unknown { input: String },
}

impl OperatorCommand {
    /// Commands that open a multi-step dialog.
    pub fn starts_dialog(&self) -> bool {
        matches!(self, Self::Create(_) | Self::AddOffers { .. } | Self::Edit(_))
    }
}

const USAGE_CREATE: &str = "/crear tarjeta | saldo | tabla";
const USAGE_ADD: &str = "/añadir juego a <juego>";
const USAGE_FIELDS: &str = "/campos agregar | quitar <juego> <nombre>, /campos listar <juego>";
const USAGE_EDIT: &str =
    "/editar juego <juego> | oferta <juego> <oferta> | tarjeta <n> | saldo <n>";
const USAGE_LIST: &str = "/listar juegos | ofertas <juego> | metodos";
const USAGE_DELETE: &str =
    "/borrar juego <juego> | oferta <juego> <oferta> | tarjeta <n> | saldo <n>";
const USAGE_COMPLETE: &str = "/completar <pedido>";

/// Parses operator input. `None` means the text is not a command at all.
pub fn parse_operator_command(input: &str) -> Option<OperatorCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut tokens = trimmed.split_whitespace();
    let verb = text::normalize(tokens.next().unwrap_or_default());
    let args = tokens.collect::<Vec<_>>();
    let sub = args.first().map(|s| text::normalize(s)).unwrap_or_default();

    Some(match verb.as_str() {
        "/crear" => match sub.as_str() {
            "tarjeta" => OperatorCommand::Create(CreateTarget::CardMethod),
            "saldo" => OperatorCommand::Create(CreateTarget::MobileMethod),
            "tabla" => OperatorCommand::Create(CreateTarget::ProductTable),
            _ => OperatorCommand::Usage(USAGE_CREATE),
        },
        "/anadir" => parse_add(&sub, &args),
        "/campos" => parse_fields(&sub, &args),
        "/editar" => parse_target(&sub, &args)
            .map_or(OperatorCommand::Usage(USAGE_EDIT), OperatorCommand::Edit),
        "/borrar" => parse_target(&sub, &args)
            .map_or(OperatorCommand::Usage(USAGE_DELETE), OperatorCommand::Delete),
        "/listar" => match sub.as_str() {
            "juegos" => OperatorCommand::List(ListTarget::Products),
            "metodos" => OperatorCommand::List(ListTarget::Methods),
            "ofertas" => match index_arg(&args, 1) {
                Some(product_index) => OperatorCommand::List(ListTarget::Offers { product_index }),
                None => OperatorCommand::Usage(USAGE_LIST),
            },
            _ => OperatorCommand::Usage(USAGE_LIST),
        },
        "/completar" => match args.first() {
            Some(order_id) => {
                OperatorCommand::Complete { order_id: order_id.trim().to_uppercase() }
            }
            None => OperatorCommand::Usage(USAGE_COMPLETE),
        },
        CANCEL_COMMAND => OperatorCommand::Cancel,
        "/ayuda" | "/help" => OperatorCommand::Help,
        _ => OperatorCommand::Unknown { input: trimmed.to_owned() },
    })
}

fn index_arg(args: &[&str], position: usize) -> Option<u32> {
    args.get(position).and_then(|token| {
        token.chars().all(|c| c.is_ascii_digit()).then(|| token.parse().ok()).flatten()
    })
}

fn parse_add(sub: &str, args: &[&str]) -> OperatorCommand {
    if sub != "juego" {
        return OperatorCommand::Usage(USAGE_ADD);
    }
    // "a" before the index is optional.
    let position = if args.get(1).is_some_and(|t| t.eq_ignore_ascii_case("a")) { 2 } else { 1 };
    match index_arg(args, position) {
        Some(product_index) => OperatorCommand::AddOffers { product_index },
        None => OperatorCommand::Usage(USAGE_ADD),
    }
}

fn parse_fields(sub: &str, args: &[&str]) -> OperatorCommand {
    let Some(product_index) = index_arg(args, 1) else {
        return OperatorCommand::Usage(USAGE_FIELDS);
    };
    let name = args.get(2..).map(|rest| rest.join(" ")).unwrap_or_default();
    match sub {
        "listar" => OperatorCommand::Fields(FieldsCommand::List { product_index }),
        "agregar" if !name.is_empty() => {
            OperatorCommand::Fields(FieldsCommand::Add { product_index, name })
        }
        "quitar" if !name.is_empty() => {
            OperatorCommand::Fields(FieldsCommand::Remove { product_index, name })
        }
        _ => OperatorCommand::Usage(USAGE_FIELDS),
    }
}

fn parse_target(sub: &str, args: &[&str]) -> Option<CatalogTarget> {
    match sub {
        "juego" => Some(CatalogTarget::Product { index: index_arg(args, 1)? }),
        "oferta" => Some(CatalogTarget::Offer {
            product_index: index_arg(args, 1)?,
            offer_index: index_arg(args, 2)?,
        }),
        "tarjeta" => Some(CatalogTarget::Method {
            method_type: PaymentMethodType::Card,
            index: index_arg(args, 1)?,
        }),
        "saldo" => Some(CatalogTarget::Method {
            method_type: PaymentMethodType::MobileBalance,
            index: index_arg(args, 1)?,
        }),
        _ => None,
    }
}

/// What a routed command asks of the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    Reply(Vec<Outbound>),
    StartDialog(DialogState),
}

/// Single-shot operator commands. Dialog bookkeeping stays with the caller; this
/// only resolves menu indices, mutates the catalog and completes orders.
pub struct CommandRouter {
    catalog: Arc<dyn CatalogRepository>,
    orders: Arc<dyn OrderRepository>,
}

impl CommandRouter {
    pub fn new(stores: &Stores) -> Self {
        Self { catalog: stores.catalog.clone(), orders: stores.orders.clone() }
    }

    pub async fn route(
        &self,
        operator: &str,
        command: OperatorCommand,
    ) -> Result<RouteOutcome, ConversationError> {
        let reply = |text: String| -> Result<RouteOutcome, ConversationError> {
            Ok(RouteOutcome::Reply(vec![Outbound::new(operator, text)]))
        };

        match command {
            OperatorCommand::Create(target) => Ok(RouteOutcome::StartDialog(match target {
                CreateTarget::CardMethod => {
                    DialogState::CreateCardMethod { step: CardMethodStep::Index }
                }
                CreateTarget::MobileMethod => {
                    DialogState::CreateMobileMethod { step: MobileMethodStep::Index }
                }
                CreateTarget::ProductTable => DialogState::BulkCreateProducts { lines: Vec::new() },
            })),
            OperatorCommand::AddOffers { product_index } => {
                let product = self.product(product_index).await?;
                Ok(RouteOutcome::StartDialog(DialogState::BulkAddOffers {
                    product_id: product.id,
                    offers: Vec::new(),
                }))
            }
            OperatorCommand::Edit(target) => self.start_edit(target).await,
            OperatorCommand::Fields(command) => reply(self.fields(command).await?),
            OperatorCommand::List(target) => reply(self.list(target).await?),
            OperatorCommand::Delete(target) => reply(self.delete(target).await?),
            OperatorCommand::Complete { order_id } => self.complete(operator, order_id).await,
            OperatorCommand::Cancel => reply(messages::no_active_dialog()),
            OperatorCommand::Usage(usage) => reply(messages::usage(usage)),
            OperatorCommand::Help | OperatorCommand::Unknown { .. } => {
                reply(messages::help_message())
            }
        }
    }

    async fn product(&self, index: u32) -> Result<Product, ConversationError> {
        self.catalog
            .product_by_index(index)
            .await?
            .ok_or_else(|| ConversationError::not_found("juego", index))
    }

    async fn offer(&self, product_index: u32, offer_index: u32) -> Result<Offer, ConversationError> {
        let product = self.product(product_index).await?;
        self.catalog
            .offer_by_index(product.id, offer_index)
            .await?
            .ok_or_else(|| {
                ConversationError::not_found("oferta", format!("{product_index}/{offer_index}"))
            })
    }

    async fn method(
        &self,
        method_type: PaymentMethodType,
        index: u32,
    ) -> Result<PaymentMethod, ConversationError> {
        self.catalog
            .payment_method_by_index(method_type, index)
            .await?
            .ok_or_else(|| ConversationError::not_found("método", index))
    }

    async fn start_edit(&self, target: CatalogTarget) -> Result<RouteOutcome, ConversationError> {
        let state = match target {
            CatalogTarget::Product { index } => {
                DialogState::EditProductName { product_id: self.product(index).await?.id }
            }
            CatalogTarget::Offer { product_index, offer_index } => DialogState::EditOffer {
                offer_id: self.offer(product_index, offer_index).await?.id,
                step: EditOfferStep::Description,
            },
            CatalogTarget::Method { method_type, index } => DialogState::EditPaymentMethod {
                method_id: self.method(method_type, index).await?.id,
                method_type,
                step: EditMethodStep::Label,
            },
        };
        Ok(RouteOutcome::StartDialog(state))
    }

    async fn fields(&self, command: FieldsCommand) -> Result<String, ConversationError> {
        match command {
            FieldsCommand::Add { product_index, name } => {
                let product = self.product(product_index).await?;
                let field = self.catalog.create_field(product.id, &name, true).await.map_err(
                    |error| match error {
                        recarga_db::RepositoryError::Conflict(_) => ConversationError::MalformedInput(
                            format!("{} ya tiene un campo llamado {name}.", product.name),
                        ),
                        other => other.into(),
                    },
                )?;
                Ok(messages::done(&format!(
                    "Campo \"{}\" agregado a {} en la posición {}.",
                    field.name, product.name, field.order
                )))
            }
            FieldsCommand::Remove { product_index, name } => {
                let product = self.product(product_index).await?;
                if !self.catalog.delete_field(product.id, &name).await? {
                    return Err(ConversationError::not_found("campo", name));
                }
                Ok(messages::done(&format!("Campo \"{name}\" eliminado de {}.", product.name)))
            }
            FieldsCommand::List { product_index } => {
                let product = self.product(product_index).await?;
                let fields = self.catalog.list_fields(product.id).await?;
                Ok(messages::field_listing(&product, &fields))
            }
        }
    }

    async fn list(&self, target: ListTarget) -> Result<String, ConversationError> {
        match target {
            ListTarget::Products => {
                Ok(messages::product_listing(&self.catalog.list_products().await?))
            }
            ListTarget::Offers { product_index } => {
                let product = self.product(product_index).await?;
                let offers = self.catalog.list_offers(product.id).await?;
                Ok(messages::offer_listing(&product, &offers))
            }
            ListTarget::Methods => {
                Ok(messages::method_listing(&self.catalog.list_payment_methods(None).await?))
            }
        }
    }

    async fn delete(&self, target: CatalogTarget) -> Result<String, ConversationError> {
        let summary = match target {
            CatalogTarget::Product { index } => {
                let product = self.product(index).await?;
                self.catalog.delete_product(product.id).await?;
                format!("Juego \"{}\" eliminado junto con sus ofertas.", product.name)
            }
            CatalogTarget::Offer { product_index, offer_index } => {
                let offer = self.offer(product_index, offer_index).await?;
                self.catalog.delete_offer(offer.id).await?;
                format!("Oferta \"{}\" eliminada.", offer.description)
            }
            CatalogTarget::Method { method_type, index } => {
                let method = self.method(method_type, index).await?;
                self.catalog.delete_payment_method(method.id).await?;
                format!("Método \"{}\" eliminado.", method.label)
            }
        };
        info!(event_name = "operator.catalog_deleted", entry = ?target, "catalog entry deleted");
        Ok(messages::done(&summary))
    }

    /// Flips the order to completed and tells its owner. A second completion is rejected.
    async fn complete(
        &self,
        operator: &str,
        order_id: String,
    ) -> Result<RouteOutcome, ConversationError> {
        let order_id = OrderId(order_id);
        match self.orders.complete(&order_id, Utc::now()).await? {
            CompletionOutcome::Completed(order) => {
                info!(
                    event_name = "operator.order_completed",
                    order_id = %order.id,
                    identity = %order.user_identity,
                    "order completed"
                );
                Ok(RouteOutcome::Reply(vec![
                    Outbound::new(operator, messages::operator_completed_ack(&order)),
                    Outbound::new(&order.user_identity, messages::order_completed_notice(&order)),
                ]))
            }
            CompletionOutcome::AlreadyCompleted(order) => {
                Err(ConversationError::AlreadyCompleted(order.id))
            }
            CompletionOutcome::NotFound => Err(ConversationError::not_found("pedido", order_id)),
        }
    }
}
