use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use recarga_core::config::DialogReplacementPolicy;
use recarga_core::domain::catalog::ProductDraft;
use recarga_core::domain::dialog::{DialogKind, DialogState, OperatorDialog};
use recarga_core::errors::ConversationError;
use recarga_core::flows::dialog::{OFFER_ENTRY_TERMINATOR, PRODUCT_TABLE_TERMINATOR};
use recarga_core::flows::{advance_dialog, DialogAdvance, DialogCommit};
use recarga_core::text;
use recarga_db::{CatalogRepository, DialogRepository, RepositoryError};

use crate::commands::{parse_operator_command, CommandRouter, OperatorCommand, RouteOutcome};
use crate::events::{EventContext, InboundMessage, Outbound};
use crate::messages;
use crate::stores::Stores;

/// Everything the operator types: open dialogs first, then slash commands.
pub struct OperatorService {
    catalog: Arc<dyn CatalogRepository>,
    dialogs: Arc<dyn DialogRepository>,
    router: CommandRouter,
    replacement: DialogReplacementPolicy,
}

impl OperatorService {
    pub fn new(stores: &Stores, replacement: DialogReplacementPolicy) -> Self {
        Self {
            catalog: stores.catalog.clone(),
            dialogs: stores.dialogs.clone(),
            router: CommandRouter::new(stores),
            replacement,
        }
    }

    pub async fn handle(&self, message: &InboundMessage, ctx: &EventContext) -> Vec<Outbound> {
        match self.apply(message, ctx).await {
            Ok(replies) => replies,
            Err(error) => {
                if matches!(error, ConversationError::Internal(_)) {
                    warn!(
                        event_name = "operator.step_failed",
                        correlation_id = %ctx.correlation_id,
                        error = %error,
                        "operator step failed; dialog left unchanged"
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
        let operator = message.identity.as_str();
        let command = parse_operator_command(&message.text);

        let Some(active) = self.dialogs.find(operator).await? else {
            let Some(command) = command else {
                debug!(
                    correlation_id = %ctx.correlation_id,
                    "operator text outside a dialog ignored"
                );
                return Ok(Vec::new());
            };
            return self.route(operator, command, None, ctx).await;
        };

        match command {
            Some(OperatorCommand::Cancel) => {
                self.dialogs.clear(operator).await?;
                info!(
                    event_name = "operator.dialog_cancelled",
                    correlation_id = %ctx.correlation_id,
                    kind = active.state.kind().as_str(),
                    "operator dialog cancelled"
                );
                Ok(vec![Outbound::new(operator, messages::dialog_cancelled())])
            }
            Some(command) if command.starts_dialog() => {
                let active_kind = active.state.kind();
                if self.replacement == DialogReplacementPolicy::Block {
                    let notice = messages::dialog_blocked(active_kind);
                    return Ok(vec![Outbound::new(operator, notice)]);
                }
                self.route(operator, command, Some(active_kind), ctx).await
            }
            Some(OperatorCommand::Usage(usage)) => Ok(vec![
                Outbound::new(operator, messages::usage(usage)),
                Outbound::new(operator, messages::dialog_prompt(&active.state)),
            ]),
            _ => self.advance(active, &message.text, ctx).await,
        }
    }

    async fn route(
        &self,
        operator: &str,
        command: OperatorCommand,
        replacing: Option<DialogKind>,
        ctx: &EventContext,
    ) -> Result<Vec<Outbound>, ConversationError> {
        let state = match self.router.route(operator, command).await? {
            RouteOutcome::Reply(replies) => return Ok(replies),
            RouteOutcome::StartDialog(state) => state,
        };

        let dialog = OperatorDialog {
            operator_identity: operator.to_owned(),
            state,
            updated_at: Utc::now(),
        };
        self.dialogs.save(&dialog).await?;
        info!(
            event_name = "operator.dialog_started",
            correlation_id = %ctx.correlation_id,
            kind = dialog.state.kind().as_str(),
            replaced = replacing.map(|k| k.as_str()).unwrap_or("none"),
            "operator dialog started"
        );

        let mut replies = Vec::new();
        if let (Some(previous), DialogReplacementPolicy::Warn) = (replacing, self.replacement) {
            replies.push(Outbound::new(operator, messages::dialog_replaced(previous)));
        }
        replies.push(Outbound::new(operator, messages::dialog_prompt(&dialog.state)));
        Ok(replies)
    }

    async fn advance(
        &self,
        mut dialog: OperatorDialog,
        input: &str,
        ctx: &EventContext,
    ) -> Result<Vec<Outbound>, ConversationError> {
        let operator = dialog.operator_identity.clone();
        let reply = |text: String| Outbound::new(&operator, text);

        let advance = match advance_dialog(&dialog.state, input) {
            Ok(advance) => advance,
            Err(error @ ConversationError::Internal(_)) => return Err(error),
            Err(error) => {
                return Ok(vec![
                    reply(error.user_message()),
                    reply(messages::dialog_prompt(&dialog.state)),
                ]);
            }
        };

        match advance {
            DialogAdvance::Continue { state, rejected } => {
                dialog.state = state;
                dialog.updated_at = Utc::now();
                self.dialogs.save(&dialog).await?;

                let mut replies = Vec::new();
                if !rejected.is_empty() {
                    replies.push(reply(messages::rejected_lines(&rejected)));
                }
                replies.push(reply(continue_prompt(&dialog.state)));
                Ok(replies)
            }
            DialogAdvance::Commit(commit) => {
                let kind = dialog.state.kind();
                // Closed first: a retried terminator must never apply twice.
                self.dialogs.clear(&operator).await?;
                let summary = match self.commit(commit).await {
                    Ok(summary) => summary,
                    Err(error) => {
                        if let Err(restore) = self.dialogs.save(&dialog).await {
                            warn!(
                                event_name = "operator.dialog_restore_failed",
                                correlation_id = %ctx.correlation_id,
                                kind = kind.as_str(),
                                error = %restore,
                                "operator dialog lost after a failed commit"
                            );
                        }
                        return Err(error);
                    }
                };
                info!(
                    event_name = "operator.dialog_committed",
                    correlation_id = %ctx.correlation_id,
                    kind = kind.as_str(),
                    "operator dialog committed"
                );
                Ok(vec![reply(summary)])
            }
        }
    }

    /// Applies a finished dialog. Store failures propagate and keep the dialog open;
    /// conflicts and vanished targets are reported and close it.
    async fn commit(&self, commit: DialogCommit) -> Result<String, ConversationError> {
        match commit {
            DialogCommit::CreatePaymentMethod(draft) => {
                match self.catalog.create_payment_method(draft.clone()).await {
                    Ok(method) => Ok(messages::done(&format!(
                        "Método \"{}\" ({}) creado con índice {}.",
                        method.label,
                        method.method_type.label(),
                        method.menu_index
                    ))),
                    Err(RepositoryError::Conflict(_)) => Ok(format!(
                        "❌ Ya existe un método de {} con índice {}. No se guardó nada.",
                        draft.method_type.label(),
                        draft.menu_index
                    )),
                    Err(error) => Err(error.into()),
                }
            }
            DialogCommit::CreateProducts { lines } => Ok(self.create_products(&lines).await),
            DialogCommit::CreateOffers { product_id, offers, rejected } => {
                let mut failures = rejected
                    .iter()
                    .map(|line| format!("\"{line}\": formato incorrecto"))
                    .collect::<Vec<_>>();
                let mut created = 0;
                for draft in offers {
                    let menu_index = draft.menu_index;
                    match self.catalog.create_offer(product_id, draft).await {
                        Ok(_) => created += 1,
                        Err(RepositoryError::Conflict(_)) => {
                            failures.push(format!("oferta {menu_index}: el índice ya existe"));
                        }
                        Err(error) => {
                            warn!(menu_index, error = %error, "offer creation failed");
                            failures.push(format!("oferta {menu_index}: no se pudo guardar"));
                        }
                    }
                }
                Ok(messages::batch_report("Ofertas", created, &failures))
            }
            DialogCommit::RenameProduct { product_id, name } => {
                let renamed = self.catalog.rename_product(product_id, &name).await?;
                Ok(outcome(renamed, &format!("Juego renombrado a \"{name}\"."), "El juego"))
            }
            DialogCommit::UpdateOffer { offer_id, update } => {
                let updated = self.catalog.update_offer(offer_id, &update).await?;
                let success = format!("Oferta \"{}\" actualizada.", update.description);
                Ok(outcome(updated, &success, "La oferta"))
            }
            DialogCommit::UpdatePaymentMethod { method_id, label, details } => {
                let updated =
                    self.catalog.update_payment_method(method_id, &label, &details).await?;
                Ok(outcome(updated, &format!("Método \"{label}\" actualizado."), "El método"))
            }
        }
    }

    /// Each line is attempted on its own; one bad line never stops the rest.
    async fn create_products(&self, lines: &[String]) -> String {
        let mut created = 0;
        let mut failures = Vec::new();
        for (position, line) in lines.iter().enumerate() {
            let number = position + 1;
            let Some((menu_index, name)) = text::parse_product_line(line) else {
                failures.push(format!("línea {number} \"{line}\": se esperaba <índice> <nombre>"));
                continue;
            };
            let draft = ProductDraft { menu_index, name, description: String::new() };
            match self.catalog.create_product(draft).await {
                Ok(_) => created += 1,
                Err(RepositoryError::Conflict(_)) => {
                    failures.push(format!("línea {number}: el índice {menu_index} ya existe"));
                }
                Err(error) => {
                    warn!(line = number, error = %error, "product creation failed");
                    failures.push(format!("línea {number}: no se pudo guardar"));
                }
            }
        }
        messages::batch_report("Juegos", created, &failures)
    }
}

fn outcome(applied: bool, success: &str, subject: &str) -> String {
    if applied {
        messages::done(success)
    } else {
        format!("⚠️ {subject} ya no existe; no se aplicaron cambios.")
    }
}

/// Bulk dialogs acknowledge progress; fixed-step dialogs ask the next question.
fn continue_prompt(state: &DialogState) -> String {
    match state {
        DialogState::BulkCreateProducts { lines } => {
            messages::lines_received(lines.len(), PRODUCT_TABLE_TERMINATOR)
        }
        DialogState::BulkAddOffers { offers, .. } => {
            messages::lines_received(offers.len(), OFFER_ENTRY_TERMINATOR)
        }
        other => messages::dialog_prompt(other),
    }
}
