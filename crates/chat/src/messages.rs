//! Plain-text renderings of everything the bot says. Every outbound message is a
//! single text block; attachments only ever appear as references inside the text.

use recarga_core::domain::catalog::{
    CustomField, Offer, PaymentMethod, PaymentMethodType, Product, CARD_NUMBER_KEY,
    CONFIRM_NUMBER_KEY, PHONE_NUMBER_KEY,
};
use recarga_core::domain::dialog::{
    CardMethodStep, DialogKind, DialogState, EditMethodStep, EditOfferStep, MobileMethodStep,
};
use recarga_core::domain::order::Order;
use recarga_core::flows::dialog::{OFFER_ENTRY_TERMINATOR, PRODUCT_TABLE_TERMINATOR};
use recarga_core::text::render_menu_index;

/// Line-oriented text builder; sections are separated by a blank line.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    lines: Vec<String>,
}

impl MessageBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self { lines: vec![title.into()] }
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    pub fn lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines.extend(lines.into_iter().map(Into::into));
        self
    }

    pub fn blank(mut self) -> Self {
        self.lines.push(String::new());
        self
    }

    pub fn build(self) -> String {
        self.lines.join("\n")
    }
}

pub fn main_menu(products: &[Product]) -> String {
    if products.is_empty() {
        return empty_catalog_notice();
    }
    MessageBuilder::new("🎮 *Catálogo de recargas*")
        .blank()
        .lines(products.iter().map(|p| format!("{} {}", render_menu_index(p.menu_index), p.name)))
        .blank()
        .line("Responde con el número del juego. Escribe *cancelar* en cualquier momento para salir.")
        .build()
}

pub fn empty_catalog_notice() -> String {
    "⚠️ Por ahora no hay productos disponibles. Vuelve a escribirnos más tarde.".to_owned()
}

pub fn cancelled_notice() -> String {
    "❎ Operación cancelada.".to_owned()
}

pub fn product_unavailable_notice() -> String {
    "⚠️ El producto que elegiste ya no está disponible.".to_owned()
}

fn price_line(offer: &Offer) -> String {
    let mut line = format!(
        "{} {} · 📱 {} · 💳 {}",
        render_menu_index(offer.menu_index),
        offer.description,
        offer.price_mobile,
        offer.price_card
    );
    if let Some(usd) = offer.price_usd {
        line.push_str(&format!(" · 💵 {usd} USD"));
    }
    line
}

pub fn offer_menu(product: &Product, offers: &[Offer]) -> String {
    MessageBuilder::new(format!("🛒 *{}*", product.name))
        .blank()
        .lines(offers.iter().map(price_line))
        .blank()
        .line("Responde con el número de la oferta. Puedes elegir varias separadas por comas (ej: 1,3).")
        .line("Escribe *volver* para regresar al menú.")
        .build()
}

pub fn field_prompt(field_name: &str, position: usize, total: usize) -> String {
    format!("✍️ ({position}/{total}) Escribe tu *{field_name}*:")
}

pub fn payment_type_prompt() -> String {
    MessageBuilder::new("💰 ¿Cómo deseas pagar?")
        .blank()
        .line(format!("{} {}", render_menu_index(1), PaymentMethodType::Card.label()))
        .line(format!("{} {}", render_menu_index(2), PaymentMethodType::MobileBalance.label()))
        .build()
}

pub fn payment_method_menu(method_type: PaymentMethodType, methods: &[PaymentMethod]) -> String {
    MessageBuilder::new(format!("💳 Métodos disponibles ({}):", method_type.label()))
        .blank()
        .lines(methods.iter().map(|m| format!("{} {}", render_menu_index(m.menu_index), m.label)))
        .blank()
        .line("Responde con el número del método.")
        .build()
}

fn method_detail_lines(method: &PaymentMethod) -> Vec<String> {
    match method.method_type {
        PaymentMethodType::Card => vec![
            format!("Tarjeta: {}", method.detail(CARD_NUMBER_KEY).unwrap_or("-")),
            format!("Número a confirmar: {}", method.detail(CONFIRM_NUMBER_KEY).unwrap_or("-")),
        ],
        PaymentMethodType::MobileBalance => {
            vec![format!("Teléfono: {}", method.detail(PHONE_NUMBER_KEY).unwrap_or("-"))]
        }
    }
}

pub fn payment_instructions(method: &PaymentMethod, offers: &[Offer]) -> String {
    let total: i64 = offers
        .iter()
        .map(|o| match method.method_type {
            PaymentMethodType::Card => o.price_card,
            PaymentMethodType::MobileBalance => o.price_mobile,
        })
        .fold(0, i64::saturating_add);

    MessageBuilder::new(format!("🏦 *{}*", method.label))
        .lines(method_detail_lines(method))
        .line(format!("Total a pagar: {total}"))
        .blank()
        .line(screenshot_prompt())
        .build()
}

pub fn screenshot_prompt() -> String {
    "📷 Cuando hayas pagado, envía aquí la captura del comprobante.".to_owned()
}

pub fn order_confirmation(order: &Order) -> String {
    MessageBuilder::new("✅ ¡Pedido recibido!")
        .line(format!("Número de pedido: *{}*", order.id))
        .line("Te avisaremos en cuanto sea procesado.")
        .build()
}

/// Summary sent to the operator when a funnel pass finishes.
pub fn operator_order_notice(order: &Order) -> String {
    let mut builder = MessageBuilder::new("🆕 *Nuevo pedido*")
        .line(format!("Pedido: {}", order.id))
        .line(format!("Cliente: {}", order.user_identity))
        .line(format!("Producto: {}", order.product_name))
        .line(format!("Ofertas: {}", order.offer_descriptions.join(", ")))
        .line(format!("Método: {}", order.payment_method_label));

    for (name, value) in &order.field_values {
        builder = builder.line(format!("{name}: {value}"));
    }
    if let Some(reference) = &order.screenshot_ref {
        builder = builder.line(format!("Comprobante: {reference}"));
    }

    builder.blank().line(format!("Para completarlo: /completar {}", order.id)).build()
}

pub fn order_completed_notice(order: &Order) -> String {
    format!("🎉 Tu pedido {} ha sido completado. ¡Gracias por tu compra!", order.id)
}

pub fn operator_completed_ack(order: &Order) -> String {
    format!("✅ Pedido {} marcado como completado. Se notificó a {}.", order.id, order.user_identity)
}

pub fn product_listing(products: &[Product]) -> String {
    if products.is_empty() {
        return "📦 No hay juegos registrados.".to_owned();
    }
    MessageBuilder::new("📦 *Juegos*")
        .lines(products.iter().map(|p| format!("{} {}", p.menu_index, p.name)))
        .build()
}

pub fn offer_listing(product: &Product, offers: &[Offer]) -> String {
    if offers.is_empty() {
        return format!("📦 {} no tiene ofertas.", product.name);
    }
    MessageBuilder::new(format!("📦 *Ofertas de {}*", product.name))
        .lines(offers.iter().map(|o| {
            let usd = o.price_usd.map(|usd| format!(" {usd}")).unwrap_or_default();
            format!("{} {} {} {}{usd}", o.menu_index, o.description, o.price_mobile, o.price_card)
        }))
        .build()
}

pub fn method_listing(methods: &[PaymentMethod]) -> String {
    if methods.is_empty() {
        return "💳 No hay métodos de pago registrados.".to_owned();
    }
    let mut builder = MessageBuilder::new("💳 *Métodos de pago*");
    for method in methods {
        builder = builder
            .line(format!("[{}] {} {}", method.method_type.label(), method.menu_index, method.label))
            .lines(method_detail_lines(method).into_iter().map(|l| format!("    {l}")));
    }
    builder.build()
}

pub fn field_listing(product: &Product, fields: &[CustomField]) -> String {
    if fields.is_empty() {
        return format!("🧾 {} no tiene campos.", product.name);
    }
    MessageBuilder::new(format!("🧾 *Campos de {}*", product.name))
        .lines(fields.iter().map(|f| {
            let marker = if f.required { "" } else { " (opcional)" };
            format!("{}. {}{marker}", f.order, f.name)
        }))
        .build()
}

/// Result of a bulk creation: how many items landed and which ones failed.
pub fn batch_report(entity: &str, created: usize, failures: &[String]) -> String {
    let mut builder = MessageBuilder::new(format!("✅ {entity} creados: {created}"));
    if !failures.is_empty() {
        builder = builder
            .line(format!("❌ Fallidos: {}", failures.len()))
            .lines(failures.iter().map(|f| format!("  • {f}")));
    }
    builder.build()
}

pub fn rejected_lines(rejected: &[String]) -> String {
    MessageBuilder::new("❌ Líneas con formato incorrecto (no se guardaron):")
        .lines(rejected.iter().map(|l| format!("  • {l}")))
        .build()
}

pub fn lines_received(count: usize, terminator: &str) -> String {
    format!("📝 {count} línea(s) acumuladas. Envía más o {terminator} para terminar.")
}

pub fn dialog_cancelled() -> String {
    "❎ Diálogo cancelado.".to_owned()
}

pub fn no_active_dialog() -> String {
    "ℹ️ No hay ningún diálogo activo.".to_owned()
}

pub fn dialog_replaced(previous: DialogKind) -> String {
    format!("⚠️ Se descartó el diálogo anterior ({}).", previous.as_str())
}

pub fn dialog_blocked(active: DialogKind) -> String {
    format!(
        "⛔ Hay un diálogo en curso ({}). Termínalo o usa /cancelar antes de iniciar otro.",
        active.as_str()
    )
}

pub fn done(what: &str) -> String {
    format!("✅ {what}")
}

/// Prompt for the step a dialog is waiting on.
pub fn dialog_prompt(state: &DialogState) -> String {
    match state {
        DialogState::CreateCardMethod { step } => match step {
            CardMethodStep::Index => "💳 Nueva tarjeta. Índice del método:".to_owned(),
            CardMethodStep::Label { .. } => "Nombre visible del método:".to_owned(),
            CardMethodStep::CardNumber { .. } => "Número de tarjeta:".to_owned(),
            CardMethodStep::ConfirmNumber { .. } => "Número a confirmar:".to_owned(),
        },
        DialogState::CreateMobileMethod { step } => match step {
            MobileMethodStep::Index => "📱 Nuevo método de saldo. Índice del método:".to_owned(),
            MobileMethodStep::Label { .. } => "Nombre visible del método:".to_owned(),
            MobileMethodStep::PhoneNumber { .. } => "Número de teléfono:".to_owned(),
        },
        DialogState::BulkCreateProducts { .. } => {
            MessageBuilder::new("📋 Envía la tabla de juegos, una línea por juego:")
                .line("<índice> <nombre>")
                .line(format!("Escribe {PRODUCT_TABLE_TERMINATOR} para terminar."))
                .build()
        }
        DialogState::BulkAddOffers { .. } => {
            MessageBuilder::new("📋 Envía las ofertas, una por línea:")
                .line("<índice> <descripción> <precio saldo> <precio tarjeta> [<precio USD>]")
                .line(format!("Escribe {OFFER_ENTRY_TERMINATOR} para terminar."))
                .build()
        }
        DialogState::EditProductName { .. } => "✏️ Nuevo nombre del juego:".to_owned(),
        DialogState::EditOffer { step, .. } => match step {
            EditOfferStep::Description => "✏️ Nueva descripción de la oferta:".to_owned(),
            EditOfferStep::PriceMobile { .. } => "Nuevo precio en saldo:".to_owned(),
            EditOfferStep::PriceCard { .. } => "Nuevo precio con tarjeta:".to_owned(),
            EditOfferStep::PriceUsd { .. } => {
                "Nuevo precio en USD (0 o - para quitarlo):".to_owned()
            }
        },
        DialogState::EditPaymentMethod { step, .. } => match step {
            EditMethodStep::Label => "✏️ Nuevo nombre del método:".to_owned(),
            EditMethodStep::CardNumber { .. } => "Nuevo número de tarjeta:".to_owned(),
            EditMethodStep::ConfirmNumber { .. } => "Nuevo número a confirmar:".to_owned(),
            EditMethodStep::PhoneNumber { .. } => "Nuevo número de teléfono:".to_owned(),
        },
    }
}

pub fn help_message() -> String {
    MessageBuilder::new("🛠️ *Comandos disponibles*")
        .line("/crear tarjeta | saldo | tabla")
        .line("/añadir juego a <juego>")
        .line("/campos agregar <juego> <nombre>")
        .line("/campos quitar <juego> <nombre>")
        .line("/campos listar <juego>")
        .line("/editar juego <juego>")
        .line("/editar oferta <juego> <oferta>")
        .line("/editar tarjeta | saldo <método>")
        .line("/listar juegos | metodos")
        .line("/listar ofertas <juego>")
        .line("/borrar juego <juego>")
        .line("/borrar oferta <juego> <oferta>")
        .line("/borrar tarjeta | saldo <método>")
        .line("/completar <pedido>")
        .line("/cancelar")
        .build()
}

pub fn usage(usage: &str) -> String {
    format!("ℹ️ Uso: {usage}")
}
