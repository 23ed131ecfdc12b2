mod common;

use rust_decimal::Decimal;

use common::{joined, texts_for, Harness, OPERATOR, USER};
use recarga_core::config::DialogReplacementPolicy;
use recarga_core::domain::catalog::{PaymentMethodType, CARD_NUMBER_KEY};
use recarga_core::domain::dialog::DialogKind;
use recarga_core::domain::order::OrderStatus;
use recarga_db::{CatalogRepository, DialogRepository};

async fn active_kind(harness: &Harness) -> Option<DialogKind> {
    harness.dialogs.find(OPERATOR).await.expect("dialog lookup").map(|d| d.state.kind())
}

#[tokio::test]
async fn product_table_commits_good_lines_and_reports_bad_ones() {
    let harness = Harness::new();

    let replies = harness.operator("/crear tabla").await;
    assert!(joined(&replies, OPERATOR).contains("/listo"));
    assert_eq!(active_kind(&harness).await, Some(DialogKind::BulkCreateProducts));

    let replies = harness.operator("1 Free Fire\nsin indice\n3 PUBG Mobile").await;
    assert!(joined(&replies, OPERATOR).contains("3 línea(s)"));
    assert!(harness.catalog.list_products().await.expect("list").is_empty());

    let replies = harness.operator("/listo").await;
    let report = joined(&replies, OPERATOR);
    assert!(report.contains("creados: 2"), "{report}");
    assert!(report.contains("Fallidos: 1"), "{report}");
    assert!(report.contains("línea 2"), "{report}");

    let names = harness
        .catalog
        .list_products()
        .await
        .expect("list")
        .into_iter()
        .map(|p| (p.menu_index, p.name))
        .collect::<Vec<_>>();
    assert_eq!(names, vec![(1, "Free Fire".to_owned()), (3, "PUBG Mobile".to_owned())]);
    assert_eq!(active_kind(&harness).await, None);
}

#[tokio::test]
async fn product_table_reports_index_conflicts() {
    let harness = Harness::new();
    harness.product(1, "Free Fire").await;

    harness.operator("/crear tabla").await;
    let replies = harness.operator("1 Otro\n2 Nuevo\n/listo").await;
    let report = joined(&replies, OPERATOR);
    assert!(report.contains("creados: 1"), "{report}");
    assert!(report.contains("el índice 1 ya existe"), "{report}");
    assert_eq!(harness.catalog.list_products().await.expect("list").len(), 2);
}

#[tokio::test]
async fn offer_entry_rejects_malformed_lines_and_keeps_the_rest() {
    let harness = Harness::new();
    let product = harness.product(1, "Game A").await;

    harness.operator("/añadir juego a 1").await;
    assert_eq!(active_kind(&harness).await, Some(DialogKind::BulkAddOffers));

    let replies = harness.operator("1 100 diamantes 250 300\nbasura\n2 Pase 500 600 4.99").await;
    let text = joined(&replies, OPERATOR);
    assert!(text.contains("basura"), "{text}");
    assert!(text.contains("2 línea(s)"), "{text}");

    let replies = harness.operator("/fin").await;
    assert!(joined(&replies, OPERATOR).contains("creados: 2"));

    let offers = harness.catalog.list_offers(product.id).await.expect("offers");
    assert_eq!(offers.len(), 2);
    assert_eq!(offers[0].description, "100 diamantes");
    assert_eq!((offers[0].price_mobile, offers[0].price_card), (250, 300));
    assert_eq!(offers[0].price_usd, None);
    assert_eq!(offers[1].description, "Pase");
    assert_eq!(offers[1].price_usd, Some(Decimal::new(499, 2)));
}

#[tokio::test]
async fn add_offers_to_unknown_product_opens_nothing() {
    let harness = Harness::new();

    let replies = harness.operator("/añadir juego a 4").await;
    assert!(joined(&replies, OPERATOR).contains("No existe juego"));
    assert_eq!(active_kind(&harness).await, None);
}

#[tokio::test]
async fn card_method_dialog_creates_a_usable_method() {
    let harness = Harness::new();
    let product = harness.product(1, "Game A").await;
    harness.offer(&product, 1, "X", 100, 150).await;

    for input in ["/crear tarjeta", "1", "Banco Metro", "9200 1111", "5555"] {
        harness.operator(input).await;
    }
    assert_eq!(active_kind(&harness).await, None);

    let methods = harness
        .catalog
        .list_payment_methods(Some(PaymentMethodType::Card))
        .await
        .expect("methods");
    assert_eq!(methods.len(), 1);
    assert_eq!(methods[0].label, "Banco Metro");
    assert_eq!(methods[0].detail(CARD_NUMBER_KEY), Some("9200 1111"));

    for input in ["1", "1", "1"] {
        harness.user(input).await;
    }
    let replies = harness.user("1").await;
    assert!(joined(&replies, USER).contains("9200 1111"));
}

#[tokio::test]
async fn dialog_step_errors_reprompt_without_advancing() {
    let harness = Harness::new();
    harness.operator("/crear tarjeta").await;

    let replies = harness.operator("abc").await;
    let texts = texts_for(&replies, OPERATOR);
    assert_eq!(texts.len(), 2);
    assert!(texts[0].contains("inválida"));
    assert!(texts[1].contains("Índice"));

    let dialog = harness.dialogs.find(OPERATOR).await.expect("lookup").expect("still open");
    assert_eq!(dialog.state.step(), 0);
}

#[tokio::test]
async fn duplicate_method_index_closes_the_dialog_without_writing() {
    let harness = Harness::new();
    harness.card_method(1, "Banco Metro").await;

    let mut last = Vec::new();
    for input in ["/crear tarjeta", "1", "Otro banco", "1234", "99"] {
        last = harness.operator(input).await;
    }
    assert!(joined(&last, OPERATOR).contains("Ya existe"));
    assert_eq!(active_kind(&harness).await, None);
    let methods = harness.catalog.list_payment_methods(None).await.expect("methods");
    assert_eq!(methods.len(), 1);
}

#[tokio::test]
async fn cancel_mid_dialog_discards_everything() {
    let harness = Harness::new();
    harness.operator("/crear saldo").await;
    harness.operator("2").await;

    let replies = harness.operator("/cancelar").await;
    assert!(joined(&replies, OPERATOR).contains("cancelado"));
    assert_eq!(active_kind(&harness).await, None);
    assert!(harness.catalog.list_payment_methods(None).await.expect("methods").is_empty());

    let replies = harness.operator("/cancelar").await;
    assert!(joined(&replies, OPERATOR).contains("No hay ningún diálogo"));
}

#[tokio::test]
async fn offer_edit_rejects_bad_prices_then_applies() {
    let harness = Harness::new();
    let product = harness.seed_game_a().await;

    harness.operator("/editar oferta 1 1").await;
    harness.operator("X mejorada").await;
    let replies = harness.operator("caro").await;
    assert!(joined(&replies, OPERATOR).contains("Precio inválido"));
    assert_eq!(active_kind(&harness).await, Some(DialogKind::EditOffer));

    for input in ["120", "180"] {
        harness.operator(input).await;
    }
    let replies = harness.operator("-").await;
    assert!(joined(&replies, OPERATOR).contains("actualizada"));

    let offer = harness
        .catalog
        .offer_by_index(product.id, 1)
        .await
        .expect("lookup")
        .expect("offer kept");
    assert_eq!(offer.description, "X mejorada");
    assert_eq!((offer.price_mobile, offer.price_card, offer.price_usd), (120, 180, None));
}

#[tokio::test]
async fn rename_product_is_visible_to_users() {
    let harness = Harness::new();
    harness.seed_game_a().await;

    harness.operator("/editar juego 1").await;
    harness.operator("Game A+").await;

    let replies = harness.user("hola").await;
    assert!(joined(&replies, USER).contains("Game A+"));
}

#[tokio::test]
async fn incomplete_command_inside_a_dialog_answers_with_usage() {
    let harness = Harness::new();
    harness.seed_game_a().await;
    harness.operator("/editar juego 1").await;

    let replies = harness.operator("/editar juego").await;
    assert!(joined(&replies, OPERATOR).contains("Uso: /editar juego"));
    let product = harness.catalog.product_by_index(1).await.expect("lookup").expect("product");
    assert_eq!(product.name, "Game A");
    assert_eq!(active_kind(&harness).await, Some(DialogKind::EditProductName));

    harness.operator("Game A+").await;
    let product = harness.catalog.product_by_index(1).await.expect("lookup").expect("product");
    assert_eq!(product.name, "Game A+");
}

#[tokio::test]
async fn retried_terminator_after_failed_close_applies_once() {
    let harness = Harness::new();
    harness.operator("/crear tabla").await;
    harness.operator("1 Free Fire\n2 PUBG Mobile").await;

    harness.dialogs.fail_clears(true);
    harness.operator("/listo").await;
    assert!(harness.catalog.list_products().await.expect("list").is_empty());
    assert_eq!(active_kind(&harness).await, Some(DialogKind::BulkCreateProducts));
    harness.dialogs.fail_clears(false);

    let replies = harness.operator("/listo").await;
    let report = joined(&replies, OPERATOR);
    assert!(report.contains("creados: 2"), "{report}");
    assert!(!report.contains("ya existe"), "{report}");
    assert_eq!(harness.catalog.list_products().await.expect("list").len(), 2);
    assert_eq!(active_kind(&harness).await, None);
}

#[tokio::test]
async fn warn_policy_replaces_and_tells_the_operator() {
    let harness = Harness::with_policy(DialogReplacementPolicy::Warn);
    harness.operator("/crear tarjeta").await;

    let replies = harness.operator("/crear saldo").await;
    let texts = texts_for(&replies, OPERATOR);
    assert_eq!(texts.len(), 2);
    assert!(texts[0].contains("Se descartó"));
    assert_eq!(active_kind(&harness).await, Some(DialogKind::CreateMobileMethod));
}

#[tokio::test]
async fn block_policy_keeps_the_open_dialog() {
    let harness = Harness::with_policy(DialogReplacementPolicy::Block);
    harness.operator("/crear tarjeta").await;
    harness.operator("3").await;

    let replies = harness.operator("/crear tabla").await;
    assert!(joined(&replies, OPERATOR).contains("Hay un diálogo en curso"));
    let dialog = harness.dialogs.find(OPERATOR).await.expect("lookup").expect("still open");
    assert_eq!(dialog.state.kind(), DialogKind::CreateCardMethod);
    assert_eq!(dialog.state.step(), 1);
}

#[tokio::test]
async fn replace_policy_switches_silently() {
    let harness = Harness::new();
    harness.operator("/crear tarjeta").await;

    let replies = harness.operator("/crear tabla").await;
    assert_eq!(texts_for(&replies, OPERATOR).len(), 1);
    assert_eq!(active_kind(&harness).await, Some(DialogKind::BulkCreateProducts));
}

#[tokio::test]
async fn completing_an_order_notifies_the_user_once() {
    let harness = Harness::new();
    harness.seed_game_b().await;
    for input in ["2", "1", "12345"] {
        harness.user(input).await;
    }
    let order = harness.orders.all().await.pop().expect("order created");

    let replies = harness.operator(&format!("/completar {}", order.id.0.to_lowercase())).await;
    assert_eq!(texts_for(&replies, OPERATOR).len(), 1);
    let notices = texts_for(&replies, USER);
    assert_eq!(notices.len(), 1);
    assert!(notices[0].contains(&order.id.0));

    let stored = harness.orders.all().await.pop().expect("order kept");
    assert_eq!(stored.status, OrderStatus::Completed);
    assert!(stored.completed_at.is_some());

    let replies = harness.operator(&format!("/completar {}", order.id)).await;
    assert!(joined(&replies, OPERATOR).contains("ya estaba completado"));
    assert!(texts_for(&replies, USER).is_empty());
}

#[tokio::test]
async fn completing_an_unknown_order_reports_not_found() {
    let harness = Harness::new();

    let replies = harness.operator("/completar ORD-000000000000").await;
    assert!(joined(&replies, OPERATOR).contains("No existe pedido"));
}

#[tokio::test]
async fn delete_resolves_menu_indices() {
    let harness = Harness::new();
    harness.seed_game_a().await;

    let replies = harness.operator("/borrar juego 9").await;
    assert!(joined(&replies, OPERATOR).contains("No existe juego"));

    let replies = harness.operator("/borrar oferta 1 4").await;
    assert!(joined(&replies, OPERATOR).contains("No existe oferta"));

    let replies = harness.operator("/borrar juego 1").await;
    assert!(joined(&replies, OPERATOR).contains("eliminado"));
    assert!(harness.catalog.list_products().await.expect("list").is_empty());

    let replies = harness.operator("/borrar tarjeta 1").await;
    assert!(joined(&replies, OPERATOR).contains("Banco Metro"));
    assert!(harness.catalog.list_payment_methods(None).await.expect("methods").is_empty());
}

#[tokio::test]
async fn custom_fields_are_managed_by_name() {
    let harness = Harness::new();
    harness.seed_game_a().await;

    let replies = harness.operator("/campos agregar 1 player id").await;
    assert!(joined(&replies, OPERATOR).contains("player id"));

    let replies = harness.operator("/campos agregar 1 player id").await;
    assert!(joined(&replies, OPERATOR).contains("ya tiene un campo"));

    let replies = harness.operator("/campos listar 1").await;
    assert!(joined(&replies, OPERATOR).contains("player id"));

    harness.user("1").await;
    let replies = harness.user("1").await;
    assert!(joined(&replies, USER).contains("player id"));

    let replies = harness.operator("/campos quitar 1 player id").await;
    assert!(joined(&replies, OPERATOR).contains("eliminado"));
    let replies = harness.operator("/campos quitar 1 player id").await;
    assert!(joined(&replies, OPERATOR).contains("No existe campo"));
}

#[tokio::test]
async fn plain_operator_text_is_ignored() {
    let harness = Harness::new();
    harness.seed_game_a().await;

    assert!(harness.operator("hola").await.is_empty());
    assert!(harness.operator("1").await.is_empty());
}

#[tokio::test]
async fn unknown_commands_get_help_and_bad_arguments_get_usage() {
    let harness = Harness::new();

    let replies = harness.operator("/frobnicar").await;
    assert!(joined(&replies, OPERATOR).contains("/completar <pedido>"));

    let replies = harness.operator("/borrar juego").await;
    assert!(joined(&replies, OPERATOR).contains("Uso:"));
}
