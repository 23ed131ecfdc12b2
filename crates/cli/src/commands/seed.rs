use rust_decimal::Decimal;

use recarga_core::domain::catalog::{OfferDraft, PaymentMethodDraft, ProductDraft};
use recarga_db::repositories::SqlCatalogRepository;
use recarga_db::{connect_with_config, migrations, CatalogRepository, RepositoryError};

use crate::commands::{
    load_config, runtime, CommandResult, EXIT_DB_CONNECTIVITY, EXIT_MIGRATION, EXIT_SEED,
};

struct DemoOffer {
    menu_index: u32,
    description: &'static str,
    price_mobile: i64,
    price_card: i64,
    /// Cents.
    price_usd: Option<i64>,
}

struct DemoProduct {
    menu_index: u32,
    name: &'static str,
    offers: &'static [DemoOffer],
    fields: &'static [&'static str],
}

const DEMO_PRODUCTS: &[DemoProduct] = &[
    DemoProduct {
        menu_index: 1,
        name: "Free Fire",
        offers: &[
            DemoOffer {
                menu_index: 1,
                description: "100 diamantes",
                price_mobile: 250,
                price_card: 300,
                price_usd: Some(100),
            },
            DemoOffer {
                menu_index: 2,
                description: "310 diamantes",
                price_mobile: 700,
                price_card: 800,
                price_usd: Some(300),
            },
        ],
        fields: &[],
    },
    DemoProduct {
        menu_index: 2,
        name: "PUBG Mobile",
        offers: &[
            DemoOffer {
                menu_index: 1,
                description: "60 UC",
                price_mobile: 200,
                price_card: 240,
                price_usd: None,
            },
            DemoOffer {
                menu_index: 2,
                description: "325 UC",
                price_mobile: 900,
                price_card: 1000,
                price_usd: Some(500),
            },
        ],
        fields: &["player id"],
    },
];

/// Entries of the demo catalog, whether created now or found from an earlier run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub products: usize,
    pub offers: usize,
    pub payment_methods: usize,
    pub custom_fields: usize,
    pub created: usize,
}

impl SeedSummary {
    fn describe(&self) -> String {
        format!(
            "demo catalog ready: {} products, {} offers, {} payment methods, {} custom fields",
            self.products, self.offers, self.payment_methods, self.custom_fields
        )
    }
}

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DB_CONNECTIVITY))?;

        let outcome = async {
            migrations::run_pending(&pool)
                .await
                .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
            let catalog = SqlCatalogRepository::new(pool.clone());
            seed_catalog(&catalog)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), EXIT_SEED))
        }
        .await;

        pool.close().await;
        outcome
    });

    match result {
        Ok(summary) => CommandResult::success("seed", summary.describe()),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

/// Inserts whatever part of the demo catalog is missing. Existing entries at the
/// same menu index are left untouched, so running it twice changes nothing.
pub async fn seed_catalog(
    catalog: &dyn CatalogRepository,
) -> Result<SeedSummary, RepositoryError> {
    let mut summary = SeedSummary::default();

    for demo in DEMO_PRODUCTS {
        let product = match catalog.product_by_index(demo.menu_index).await? {
            Some(existing) => existing,
            None => {
                summary.created += 1;
                catalog
                    .create_product(ProductDraft {
                        menu_index: demo.menu_index,
                        name: demo.name.to_string(),
                        description: String::new(),
                    })
                    .await?
            }
        };
        summary.products += 1;

        for offer in demo.offers {
            if catalog.offer_by_index(product.id, offer.menu_index).await?.is_none() {
                catalog
                    .create_offer(
                        product.id,
                        OfferDraft {
                            menu_index: offer.menu_index,
                            description: offer.description.to_string(),
                            price_mobile: offer.price_mobile,
                            price_card: offer.price_card,
                            price_usd: offer.price_usd.map(|cents| Decimal::new(cents, 2)),
                        },
                    )
                    .await?;
                summary.created += 1;
            }
            summary.offers += 1;
        }

        let existing_fields = catalog.list_fields(product.id).await?;
        for name in demo.fields {
            if !existing_fields.iter().any(|field| field.name == *name) {
                catalog.create_field(product.id, name, true).await?;
                summary.created += 1;
            }
            summary.custom_fields += 1;
        }
    }

    for draft in [
        PaymentMethodDraft::card(1, "Tarjeta CUP", "9200 0000 0000 0000", "50000000"),
        PaymentMethodDraft::mobile(1, "Saldo móvil", "50000000"),
    ] {
        if catalog.payment_method_by_index(draft.method_type, draft.menu_index).await?.is_none() {
            catalog.create_payment_method(draft).await?;
            summary.created += 1;
        }
        summary.payment_methods += 1;
    }

    Ok(summary)
}
