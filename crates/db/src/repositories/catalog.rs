use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::Row;

use recarga_core::domain::catalog::{
    CustomField, CustomFieldId, Offer, OfferDraft, OfferId, PaymentMethod, PaymentMethodDraft,
    PaymentMethodId, PaymentMethodType, Product, ProductDraft, ProductId,
};
use recarga_core::domain::dialog::OfferUpdate;

use super::{CatalogRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCatalogRepository {
    pool: DbPool,
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const PRODUCT_COLUMNS: &str = "id, menu_index, name, description";
const OFFER_COLUMNS: &str =
    "id, product_id, menu_index, description, price_mobile, price_card, price_usd";
const METHOD_COLUMNS: &str = "id, method_type, menu_index, label, details_json";
const FIELD_COLUMNS: &str = "id, product_id, name, field_order, required";

fn decode_err(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

fn menu_index(row: &sqlx::sqlite::SqliteRow) -> Result<u32, RepositoryError> {
    let raw: i64 = row.try_get("menu_index").map_err(decode_err)?;
    u32::try_from(raw).map_err(|_| RepositoryError::Decode(format!("menu_index out of range: {raw}")))
}

fn row_to_product(row: &sqlx::sqlite::SqliteRow) -> Result<Product, RepositoryError> {
    Ok(Product {
        id: ProductId(row.try_get("id").map_err(decode_err)?),
        menu_index: menu_index(row)?,
        name: row.try_get("name").map_err(decode_err)?,
        description: row.try_get("description").map_err(decode_err)?,
    })
}

fn row_to_offer(row: &sqlx::sqlite::SqliteRow) -> Result<Offer, RepositoryError> {
    let price_usd: Option<String> = row.try_get("price_usd").map_err(decode_err)?;
    let price_usd = price_usd
        .map(|raw| {
            Decimal::from_str(&raw)
                .map_err(|e| RepositoryError::Decode(format!("invalid price_usd `{raw}`: {e}")))
        })
        .transpose()?;

    Ok(Offer {
        id: OfferId(row.try_get("id").map_err(decode_err)?),
        product_id: ProductId(row.try_get("product_id").map_err(decode_err)?),
        menu_index: menu_index(row)?,
        description: row.try_get("description").map_err(decode_err)?,
        price_mobile: row.try_get("price_mobile").map_err(decode_err)?,
        price_card: row.try_get("price_card").map_err(decode_err)?,
        price_usd,
    })
}

fn row_to_method(row: &sqlx::sqlite::SqliteRow) -> Result<PaymentMethod, RepositoryError> {
    let method_type: String = row.try_get("method_type").map_err(decode_err)?;
    let method_type = PaymentMethodType::parse(&method_type).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown payment method type `{method_type}`"))
    })?;
    let details_json: String = row.try_get("details_json").map_err(decode_err)?;
    let details: BTreeMap<String, String> = serde_json::from_str(&details_json)
        .map_err(|e| RepositoryError::Decode(format!("invalid details_json: {e}")))?;

    Ok(PaymentMethod {
        id: PaymentMethodId(row.try_get("id").map_err(decode_err)?),
        method_type,
        menu_index: menu_index(row)?,
        label: row.try_get("label").map_err(decode_err)?,
        details,
    })
}

fn row_to_field(row: &sqlx::sqlite::SqliteRow) -> Result<CustomField, RepositoryError> {
    let order: i64 = row.try_get("field_order").map_err(decode_err)?;
    Ok(CustomField {
        id: CustomFieldId(row.try_get("id").map_err(decode_err)?),
        product_id: ProductId(row.try_get("product_id").map_err(decode_err)?),
        name: row.try_get("name").map_err(decode_err)?,
        order: u32::try_from(order)
            .map_err(|_| RepositoryError::Decode(format!("field_order out of range: {order}")))?,
        required: row.try_get("required").map_err(decode_err)?,
    })
}

fn encode_details(details: &BTreeMap<String, String>) -> Result<String, RepositoryError> {
    serde_json::to_string(details).map_err(|e| RepositoryError::Decode(e.to_string()))
}

#[async_trait::async_trait]
impl CatalogRepository for SqlCatalogRepository {
    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM product ORDER BY menu_index ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_product).collect()
    }

    async fn product_by_index(&self, menu_index: u32) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM product WHERE menu_index = ?"))
            .bind(i64::from(menu_index))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn product_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM product WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn create_product(&self, draft: ProductDraft) -> Result<Product, RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO product (menu_index, name, description, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(i64::from(draft.menu_index))
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            RepositoryError::from_write(e, || {
                format!("product index {} already exists", draft.menu_index)
            })
        })?;

        Ok(Product {
            id: ProductId(result.last_insert_rowid()),
            menu_index: draft.menu_index,
            name: draft.name,
            description: draft.description,
        })
    }

    async fn rename_product(&self, id: ProductId, name: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE product SET name = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(Utc::now().to_rfc3339())
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM product WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_offers(&self, product_id: ProductId) -> Result<Vec<Offer>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {OFFER_COLUMNS} FROM offer WHERE product_id = ? ORDER BY menu_index ASC"
        ))
        .bind(product_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_offer).collect()
    }

    async fn offer_by_index(
        &self,
        product_id: ProductId,
        menu_index: u32,
    ) -> Result<Option<Offer>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {OFFER_COLUMNS} FROM offer WHERE product_id = ? AND menu_index = ?"
        ))
        .bind(product_id.0)
        .bind(i64::from(menu_index))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_offer).transpose()
    }

    async fn offer_by_id(&self, id: OfferId) -> Result<Option<Offer>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {OFFER_COLUMNS} FROM offer WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_offer).transpose()
    }

    async fn create_offer(
        &self,
        product_id: ProductId,
        draft: OfferDraft,
    ) -> Result<Offer, RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO offer (product_id, menu_index, description, price_mobile, price_card,
                                price_usd, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(product_id.0)
        .bind(i64::from(draft.menu_index))
        .bind(&draft.description)
        .bind(draft.price_mobile)
        .bind(draft.price_card)
        .bind(draft.price_usd.map(|price| price.to_string()))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            RepositoryError::from_write(e, || {
                format!("offer index {} already exists for product {product_id}", draft.menu_index)
            })
        })?;

        Ok(Offer {
            id: OfferId(result.last_insert_rowid()),
            product_id,
            menu_index: draft.menu_index,
            description: draft.description,
            price_mobile: draft.price_mobile,
            price_card: draft.price_card,
            price_usd: draft.price_usd,
        })
    }

    async fn update_offer(
        &self,
        id: OfferId,
        update: &OfferUpdate,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE offer
             SET description = ?, price_mobile = ?, price_card = ?, price_usd = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&update.description)
        .bind(update.price_mobile)
        .bind(update.price_card)
        .bind(update.price_usd.map(|price| price.to_string()))
        .bind(Utc::now().to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_offer(&self, id: OfferId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM offer WHERE id = ?").bind(id.0).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_payment_methods(
        &self,
        method_type: Option<PaymentMethodType>,
    ) -> Result<Vec<PaymentMethod>, RepositoryError> {
        let rows = match method_type {
            Some(method_type) => {
                sqlx::query(&format!(
                    "SELECT {METHOD_COLUMNS} FROM payment_method
                     WHERE method_type = ? ORDER BY menu_index ASC"
                ))
                .bind(method_type.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {METHOD_COLUMNS} FROM payment_method
                     ORDER BY method_type ASC, menu_index ASC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(row_to_method).collect()
    }

    async fn payment_method_by_index(
        &self,
        method_type: PaymentMethodType,
        menu_index: u32,
    ) -> Result<Option<PaymentMethod>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {METHOD_COLUMNS} FROM payment_method WHERE method_type = ? AND menu_index = ?"
        ))
        .bind(method_type.as_str())
        .bind(i64::from(menu_index))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_method).transpose()
    }

    async fn payment_method_by_id(
        &self,
        id: PaymentMethodId,
    ) -> Result<Option<PaymentMethod>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {METHOD_COLUMNS} FROM payment_method WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_method).transpose()
    }

    async fn create_payment_method(
        &self,
        draft: PaymentMethodDraft,
    ) -> Result<PaymentMethod, RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO payment_method (method_type, menu_index, label, details_json,
                                         created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(draft.method_type.as_str())
        .bind(i64::from(draft.menu_index))
        .bind(&draft.label)
        .bind(encode_details(&draft.details)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            RepositoryError::from_write(e, || {
                format!(
                    "{} method index {} already exists",
                    draft.method_type.as_str(),
                    draft.menu_index
                )
            })
        })?;

        Ok(PaymentMethod {
            id: PaymentMethodId(result.last_insert_rowid()),
            method_type: draft.method_type,
            menu_index: draft.menu_index,
            label: draft.label,
            details: draft.details,
        })
    }

    async fn update_payment_method(
        &self,
        id: PaymentMethodId,
        label: &str,
        details: &BTreeMap<String, String>,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT details_json FROM payment_method WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(false);
        };

        let stored: String = row.try_get("details_json").map_err(decode_err)?;
        let mut merged: BTreeMap<String, String> = serde_json::from_str(&stored)
            .map_err(|e| RepositoryError::Decode(format!("invalid details_json: {e}")))?;
        merged.extend(details.iter().map(|(k, v)| (k.clone(), v.clone())));

        sqlx::query(
            "UPDATE payment_method SET label = ?, details_json = ?, updated_at = ? WHERE id = ?",
        )
        .bind(label)
        .bind(encode_details(&merged)?)
        .bind(Utc::now().to_rfc3339())
        .bind(id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn delete_payment_method(&self, id: PaymentMethodId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM payment_method WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_fields(&self, product_id: ProductId) -> Result<Vec<CustomField>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {FIELD_COLUMNS} FROM custom_field
             WHERE product_id = ? ORDER BY field_order ASC, id ASC"
        ))
        .bind(product_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_field).collect()
    }

    async fn create_field(
        &self,
        product_id: ProductId,
        name: &str,
        required: bool,
    ) -> Result<CustomField, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let next_order: i64 = sqlx::query(
            "SELECT COALESCE(MAX(field_order), -1) + 1 AS next_order
             FROM custom_field WHERE product_id = ?",
        )
        .bind(product_id.0)
        .fetch_one(&mut *tx)
        .await?
        .try_get("next_order")
        .map_err(decode_err)?;

        let result = sqlx::query(
            "INSERT INTO custom_field (product_id, name, field_order, required, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(product_id.0)
        .bind(name)
        .bind(next_order)
        .bind(required)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            RepositoryError::from_write(e, || {
                format!("field `{name}` already exists for product {product_id}")
            })
        })?;

        tx.commit().await?;

        Ok(CustomField {
            id: CustomFieldId(result.last_insert_rowid()),
            product_id,
            name: name.to_owned(),
            order: u32::try_from(next_order).unwrap_or(u32::MAX),
            required,
        })
    }

    async fn delete_field(
        &self,
        product_id: ProductId,
        name: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM custom_field WHERE product_id = ? AND name = ?")
            .bind(product_id.0)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
