use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::Row;

use recarga_core::domain::order::{Order, OrderId, OrderStatus};

use super::{CompletionOutcome, OrderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &sqlx::sqlite::SqliteRow,
    column: &str,
) -> Result<T, RepositoryError> {
    let raw: String = row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))?;
    serde_json::from_str(&raw).map_err(|e| RepositoryError::Decode(format!("invalid {column}: {e}")))
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_order(row: &sqlx::sqlite::SqliteRow) -> Result<Order, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let completed_at: Option<String> =
        row.try_get("completed_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Order {
        id: OrderId(id),
        user_identity: row
            .try_get("user_identity")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        product_name: row
            .try_get("product_name")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        offer_descriptions: json_column::<Vec<String>>(row, "offer_descriptions_json")?,
        payment_method_label: row
            .try_get("payment_method_label")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        payment_details: json_column::<BTreeMap<String, String>>(row, "payment_details_json")?,
        screenshot_ref: row
            .try_get("screenshot_ref")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        field_values: json_column::<BTreeMap<String, String>>(row, "field_values_json")?,
        status: OrderStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown order status `{status}`")))?,
        created_at: parse_timestamp(&created_at)?,
        completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn create(&self, order: &Order) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO recharge_order (id, user_identity, product_name, offer_descriptions_json,
                                         payment_method_label, payment_details_json,
                                         screenshot_ref, field_values_json, status,
                                         created_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&order.id.0)
        .bind(&order.user_identity)
        .bind(&order.product_name)
        .bind(encode_json(&order.offer_descriptions)?)
        .bind(&order.payment_method_label)
        .bind(encode_json(&order.payment_details)?)
        .bind(&order.screenshot_ref)
        .bind(encode_json(&order.field_values)?)
        .bind(order.status.as_str())
        .bind(order.created_at.to_rfc3339())
        .bind(order.completed_at.map(|at| at.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_identity, product_name, offer_descriptions_json,
                    payment_method_label, payment_details_json, screenshot_ref,
                    field_values_json, status, created_at, completed_at
             FROM recharge_order WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn complete(
        &self,
        id: &OrderId,
        at: DateTime<Utc>,
    ) -> Result<CompletionOutcome, RepositoryError> {
        let result = sqlx::query(
            "UPDATE recharge_order SET status = 'completed', completed_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(at.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        let flipped = result.rows_affected() == 1;
        match self.find_by_id(id).await? {
            Some(order) if flipped => Ok(CompletionOutcome::Completed(order)),
            Some(order) => Ok(CompletionOutcome::AlreadyCompleted(order)),
            None => Ok(CompletionOutcome::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use recarga_core::domain::order::{Order, OrderId, OrderStatus};

    use super::SqlOrderRepository;
    use crate::repositories::{CompletionOutcome, OrderRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlOrderRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlOrderRepository::new(pool)
    }

    fn sample_order(id: &str) -> Order {
        Order {
            id: OrderId(id.to_string()),
            user_identity: "5351111111".to_string(),
            product_name: "Game B".to_string(),
            offer_descriptions: vec!["X".to_string()],
            payment_method_label: "pending".to_string(),
            payment_details: BTreeMap::new(),
            screenshot_ref: None,
            field_values: BTreeMap::from([("player id".to_string(), "12345".to_string())]),
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn create_is_idempotent_on_order_id() {
        let repo = setup().await;
        let order = sample_order("ORD-A1");
        assert!(repo.create(&order).await.expect("first insert"));
        assert!(!repo.create(&order).await.expect("retry"));

        let found = repo.find_by_id(&order.id).await.expect("find").expect("exists");
        assert_eq!(found.field_values.get("player id").map(String::as_str), Some("12345"));
        assert_eq!(found.screenshot_ref, None);
        assert_eq!(found.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn completion_happens_exactly_once() {
        let repo = setup().await;
        let order = sample_order("ORD-A2");
        repo.create(&order).await.expect("insert");

        let first = repo.complete(&order.id, Utc::now()).await.expect("complete");
        let CompletionOutcome::Completed(completed) = first else {
            panic!("expected completion, got {first:?}");
        };
        assert_eq!(completed.status, OrderStatus::Completed);
        assert!(completed.completed_at.is_some());

        let second = repo.complete(&order.id, Utc::now()).await.expect("complete again");
        assert!(matches!(second, CompletionOutcome::AlreadyCompleted(_)));
    }

    #[tokio::test]
    async fn completing_unknown_order_reports_not_found() {
        let repo = setup().await;
        let outcome =
            repo.complete(&OrderId("ORD-NOPE".to_string()), Utc::now()).await.expect("complete");
        assert_eq!(outcome, CompletionOutcome::NotFound);
    }
}
