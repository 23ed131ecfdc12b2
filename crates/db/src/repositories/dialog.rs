use chrono::{DateTime, Utc};
use sqlx::Row;

use recarga_core::domain::dialog::{DialogKind, DialogState, OperatorDialog};

use super::{DialogRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDialogRepository {
    pool: DbPool,
}

impl SqlDialogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_dialog(row: &sqlx::sqlite::SqliteRow) -> Result<OperatorDialog, RepositoryError> {
    let operator_identity: String =
        row.try_get("operator_identity").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let kind: String = row.try_get("kind").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let data_json: String =
        row.try_get("data_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let state: DialogState = serde_json::from_str(&data_json)
        .map_err(|e| RepositoryError::Decode(format!("invalid dialog data: {e}")))?;
    if DialogKind::parse(&kind) != Some(state.kind()) {
        return Err(RepositoryError::Decode(format!(
            "dialog kind column `{kind}` disagrees with data `{}`",
            state.kind().as_str()
        )));
    }
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid updated_at: {e}")))?;

    Ok(OperatorDialog { operator_identity, state, updated_at })
}

#[async_trait::async_trait]
impl DialogRepository for SqlDialogRepository {
    async fn find(
        &self,
        operator_identity: &str,
    ) -> Result<Option<OperatorDialog>, RepositoryError> {
        let row = sqlx::query(
            "SELECT operator_identity, kind, data_json, updated_at
             FROM operator_dialog WHERE operator_identity = ?",
        )
        .bind(operator_identity)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_dialog).transpose()
    }

    async fn save(&self, dialog: &OperatorDialog) -> Result<(), RepositoryError> {
        let data_json = serde_json::to_string(&dialog.state)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO operator_dialog (operator_identity, kind, step, data_json, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(operator_identity) DO UPDATE SET
                 kind = excluded.kind,
                 step = excluded.step,
                 data_json = excluded.data_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&dialog.operator_identity)
        .bind(dialog.state.kind().as_str())
        .bind(i64::from(dialog.state.step()))
        .bind(&data_json)
        .bind(dialog.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self, operator_identity: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM operator_dialog WHERE operator_identity = ?")
            .bind(operator_identity)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use recarga_core::domain::catalog::ProductId;
    use recarga_core::domain::dialog::{CardMethodStep, DialogState, OperatorDialog};

    use super::SqlDialogRepository;
    use crate::repositories::DialogRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlDialogRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlDialogRepository::new(pool)
    }

    fn dialog(state: DialogState) -> OperatorDialog {
        OperatorDialog { operator_identity: "admin".to_string(), state, updated_at: Utc::now() }
    }

    #[tokio::test]
    async fn one_dialog_per_operator_last_write_wins() {
        let repo = setup().await;
        repo.save(&dialog(DialogState::CreateCardMethod { step: CardMethodStep::Index }))
            .await
            .expect("save card");
        repo.save(&dialog(DialogState::BulkAddOffers {
            product_id: ProductId(4),
            offers: Vec::new(),
        }))
        .await
        .expect("save offers");

        let found = repo.find("admin").await.expect("find").expect("exists");
        assert_eq!(
            found.state,
            DialogState::BulkAddOffers { product_id: ProductId(4), offers: Vec::new() }
        );
    }

    #[tokio::test]
    async fn clear_removes_dialog() {
        let repo = setup().await;
        repo.save(&dialog(DialogState::EditProductName { product_id: ProductId(1) }))
            .await
            .expect("save");
        assert!(repo.clear("admin").await.expect("clear"));
        assert!(!repo.clear("admin").await.expect("clear twice"));
        assert!(repo.find("admin").await.expect("find").is_none());
    }
}
