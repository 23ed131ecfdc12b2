use chrono::{DateTime, Utc};
use sqlx::Row;

use recarga_core::domain::session::Session;
use recarga_core::flows::FunnelState;

use super::{RepositoryError, SessionRepository};
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session, RepositoryError> {
    let identity: String =
        row.try_get("identity").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let state_json: String =
        row.try_get("state_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let state: FunnelState = serde_json::from_str(&state_json)
        .map_err(|e| RepositoryError::Decode(format!("invalid session state for {identity}: {e}")))?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid updated_at: {e}")))?;

    Ok(Session { identity, state, updated_at })
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn get_or_create(&self, identity: &str) -> Result<Session, RepositoryError> {
        let idle = Session::new(identity);
        let state_json = serde_json::to_string(&idle.state)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let now = idle.updated_at.to_rfc3339();

        sqlx::query(
            "INSERT INTO client_session (identity, step, state_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(identity) DO NOTHING",
        )
        .bind(identity)
        .bind(idle.state.step().as_str())
        .bind(&state_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT identity, state_json, updated_at FROM client_session WHERE identity = ?",
        )
        .bind(identity)
        .fetch_one(&self.pool)
        .await?;

        row_to_session(&row)
    }

    async fn save(&self, session: &Session) -> Result<(), RepositoryError> {
        let state_json = serde_json::to_string(&session.state)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let now = session.updated_at.to_rfc3339();

        sqlx::query(
            "INSERT INTO client_session (identity, step, state_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(identity) DO UPDATE SET
                 step = excluded.step,
                 state_json = excluded.state_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&session.identity)
        .bind(session.state.step().as_str())
        .bind(&state_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
