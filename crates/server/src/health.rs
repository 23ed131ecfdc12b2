use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use recarga_chat::{ConnectionHandle, ConnectionState};
use recarga_db::DbPool;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    connection: Arc<ConnectionHandle>,
    qr_access_token: Option<SecretString>,
}

impl HealthState {
    pub fn new(
        db_pool: DbPool,
        connection: Arc<ConnectionHandle>,
        qr_access_token: Option<SecretString>,
    ) -> Self {
        Self { db_pool, connection, qr_access_token }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub transport: HealthCheck,
    pub checked_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PairingResponse {
    pub state: ConnectionState,
    pub pairing_code: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
}

#[derive(Debug, Default, Deserialize)]
pub struct QrQuery {
    token: Option<String>,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).route("/qr", get(qr)).with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: HealthState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

/// Only the database decides the status code; transport state is reported as-is.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let transport = transport_check(&state.connection).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "recarga-server runtime initialized".to_string(),
        },
        database,
        transport,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

pub async fn qr(
    State(state): State<HealthState>,
    Query(query): Query<QrQuery>,
) -> Result<Json<PairingResponse>, (StatusCode, Json<ErrorResponse>)> {
    if let Some(expected) = &state.qr_access_token {
        let presented = query.token.as_deref().unwrap_or_default();
        if presented != expected.expose_secret() {
            warn!(
                event_name = "system.health.qr_rejected",
                correlation_id = "http",
                token_present = query.token.is_some(),
                "pairing code request rejected"
            );
            return Err((StatusCode::UNAUTHORIZED, Json(ErrorResponse { error: "unauthorized" })));
        }
    }

    let snapshot = state.connection.snapshot().await;
    match snapshot.pairing_code {
        Some(pairing_code) => Ok(Json(PairingResponse {
            state: snapshot.state,
            pairing_code,
            updated_at: snapshot.updated_at.to_rfc3339(),
        })),
        None => Err((StatusCode::NOT_FOUND, Json(ErrorResponse { error: "no pairing code" }))),
    }
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn transport_check(connection: &ConnectionHandle) -> HealthCheck {
    let state = connection.state().await;
    let status = match state {
        ConnectionState::Connected => "ready",
        ConnectionState::AwaitingPairing | ConnectionState::Disconnected => "degraded",
    };
    HealthCheck { status, detail: format!("chat transport {}", state.as_str()) }
}
