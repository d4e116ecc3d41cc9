use std::sync::Arc;
use std::time::Duration;

use axonbot_core::{BotSession, EntityKind};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

const INVENTORY_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct HealthState {
    session: Arc<BotSession>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub live_entries: usize,
    pub max_entries: usize,
    pub ttl_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub inventory: HealthCheck,
    pub cache: CacheStats,
    pub uptime_secs: u64,
    pub checked_at: String,
}

pub fn router(session: Arc<BotSession>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { session })
}

pub async fn spawn(bind_address: &str, port: u16, session: Arc<BotSession>) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(session)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                thread_id = "unknown",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let session = &state.session;
    let inventory = inventory_check(session).await;
    let ready = inventory.status == "ready";
    let cache = session.cache();

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck { status: "ready", detail: "axonbot runtime initialized".to_string() },
        inventory,
        cache: CacheStats {
            live_entries: cache.live_entries(),
            max_entries: cache.max_entries(),
            ttl_secs: cache.ttl().as_secs(),
        },
        uptime_secs: session.uptime().as_secs(),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn inventory_check(session: &BotSession) -> HealthCheck {
    let reachability = session.client().count(EntityKind::Device);
    match tokio::time::timeout(INVENTORY_CHECK_TIMEOUT, reachability).await {
        Ok(Ok(_)) => HealthCheck { status: "ready", detail: "inventory count succeeded".to_string() },
        Ok(Err(error)) => {
            HealthCheck { status: "degraded", detail: format!("inventory count failed: {error}") }
        }
        Err(_) => HealthCheck {
            status: "degraded",
            detail: format!("inventory count timed out after {}s", INVENTORY_CHECK_TIMEOUT.as_secs()),
        },
    }
}
