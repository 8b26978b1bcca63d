use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tagwatch_db::JsonFileSubscriptionRepository;
use tracing::{error, info};

use crate::watch::{CycleReport, CycleStatus};

#[derive(Clone)]
pub struct HealthState {
    store: Arc<JsonFileSubscriptionRepository>,
    cycles: CycleStatus,
}

impl HealthState {
    pub fn new(store: Arc<JsonFileSubscriptionRepository>, cycles: CycleStatus) -> Self {
        Self { store, cycles }
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
    pub storage: HealthCheck,
    pub last_cycle: Option<CycleReport>,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: HealthState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.health.error",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let storage = storage_check(&state.store).await;
    let ready = storage.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "tagwatch-server runtime initialized".to_string(),
        },
        storage,
        last_cycle: state.cycles.last().await,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn storage_check(store: &JsonFileSubscriptionRepository) -> HealthCheck {
    match store.verify().await {
        Ok(count) => HealthCheck {
            status: "ready",
            detail: format!("{count} subscriptions readable from {}", store.path().display()),
        },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("subscription store unreadable: {error}") }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{body::Body, extract::State, http::Request, http::StatusCode, Json};
    use tagwatch_db::JsonFileSubscriptionRepository;
    use tower::ServiceExt;

    use crate::health::{health, router, HealthState};
    use crate::watch::CycleStatus;

    fn state_for(path: std::path::PathBuf) -> HealthState {
        HealthState::new(Arc::new(JsonFileSubscriptionRepository::new(path)), CycleStatus::default())
    }

    #[tokio::test]
    async fn health_returns_ready_when_store_is_readable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (status, Json(payload)) =
            health(State(state_for(dir.path().join("tracked_repos.json")))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.storage.status, "ready");
        assert!(payload.last_cycle.is_none());
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_store_is_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tracked_repos.json");
        std::fs::write(&path, "{ not json").expect("write");

        let (status, Json(payload)) = health(State(state_for(path))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.storage.status, "degraded");
        assert_eq!(payload.service.status, "ready");
    }

    #[tokio::test]
    async fn router_serves_health_route() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = router(state_for(dir.path().join("tracked_repos.json")));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }
}
