use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{Value, json};

use crate::infra::app_state::AppState;

/// Liveness plus registry counts.
pub async fn health_handler(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let mut health_status = json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "startedAt": state.started_at.to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "checks": {}
    });

    match state.hub.inspect().await {
        Ok(snapshot) => {
            health_status["checks"]["hub"] = json!({
                "status": "healthy",
                "subscriptions": snapshot.subscriptions.len(),
                "subscribers": snapshot
                    .subscriptions
                    .iter()
                    .map(|subscription| subscription.sessions.len())
                    .sum::<usize>(),
                "activeRuns": snapshot.active_runs.len(),
            });
            Ok(Json(health_status))
        }
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
