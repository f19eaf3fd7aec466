// GET /api/status: worker pool occupancy and resource scope counters.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::web::AppState;

pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let scope = state.orchestrator.scope().stats();

    Json(serde_json::json!({
        "workers": {
            "capacity": state.capacity,
            "in_flight": state.in_flight(),
        },
        "batch_size": state.orchestrator.batch_size(),
        "resources": {
            "active_leases": scope.active_leases,
            "flushes": scope.flushes,
            "deferred": scope.deferred,
            "failures": scope.failures,
            "backlog": scope.backlog,
        }
    }))
}
