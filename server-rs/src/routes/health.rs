use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::models::Member;
use crate::services::members::MEMBERS;
use crate::store;
use crate::AppState;

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let store_ok = match store::load_typed::<Member>(state.store.as_ref(), MEMBERS).await {
        Ok(_) => true,
        Err(e) => {
            tracing::error!("Health check could not read members: {e}");
            false
        }
    };

    let (code, status) = if store_ok {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (
        code,
        Json(json!({
            "status": status,
            "store": store_ok,
            "timestamp": chrono::Utc::now(),
        })),
    )
}
