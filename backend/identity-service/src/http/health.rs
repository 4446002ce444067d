use crate::http::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// GET /api/health
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    match state.store.ping().await {
        Ok(db_time) => HttpResponse::Ok().json(json!({ "ok": true, "dbTime": db_time })),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            HttpResponse::InternalServerError()
                .json(json!({ "ok": false, "error": "Database unavailable" }))
        }
    }
}
