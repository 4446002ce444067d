use actix_middleware::AuthenticatedUser;
use actix_web::HttpResponse;
use serde_json::json;

/// GET /api/me
pub async fn current_user(user: AuthenticatedUser) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "id": user.0.uid }))
}
