pub mod dto;
pub mod errors;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use handlers::ApiDoc;

use crate::state::AppState;
use crate::ws::ws_handler;

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/logs", get(handlers::get_logs))
        .route("/logs/{id}/acknowledge", post(handlers::acknowledge_log))
        .route("/logs/{id}/delete", post(handlers::delete_log))
        .route("/health", get(handlers::health))
        .route("/ws/dashboard", get(ws_handler))
        .with_state(state)
        .split_for_parts();

    router.route(
        "/api-docs/openapi.json",
        get(move || async move { axum::Json(api) }),
    )
}
