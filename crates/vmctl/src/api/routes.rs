//! API routing (grounded on the teacher's `api::routes::create_router`).

use std::sync::Arc;

use axum::middleware as axum_middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::{handlers, middleware, ws};
use crate::coordinator::Coordinator;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::status,
        handlers::debug_command,
        handlers::hid_attach,
        handlers::hid_detach,
        handlers::hid_input,
        handlers::gpu_screenshot,
    ),
    components(schemas(
        handlers::HealthResponse,
        handlers::SuccessResponse,
        handlers::ErrorResponse,
        handlers::DebugCommandRequest,
        handlers::CollectionDto,
        handlers::HidAttachRequest,
        handlers::HidDetachRequest,
        handlers::HidInputReportRequest,
        crate::coordinator::VmStatus,
        crate::coordinator::GpuFrame,
    )),
    tags(
        (name = "health", description = "Liveness"),
        (name = "status", description = "Worker readiness and counters"),
        (name = "debug", description = "Debug CPU command forwarding"),
        (name = "hid", description = "HID device attach/detach and report forwarding"),
        (name = "gpu", description = "Scanout/cursor screenshot readback"),
    ),
    info(title = "aerovm coordinator", version = "0.1.0", description = "Operator status/control surface for the aerovm runtime")
)]
struct ApiDoc;

pub fn create_router(coordinator: Arc<Coordinator>) -> Router {
    let openapi = ApiDoc::openapi();

    Router::new()
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .route("/debug/command", post(handlers::debug_command))
        .route("/hid/attach", post(handlers::hid_attach))
        .route("/hid/detach", post(handlers::hid_detach))
        .route("/hid/input", post(handlers::hid_input))
        .route("/gpu/screenshot", get(handlers::gpu_screenshot))
        .route("/events", get(ws::events_handler))
        .with_state(coordinator)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(CorsLayer::permissive())
}
