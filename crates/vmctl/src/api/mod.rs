//! Operator-facing HTTP/WebSocket status and control surface (SPEC_FULL
//! §10.6). Not part of the guest-facing wire protocol in spec §6 — purely
//! an operational convenience the `axum`/`utoipa` stack already in the
//! dependency set exists to provide.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod ws;

pub use routes::create_router;
