//! Request-id tagging for the operator HTTP surface (grounded on the
//! teacher's `api::middleware::request_id_middleware`; SPEC_FULL §10.6).

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// A request id, either echoed back from an inbound `X-Request-Id` header
/// or minted fresh, stashed in request extensions for downstream handlers.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

fn inbound_or_minted(request: &Request) -> String {
    request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Stamps every request with a [`RequestId`], folds it into a tracing span
/// around the handler, and echoes it back on the response so an operator
/// can correlate a client-side log line with the coordinator's own.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let id = inbound_or_minted(&request);
    request.extensions_mut().insert(RequestId(id.clone()));

    let span = tracing::info_span!("http_request", request_id = %id);
    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(HeaderName::from_static("x-request-id"), value);
    }
    response
}
