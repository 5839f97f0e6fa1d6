//! Liveness probe

use axum::http::StatusCode;

pub async fn live() -> StatusCode {
    tracing::debug!("Live check");
    StatusCode::OK
}
