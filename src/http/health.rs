//! Health listener: every method, every path answers `200 OK`.

use axum::{http::StatusCode, Router};

pub fn router() -> Router {
    Router::new().fallback(ok)
}

async fn ok() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
