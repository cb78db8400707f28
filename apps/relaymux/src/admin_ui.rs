//! Static admin UI assets are out of scope for this build (spec §1);
//! these routes exist only so the binary answers `/` and `/assets/*`
//! without 404ing, instead of embedding a frontend bundle that isn't part
//! of this repository.

use axum::extract::OriginalUri;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

pub async fn index() -> Response {
    (StatusCode::NOT_FOUND, "admin UI is not part of this build").into_response()
}

pub async fn asset(_uri: OriginalUri) -> Response {
    (StatusCode::NOT_FOUND, "admin UI is not part of this build").into_response()
}
