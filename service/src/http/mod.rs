//! HTTP utilities and middleware.
//!
//! This module adapts the replay guard to the axum request pipeline and
//! provides the routes served by the binary.

pub mod nonce;

use std::sync::Arc;

use axum::{
    extract::Request,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

pub use nonce::{
    collect_params, nonce_middleware, rejection_response, ErrorResponse, RequestParams,
};

use crate::nonce::{NonceRequest, ReplayGuard};

/// Body returned by the guarded `/api` route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    pub action: Option<String>,
    pub live_nonces: usize,
}

/// Health check handler
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Report the action that got past the guard, read from the query string or
/// a form body.
pub async fn api_handler(
    Extension(guard): Extension<Arc<ReplayGuard>>,
    request: Request,
) -> Response {
    let params = match collect_params(request, &guard.settings().action_param).await {
        Ok((params, _)) => params,
        Err(response) => return response,
    };
    Json(ActionResponse {
        action: params.action().map(str::to_string),
        live_nonces: guard.live_tokens(),
    })
    .into_response()
}

/// Routes protected by [`nonce_middleware`]. Expects an
/// `Extension<Arc<ReplayGuard>>` layer from the caller.
pub fn guarded_routes() -> Router {
    Router::new()
        .route("/api", get(api_handler).post(api_handler))
        .route_layer(middleware::from_fn(nonce_middleware))
}

/// Full application router: `/health` unguarded, `/api` guarded.
pub fn router(guard: Arc<ReplayGuard>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(guarded_routes())
        .layer(Extension(guard))
}
