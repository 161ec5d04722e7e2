//! Replay guard middleware for HTTP requests.
//!
//! The action name and the nonce are ordinary request parameters. They are
//! read from the query string and, for `application/x-www-form-urlencoded`
//! requests, from the body. A form body is buffered and handed on unchanged
//! to the next handler.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, Request},
    http::{
        header::{ACCEPT_LANGUAGE, CONTENT_TYPE},
        StatusCode, Uri,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::nonce::{Decision, Lang, NonceRejection, NonceRequest, ReplayGuard};

/// Maximum form body buffered while looking for the nonce.
pub const MAX_FORM_BODY_BYTES: usize = 1024 * 1024;

/// Request parameter selecting the language of rejection messages.
pub const LANG_PARAM: &str = "api_lang";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Decoded request parameters, keyed by name.
pub type ParamMap = HashMap<String, String>;

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub error: String,
}

/// Parameters of one HTTP request as seen by the guard.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    params: ParamMap,
    action_param: String,
    accept_language: Option<String>,
}

impl RequestParams {
    #[must_use]
    pub fn new(action_param: impl Into<String>) -> Self {
        Self {
            params: HashMap::new(),
            action_param: action_param.into(),
            accept_language: None,
        }
    }

    /// Merge decoded parameters. Values already present are replaced.
    pub fn extend(&mut self, params: ParamMap) {
        self.params.extend(params);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Language for messages: explicit `api_lang` first, then `Accept-Language`.
    #[must_use]
    pub fn lang(&self) -> Lang {
        self.get(LANG_PARAM)
            .or(self.accept_language.as_deref())
            .map_or_else(Lang::default, Lang::from_tag)
    }
}

impl NonceRequest for RequestParams {
    fn action(&self) -> Option<&str> {
        self.get(&self.action_param)
    }

    fn param(&self, name: &str) -> Option<&str> {
        self.get(name)
    }
}

/// Decode the query string of `uri`. A URI without a query has no parameters.
///
/// # Errors
/// Returns the rejection produced by axum's [`Query`] extractor.
pub fn query_params(uri: &Uri) -> Result<ParamMap, axum::extract::rejection::QueryRejection> {
    Query::<ParamMap>::try_from_uri(uri).map(|Query(params)| params)
}

/// Decode an `application/x-www-form-urlencoded` body.
///
/// # Errors
/// Returns an error if the body is not a flat list of key/value pairs.
pub fn form_params(body: &[u8]) -> Result<ParamMap, serde_urlencoded::de::Error> {
    serde_urlencoded::from_bytes(body)
}

/// HTTP status used for each rejection.
#[must_use]
pub const fn rejection_status(reason: NonceRejection) -> StatusCode {
    match reason {
        NonceRejection::MissingNonce | NonceRejection::InvalidNonce => StatusCode::BAD_REQUEST,
        NonceRejection::NonceExist => StatusCode::CONFLICT,
        NonceRejection::NonceCountExceed => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Render a rejection as a JSON error response.
#[must_use]
pub fn rejection_response(reason: NonceRejection, lang: Lang) -> Response {
    (
        rejection_status(reason),
        Json(ErrorResponse {
            code: reason.code().to_string(),
            error: reason.message(lang).to_string(),
        }),
    )
        .into_response()
}

fn bad_request(msg: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            code: "InvalidRequest".to_string(),
            error: msg.to_string(),
        }),
    )
        .into_response()
}

/// Whether the request declares a form body. The media type is matched
/// case-insensitively and parameters after `;` are ignored.
fn is_form(request: &Request) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| {
            let essence = v.split_once(';').map_or(v, |(media_type, _)| media_type);
            essence.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE)
        })
}

/// Gather query and form parameters. Form values replace query values of the
/// same name. The request is handed back with its body intact; a form body is
/// buffered (up to [`MAX_FORM_BODY_BYTES`]) and restored.
///
/// # Errors
/// Returns a 400 `InvalidRequest` response if the query or the form body
/// cannot be read or decoded.
pub async fn collect_params(
    request: Request,
    action_param: &str,
) -> Result<(RequestParams, Request), Response> {
    let mut params = RequestParams::new(action_param);
    params.extend(
        query_params(request.uri()).map_err(|_| bad_request("Invalid query string"))?,
    );
    params.accept_language = request
        .headers()
        .get(ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if !is_form(&request) {
        return Ok((params, request));
    }

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_FORM_BODY_BYTES)
        .await
        .map_err(|_| bad_request("Failed to read request body"))?;
    params.extend(form_params(&bytes).map_err(|_| bad_request("Invalid form body"))?);

    Ok((params, Request::from_parts(parts, Body::from(bytes))))
}

/// Middleware rejecting replayed requests.
///
/// Reads the shared [`ReplayGuard`] from an `Extension`; a disabled guard
/// forwards without touching the body.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use axum::{middleware, Extension, Router};
/// use nonce_guard::http::nonce_middleware;
/// use nonce_guard::nonce::{GuardSettings, ReplayGuard};
///
/// let guard = Arc::new(ReplayGuard::new(GuardSettings::default()));
///
/// let app = Router::new()
///     // ... routes ...
///     .layer(middleware::from_fn(nonce_middleware))
///     .layer(Extension(guard));
/// ```
pub async fn nonce_middleware(
    Extension(guard): Extension<Arc<ReplayGuard>>,
    request: Request,
    next: Next,
) -> Response {
    if !guard.is_enabled() {
        return next.run(request).await;
    }

    let (params, request) = match collect_params(request, &guard.settings().action_param).await {
        Ok(collected) => collected,
        Err(response) => return response,
    };

    match guard.evaluate(&params) {
        Decision::Rejected(reason) => rejection_response(reason, params.lang()),
        Decision::Bypassed | Decision::FilteredOut | Decision::Accepted => {
            next.run(request).await
        }
    }
}
