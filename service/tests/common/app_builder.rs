//! Test app builder that mirrors main.rs wiring with injectable guard settings.
//!
//! # Usage
//!
//! ```ignore
//! use crate::common::app_builder::TestAppBuilder;
//!
//! #[tokio::test]
//! async fn test_with_guard() {
//!     let (app, guard) = TestAppBuilder::with_guard()
//!         .token_length(8)
//!         .blacklist(&["health.check"])
//!         .build_with_guard();
//!
//!     // Use app.oneshot(...) to send requests, inspect guard afterwards
//! }
//! ```
//!
//! # Preset Builders
//!
//! - [`TestAppBuilder::minimal()`] - Health check only, guard wired but no guarded routes
//! - [`TestAppBuilder::with_guard()`] - Health check plus guarded `/api` and `/echo`

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    middleware,
    routing::{get, post},
    Extension, Router,
};
use nonce_guard::{
    http::{api_handler, health_check, nonce_middleware},
    nonce::{ActionFilter, GuardSettings, ReplayGuard},
};

/// Return the request body unchanged (checks the middleware restores it).
async fn echo_body(body: Bytes) -> Bytes {
    body
}

/// Builder for test applications that mirrors main.rs wiring.
pub struct TestAppBuilder {
    /// Settings of the guard shared by all routes
    settings: GuardSettings,
    /// Whether to include guarded `/api` and `/echo` routes
    include_guarded: bool,
    /// Whether to include health check route
    include_health: bool,
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAppBuilder {
    /// Create a new empty builder. No background sweeper is started.
    #[must_use]
    pub fn new() -> Self {
        Self {
            settings: GuardSettings {
                sweep_interval: None,
                ..GuardSettings::default()
            },
            include_guarded: false,
            include_health: false,
        }
    }

    // =========================================================================
    // Preset Builders
    // =========================================================================

    /// Create a minimal app with only the health check endpoint.
    #[must_use]
    pub fn minimal() -> Self {
        Self::new().with_health()
    }

    /// Create an app with the health check and guarded routes.
    #[must_use]
    pub fn with_guard() -> Self {
        Self::new().with_health().with_guarded_routes()
    }

    // =========================================================================
    // Component Configuration
    // =========================================================================

    /// Include health check route (/health).
    #[must_use]
    pub fn with_health(mut self) -> Self {
        self.include_health = true;
        self
    }

    /// Include guarded routes (/api, /echo).
    #[must_use]
    pub fn with_guarded_routes(mut self) -> Self {
        self.include_guarded = true;
        self
    }

    #[must_use]
    pub fn token_length(mut self, length: usize) -> Self {
        self.settings.token_length = length;
        self
    }

    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.settings.ttl = ttl;
        self
    }

    #[must_use]
    pub fn max_live_tokens(mut self, max: usize) -> Self {
        self.settings.max_live_tokens = max;
        self
    }

    /// Replace the policy with `["*"]` minus `actions`.
    #[must_use]
    pub fn blacklist(mut self, actions: &[&str]) -> Self {
        self.settings.filter = ActionFilter::from_patterns(&["*"], actions);
        self
    }

    /// Start the guard switched off.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.settings.enabled = false;
        self
    }

    // =========================================================================
    // Build
    // =========================================================================

    /// Build the Axum router.
    #[must_use]
    pub fn build(self) -> Router {
        self.build_with_guard().0
    }

    /// Build the Axum router and return the guard it shares.
    ///
    /// The layer ordering matches main.rs: guarded routes carry the nonce
    /// middleware as a route layer, the guard extension wraps everything.
    #[must_use]
    pub fn build_with_guard(self) -> (Router, Arc<ReplayGuard>) {
        let guard = Arc::new(ReplayGuard::new(self.settings));

        let mut app = Router::new();

        if self.include_guarded {
            let guarded = Router::new()
                .route("/api", get(api_handler).post(api_handler))
                .route("/echo", post(echo_body))
                .route_layer(middleware::from_fn(nonce_middleware));
            app = app.merge(guarded);
        }

        if self.include_health {
            app = app.route("/health", get(health_check));
        }

        (app.layer(Extension(Arc::clone(&guard))), guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_minimal_builder_creates_health_route() {
        let app = TestAppBuilder::minimal().build();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_minimal_builder_has_no_guarded_routes() {
        let app = TestAppBuilder::minimal().build();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api?api_action=do")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
