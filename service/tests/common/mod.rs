//! Common test utilities for integration tests.
//!
//! This module provides:
//!
//! - [`app_builder::TestAppBuilder`] - Build test Axum apps that mirror main.rs wiring
//! - [`ParamRequest`] - Plain request descriptor for driving the guard directly
//!
//! # App Builder Usage
//!
//! ```ignore
//! use crate::common::app_builder::TestAppBuilder;
//!
//! #[tokio::test]
//! async fn test_with_app() {
//!     let app = TestAppBuilder::with_guard().build();
//!     // Use app.oneshot(...) to send requests
//! }
//! ```

#![allow(dead_code)]

pub mod app_builder;

use std::collections::HashMap;

use nonce_guard::nonce::NonceRequest;

/// Request descriptor backed by a parameter map.
#[derive(Debug, Clone, Default)]
pub struct ParamRequest {
    action: Option<String>,
    params: HashMap<String, String>,
}

impl ParamRequest {
    pub fn new(action: &str, nonce: &str) -> Self {
        Self::for_action(action).with_param("api_nonce", nonce)
    }

    pub fn for_action(action: &str) -> Self {
        Self {
            action: Some(action.to_string()),
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }
}

impl NonceRequest for ParamRequest {
    fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}
