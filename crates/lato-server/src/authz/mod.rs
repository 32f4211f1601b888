// ============================================
// File: crates/lato-server/src/authz/mod.rs
// ============================================
//! # Authorization Collaborator
//!
//! ## Creation Reason
//! The tunnel server asks an external management API whether a user may use
//! a resource. The API and its store live elsewhere; this module is only
//! the client side of that one question.
//!
//! ## Main Functionality
//! - `Authorizer`: `check_permission(user_id, resource_id) -> bool`
//! - `AllowAll`: used when no management API is configured
//! - `HttpAuthorizer`: queries `GET {api_url}/checkPermission`
//! - `from_config`: picks the implementation from `[authorization]`
//!
//! ## ⚠️ Important Note for Next Developer
//! - `HttpAuthorizer` treats every transport or decode failure as a denial
//! - Admission checks only run when `authorization.tunnel_resource` is set
//!
//! ## Last Modified
//! v0.1.0 - Authorization client

pub mod client;
pub mod models;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::AuthorizationConfig;
use crate::error::Result;

pub use client::HttpAuthorizer;

/// Answers whether a user may access a resource.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Returns `Ok(true)` if `user_id` may access `resource_id`.
    async fn check_permission(&self, user_id: &str, resource_id: &str) -> Result<bool>;
}

/// Grants everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn check_permission(&self, _user_id: &str, _resource_id: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Builds the authorizer described by `config`.
///
/// # Errors
/// Returns `Authorization` if the HTTP client cannot be constructed.
pub fn from_config(config: &AuthorizationConfig) -> Result<Arc<dyn Authorizer>> {
    if config.has_api() {
        info!(api_url = %config.api_url, "Using management API for authorization");
        Ok(Arc::new(HttpAuthorizer::new(config)?))
    } else {
        Ok(Arc::new(AllowAll))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allow_all() {
        assert!(AllowAll.check_permission("anyone", "anything").await.unwrap());
    }

    #[tokio::test]
    async fn test_default_config_allows() {
        let authorizer = from_config(&AuthorizationConfig::default()).unwrap();
        assert!(authorizer.check_permission("u", "r").await.unwrap());
    }
}
