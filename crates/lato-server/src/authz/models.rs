// ============================================
// File: crates/lato-server/src/authz/models.rs
// ============================================
//! Wire models of the management API permission check.

use serde::{Deserialize, Serialize};

/// Query parameters of `GET /checkPermission`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionQuery<'a> {
    /// User to check.
    pub user_id: &'a str,
    /// Resource to check.
    pub resource_id: &'a str,
}

/// Response body of `GET /checkPermission`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionResponse {
    /// Whether the user holds the permission.
    pub has_permission: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_field_name() {
        let resp: PermissionResponse = serde_json::from_str(r#"{"hasPermission":true}"#).unwrap();
        assert!(resp.has_permission);

        assert!(serde_json::from_str::<PermissionResponse>(r#"{"has_permission":true}"#).is_err());
    }
}
