/*!
 * # Authorization Module
 *
 * Sessions and credentials are handled by the host application. This module
 * only receives the already-authenticated user and decides which requisition
 * actions that user may take.
 */

use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod rbac;

pub use rbac::*;

/// User on whose behalf an action is performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn new(username: impl Into<String>, roles: &[&str]) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}
