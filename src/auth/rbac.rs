/*!
 * # Role-Based Access Control (RBAC) Module
 *
 * Roles of the requisition workflow and their permissions. Unlocking a
 * requisition is reserved to administrators and is only reachable through an
 * [`UnlockGrant`], which this module alone can mint.
 */

use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};
use tracing::warn;

use super::AuthUser;
use crate::errors::ServiceError;

/// Common permission string constants for compile-time safety
pub mod consts {
    pub const REQUISITIONS_READ: &str = "requisitions:read";
    pub const REQUISITIONS_CREATE: &str = "requisitions:create";
    pub const REQUISITIONS_EVALUATE: &str = "requisitions:evaluate";
    pub const REQUISITIONS_UNLOCK: &str = "requisitions:unlock";
    pub const INVENTORY_READ: &str = "inventory:read";
    pub const BUDGET_READ: &str = "budget:read";
}

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_WAREHOUSE: &str = "warehouse";
pub const ROLE_REQUESTER: &str = "requester";

/// Role definition with associated permissions
#[derive(Debug, Clone)]
pub struct Role {
    pub name: String,
    pub description: String,
    pub permissions: Vec<String>,
}

// Define standard roles and their permissions
lazy_static! {
    pub static ref ROLES: HashMap<String, Role> = {
        let mut roles = HashMap::new();

        // Admin role - has all permissions
        roles.insert(
            ROLE_ADMIN.to_string(),
            Role {
                name: ROLE_ADMIN.to_string(),
                description: "Administrator with full access, including unlocking requisitions".to_string(),
                permissions: vec![
                    "requisitions:*".to_string(),
                    "inventory:*".to_string(),
                    "budget:*".to_string(),
                ],
            },
        );

        // Warehouse staff evaluate submitted requisitions against stock
        roles.insert(
            ROLE_WAREHOUSE.to_string(),
            Role {
                name: ROLE_WAREHOUSE.to_string(),
                description: "Warehouse staff reconciling requisitions against inventory".to_string(),
                permissions: vec![
                    consts::REQUISITIONS_READ.to_string(),
                    consts::REQUISITIONS_EVALUATE.to_string(),
                    consts::INVENTORY_READ.to_string(),
                ],
            },
        );

        // Requesters create requisitions against the project budget
        roles.insert(
            ROLE_REQUESTER.to_string(),
            Role {
                name: ROLE_REQUESTER.to_string(),
                description: "Employee requesting materials for a project".to_string(),
                permissions: vec![
                    consts::REQUISITIONS_READ.to_string(),
                    consts::REQUISITIONS_CREATE.to_string(),
                    consts::BUDGET_READ.to_string(),
                    consts::INVENTORY_READ.to_string(),
                ],
            },
        );

        roles
    };
}

/// Proof that a user was authorized to unlock requisitions.
///
/// The private field keeps construction inside this module, so the unlock
/// transition cannot be invoked without passing [`RbacService::authorize_unlock`].
#[derive(Debug, Clone)]
pub struct UnlockGrant {
    username: String,
}

impl UnlockGrant {
    pub fn username(&self) -> &str {
        &self.username
    }
}

/// RBAC service for checking roles and permissions
#[derive(Clone, Default)]
pub struct RbacService;

impl RbacService {
    pub fn new() -> Self {
        Self
    }

    /// Get a role by name
    pub fn get_role(&self, role_name: &str) -> Option<&Role> {
        ROLES.get(role_name)
    }

    /// Get all permissions for multiple roles
    pub fn get_permissions_for_roles(&self, role_names: &[String]) -> HashSet<String> {
        let mut permissions = HashSet::new();

        for role_name in role_names {
            match ROLES.get(role_name) {
                Some(role) => permissions.extend(role.permissions.iter().cloned()),
                None => warn!("Role not found: {}", role_name),
            }
        }

        permissions
    }

    /// Check if a specific permission matches a required permission
    pub fn check_permission(&self, user_permission: &str, required_permission: &str) -> bool {
        // Direct match
        if user_permission == required_permission {
            return true;
        }

        // Wildcard match
        if let Some(prefix) = user_permission.strip_suffix(":*") {
            if required_permission
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with(':'))
            {
                return true;
            }
        }

        // Super wildcard
        user_permission == "*"
    }

    pub fn has_permission(&self, user: &AuthUser, required_permission: &str) -> bool {
        self.get_permissions_for_roles(&user.roles)
            .iter()
            .any(|perm| self.check_permission(perm, required_permission))
    }

    pub fn require(&self, user: &AuthUser, required_permission: &str) -> Result<(), ServiceError> {
        if self.has_permission(user, required_permission) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "{} lacks permission {}",
                user.username, required_permission
            )))
        }
    }

    /// Mints an [`UnlockGrant`] for administrators and refuses everyone else.
    pub fn authorize_unlock(&self, user: &AuthUser) -> Result<UnlockGrant, ServiceError> {
        if !user.has_role(ROLE_ADMIN) {
            warn!(user = %user.username, "Unlock attempted by non-administrator");
            return Err(ServiceError::Forbidden(
                "only administrators can unlock requisitions".to_string(),
            ));
        }
        self.require(user, consts::REQUISITIONS_UNLOCK)?;

        Ok(UnlockGrant {
            username: user.username.clone(),
        })
    }
}
