// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Entity definitions shared by the store and the engine components

use crate::auth::lockout::LockoutState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier type for every persisted entity
pub type EntityId = u64;

/// Origin label this service writes on its own audit records
pub const ORIGIN_SERVICE: &str = "SEGURIDAD";

/// Authenticating principal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: EntityId,

    /// Display name
    pub name: String,

    /// Unique email address used as login
    pub email: String,

    /// Argon2 PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub active: bool,

    /// Module key the account was provisioned for
    pub module_key: Option<String>,

    /// Consecutive failed password checks
    pub failed_attempts: u32,

    /// End of the lockout window, if one was ever opened
    pub locked_until: Option<DateTime<Utc>>,

    /// SHA-256 digest of the pending password-reset token
    #[serde(skip_serializing)]
    pub reset_token_digest: Option<String>,

    pub reset_token_expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Current lockout fields as one value
    pub fn lockout(&self) -> LockoutState {
        LockoutState {
            failed_attempts: self.failed_attempts,
            locked_until: self.locked_until,
        }
    }
}

/// Fields required to create a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub active: bool,
    pub module_key: Option<String>,
}

/// One account of a bulk load, with the plain password and its initial role
#[derive(Clone, Serialize, Deserialize)]
pub struct BulkUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub active: bool,
    pub role_id: EntityId,
}

impl std::fmt::Debug for BulkUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkUser")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("active", &self.active)
            .field("role_id", &self.role_id)
            .finish()
    }
}

/// Named policy bundle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub id: EntityId,
    pub name: String,
    pub description: String,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct NewRole {
    pub name: String,
    pub description: String,
    pub active: bool,
}

/// Action grant owned by exactly one module
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Permission {
    pub id: EntityId,
    pub name: String,
    pub description: String,
    pub active: bool,
    pub module_id: EntityId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPermission {
    pub name: String,
    pub description: String,
    pub active: bool,
    pub module_id: EntityId,
}

/// Access domain, addressed by its module key at login
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Module {
    pub id: EntityId,
    pub name: String,
    pub module_key: String,
    pub description: String,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct NewModule {
    pub name: String,
    pub module_key: String,
    pub description: String,
    pub active: bool,
}

/// A permission together with its owning module, as returned by the typed join
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GrantedPermission {
    pub permission: Permission,
    pub module: Module,
}

/// User to role join record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRole {
    pub id: EntityId,
    pub user_id: EntityId,
    pub role_id: EntityId,
}

/// Role to permission join record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RolePermission {
    pub id: EntityId,
    pub role_id: EntityId,
    pub permission_id: EntityId,
}

/// Immutable record of a privileged action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditRecord {
    pub id: EntityId,
    pub event: String,
    pub description: String,
    pub user_id: EntityId,
    pub origin_service: String,
    pub date: DateTime<Utc>,
}

/// Audit record before the store assigns its id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditRecord {
    pub event: String,
    pub description: String,
    pub user_id: EntityId,
    pub origin_service: String,
    pub date: DateTime<Utc>,
}

/// Audit record joined with the acting user's display name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditRow {
    pub id: EntityId,
    pub event: String,
    pub description: String,
    pub user: String,
    pub origin_service: String,
    pub date: DateTime<Utc>,
}
