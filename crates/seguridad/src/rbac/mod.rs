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

//! Module-scoped role-based access control

pub mod admin;
pub mod resolver;

pub use admin::AdminService;
pub use resolver::{EffectivePermissions, PermissionResolver};

use crate::error::{AccessError, AccessResult};
use crate::models::{EntityId, Module, Permission, Role, User};
use crate::store::{EntityStore, StoreError};

pub(crate) async fn load_user(store: &dyn EntityStore, user_id: EntityId) -> AccessResult<User> {
    store.get_user(user_id).await?.ok_or_else(|| AccessError::not_found("user", user_id))
}

pub(crate) async fn load_role(store: &dyn EntityStore, role_id: EntityId) -> AccessResult<Role> {
    store.get_role(role_id).await?.ok_or_else(|| AccessError::not_found("role", role_id))
}

pub(crate) async fn load_permission(store: &dyn EntityStore, permission_id: EntityId) -> AccessResult<Permission> {
    store.get_permission(permission_id).await?.ok_or_else(|| AccessError::not_found("permission", permission_id))
}

pub(crate) async fn load_module(store: &dyn EntityStore, module_id: EntityId) -> AccessResult<Module> {
    store.get_module(module_id).await?.ok_or_else(|| AccessError::not_found("module", module_id))
}

/// Reject a (user, role) pair that already exists
pub(crate) async fn ensure_role_unassigned(store: &dyn EntityStore, user_id: EntityId, role_id: EntityId) -> AccessResult<()> {
    if store.find_user_role(user_id, role_id).await?.is_some() {
        return Err(duplicate_role(user_id, role_id));
    }
    Ok(())
}

/// Reject a (role, permission) pair that already exists
pub(crate) async fn ensure_permission_unassigned(store: &dyn EntityStore, role_id: EntityId, permission_id: EntityId) -> AccessResult<()> {
    if store.find_role_permission(role_id, permission_id).await?.is_some() {
        return Err(duplicate_permission(role_id, permission_id));
    }
    Ok(())
}

pub(crate) fn duplicate_role(user_id: EntityId, role_id: EntityId) -> AccessError {
    AccessError::DuplicateAssignment {
        parent: "user",
        parent_id: user_id,
        child: "role",
        child_id: role_id,
    }
}

pub(crate) fn duplicate_permission(role_id: EntityId, permission_id: EntityId) -> AccessError {
    AccessError::DuplicateAssignment {
        parent: "role",
        parent_id: role_id,
        child: "permission",
        child_id: permission_id,
    }
}

/// A concurrent insert that slipped past the pre-check still surfaces as a duplicate
pub(crate) fn map_unique(err: StoreError, duplicate: AccessError) -> AccessError {
    match err {
        StoreError::UniqueViolation { .. } => duplicate,
        other => other.into(),
    }
}
