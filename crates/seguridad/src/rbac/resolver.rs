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

//! Effective permission resolution

use crate::error::AccessResult;
use crate::models::{EntityId, GrantedPermission, Permission, UserRole};
use crate::rbac::{duplicate_role, ensure_role_unassigned, load_role, load_user, map_unique};
use crate::store::{EntityStore, WriteBatch, WriteOperation};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// De-duplicated union of the permissions reachable from a user through its roles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermissions {
    /// Ordered by permission id
    grants: Vec<GrantedPermission>,
}

impl EffectivePermissions {
    pub fn from_grants(grants: impl IntoIterator<Item = GrantedPermission>) -> Self {
        let unique: BTreeMap<EntityId, GrantedPermission> = grants.into_iter().map(|g| (g.permission.id, g)).collect();
        Self {
            grants: unique.into_values().collect(),
        }
    }

    pub fn grants(&self) -> &[GrantedPermission] {
        &self.grants
    }

    pub fn permissions(&self) -> impl Iterator<Item = &Permission> {
        self.grants.iter().map(|g| &g.permission)
    }

    pub fn permission_ids(&self) -> BTreeSet<EntityId> {
        self.grants.iter().map(|g| g.permission.id).collect()
    }

    pub fn permission_names(&self) -> Vec<String> {
        self.grants.iter().map(|g| g.permission.name.clone()).collect()
    }

    /// Keys of the modules owning at least one effective permission
    pub fn module_keys(&self) -> BTreeSet<String> {
        self.grants.iter().map(|g| g.module.module_key.clone()).collect()
    }

    /// Empty key means no module is required
    pub fn grants_module(&self, module_key: &str) -> bool {
        module_key.is_empty() || self.grants.iter().any(|g| g.module.module_key == module_key)
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

/// Read-side RBAC queries plus the plain (unaudited) user-role join mutations
#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<dyn EntityStore>,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub async fn resolve_effective_permissions(&self, user_id: EntityId) -> AccessResult<EffectivePermissions> {
        load_user(self.store.as_ref(), user_id).await?;
        let granted = self.store.permissions_for_user(user_id).await?;
        let effective = EffectivePermissions::from_grants(granted);

        debug!(user_id, permissions = effective.len(), "Resolved effective permissions");
        Ok(effective)
    }

    /// Whether any effective permission belongs to the module with this key.
    /// An empty key is always granted.
    pub async fn has_module_access(&self, user_id: EntityId, module_key: &str) -> AccessResult<bool> {
        if module_key.is_empty() {
            return Ok(true);
        }
        Ok(self.resolve_effective_permissions(user_id).await?.grants_module(module_key))
    }

    pub async fn role_names(&self, user_id: EntityId) -> AccessResult<Vec<String>> {
        load_user(self.store.as_ref(), user_id).await?;
        Ok(self.store.roles_for_user(user_id).await?.into_iter().map(|r| r.name).collect())
    }

    pub async fn accessible_module_keys(&self, user_id: EntityId) -> AccessResult<BTreeSet<String>> {
        Ok(self.resolve_effective_permissions(user_id).await?.module_keys())
    }

    /// Create the join record after checking both ends exist and the pair is new
    pub async fn assign_role_to_user(&self, user_id: EntityId, role_id: EntityId) -> AccessResult<UserRole> {
        load_user(self.store.as_ref(), user_id).await?;
        load_role(self.store.as_ref(), role_id).await?;
        ensure_role_unassigned(self.store.as_ref(), user_id, role_id).await?;

        let outcome = self
            .store
            .apply(WriteBatch::new().with(WriteOperation::InsertUserRole { user_id, role_id }))
            .await
            .map_err(|e| map_unique(e, duplicate_role(user_id, role_id)))?;

        info!(user_id, role_id, "Role assigned to user");
        Ok(UserRole {
            id: outcome.inserted_id(0).unwrap_or_default(),
            user_id,
            role_id,
        })
    }

    /// Remove the join record. Returns the number of rows removed, zero if the pair did not exist.
    pub async fn remove_role_from_user(&self, user_id: EntityId, role_id: EntityId) -> AccessResult<u64> {
        let delete = WriteOperation::DeleteUserRole {
            user_id,
            role_id,
            must_exist: false,
        };
        let outcome = self.store.apply(WriteBatch::new().with(delete)).await?;
        let removed = outcome.rows_affected(0);

        info!(user_id, role_id, removed, "Role removed from user");
        Ok(removed)
    }
}
