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

//! Audited RBAC administration
//!
//! Every mutation here is committed in the same write batch as its audit
//! record, so an operator never sees a change without its trail or a trail
//! without its change.

use crate::audit::{AuditEvent, AuditRecorder};
use crate::auth::PasswordService;
use crate::error::{AccessError, AccessResult};
use crate::models::{BulkUser, EntityId, Module, NewPermission, NewUser, Permission, Role, RolePermission, User, UserRole};
use crate::rbac::{
    duplicate_permission, duplicate_role, ensure_permission_unassigned, ensure_role_unassigned, load_module, load_permission, load_role, load_user, map_unique,
};
use crate::store::{BatchOutcome, EntityStore, StoreError, WriteBatch, WriteOperation};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{error, info};

fn activation_event(active: bool) -> AuditEvent {
    if active { AuditEvent::Update } else { AuditEvent::Delete }
}

fn activation_verb(active: bool) -> &'static str {
    if active { "Activated" } else { "Deactivated" }
}

/// Privileged mutations performed on behalf of an acting administrator
#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn EntityStore>,
    recorder: AuditRecorder,
    passwords: PasswordService,
}

impl AdminService {
    pub fn new(store: Arc<dyn EntityStore>, recorder: AuditRecorder, passwords: PasswordService) -> Self {
        Self { store, recorder, passwords }
    }

    async fn commit(&self, actor_id: EntityId, batch: WriteBatch) -> Result<BatchOutcome, StoreError> {
        self.store.apply(batch).await.inspect_err(|e| {
            error!(actor_id, error = %e, "Audited mutation rolled back");
        })
    }

    fn rolled_back(&self, actor_id: EntityId, err: StoreError) -> AccessError {
        error!(actor_id, error = %err, "Audited mutation rolled back");
        err.into()
    }

    pub async fn assign_role_to_user(&self, actor_id: EntityId, user_id: EntityId, role_id: EntityId) -> AccessResult<UserRole> {
        let user = load_user(self.store.as_ref(), user_id).await?;
        let role = load_role(self.store.as_ref(), role_id).await?;
        ensure_role_unassigned(self.store.as_ref(), user_id, role_id).await?;

        let mut batch = WriteBatch::new();
        let insert = batch.push(WriteOperation::InsertUserRole { user_id, role_id });
        batch.push(
            self.recorder
                .entry(AuditEvent::Insert, format!("Assigned role {} to user {}", role.name, user.email), actor_id),
        );

        let outcome = self.commit(actor_id, batch).await.map_err(|e| map_unique(e, duplicate_role(user_id, role_id)))?;

        info!(actor_id, user_id, role_id, "Role assigned to user");
        Ok(UserRole {
            id: outcome.inserted_id(insert).unwrap_or_default(),
            user_id,
            role_id,
        })
    }

    /// Returns rows removed; a missing pair is not an error and leaves no audit record
    pub async fn remove_role_from_user(&self, actor_id: EntityId, user_id: EntityId, role_id: EntityId) -> AccessResult<u64> {
        let user = load_user(self.store.as_ref(), user_id).await?;
        let role = load_role(self.store.as_ref(), role_id).await?;
        if self.store.find_user_role(user_id, role_id).await?.is_none() {
            return Ok(0);
        }

        let mut batch = WriteBatch::new();
        let delete = batch.push(WriteOperation::DeleteUserRole {
            user_id,
            role_id,
            must_exist: true,
        });
        batch.push(
            self.recorder
                .entry(AuditEvent::Delete, format!("Removed role {} from user {}", role.name, user.email), actor_id),
        );

        let outcome = match self.store.apply(batch).await {
            Ok(outcome) => outcome,
            Err(StoreError::Conflict { .. }) => return Ok(0),
            Err(e) => return Err(self.rolled_back(actor_id, e)),
        };

        info!(actor_id, user_id, role_id, "Role removed from user");
        Ok(outcome.rows_affected(delete))
    }

    pub async fn assign_permission_to_role(&self, actor_id: EntityId, role_id: EntityId, permission_id: EntityId) -> AccessResult<RolePermission> {
        let role = load_role(self.store.as_ref(), role_id).await?;
        let permission = load_permission(self.store.as_ref(), permission_id).await?;
        ensure_permission_unassigned(self.store.as_ref(), role_id, permission_id).await?;

        let mut batch = WriteBatch::new();
        let insert = batch.push(WriteOperation::InsertRolePermission { role_id, permission_id });
        batch.push(
            self.recorder
                .entry(AuditEvent::Insert, format!("Assigned permission {} to role {}", permission.name, role.name), actor_id),
        );

        let outcome = self
            .commit(actor_id, batch)
            .await
            .map_err(|e| map_unique(e, duplicate_permission(role_id, permission_id)))?;

        info!(actor_id, role_id, permission_id, "Permission assigned to role");
        Ok(RolePermission {
            id: outcome.inserted_id(insert).unwrap_or_default(),
            role_id,
            permission_id,
        })
    }

    pub async fn remove_permission_from_role(&self, actor_id: EntityId, role_id: EntityId, permission_id: EntityId) -> AccessResult<u64> {
        let role = load_role(self.store.as_ref(), role_id).await?;
        let permission = load_permission(self.store.as_ref(), permission_id).await?;
        if self.store.find_role_permission(role_id, permission_id).await?.is_none() {
            return Ok(0);
        }

        let mut batch = WriteBatch::new();
        let delete = batch.push(WriteOperation::DeleteRolePermission {
            role_id,
            permission_id,
            must_exist: true,
        });
        batch.push(
            self.recorder
                .entry(AuditEvent::Delete, format!("Removed permission {} from role {}", permission.name, role.name), actor_id),
        );

        let outcome = match self.store.apply(batch).await {
            Ok(outcome) => outcome,
            Err(StoreError::Conflict { .. }) => return Ok(0),
            Err(e) => return Err(self.rolled_back(actor_id, e)),
        };

        info!(actor_id, role_id, permission_id, "Permission removed from role");
        Ok(outcome.rows_affected(delete))
    }

    /// Move a permission under a module. Inactive modules accept no new permissions;
    /// permissions already under a module that is later deactivated keep resolving.
    pub async fn assign_permission_to_module(&self, actor_id: EntityId, permission_id: EntityId, module_id: EntityId) -> AccessResult<Permission> {
        let mut permission = load_permission(self.store.as_ref(), permission_id).await?;
        let module = load_module(self.store.as_ref(), module_id).await?;
        if !module.active {
            return Err(AccessError::InactiveModule { module_id });
        }

        let batch = WriteBatch::new().with(WriteOperation::SetPermissionModule { permission_id, module_id }).with(self.recorder.entry(
            AuditEvent::Update,
            format!("Assigned permission {} to module {}", permission.name, module.name),
            actor_id,
        ));
        self.commit(actor_id, batch).await?;

        info!(actor_id, permission_id, module_id, module_key = %module.module_key, "Permission assigned to module");
        permission.module_id = module_id;
        Ok(permission)
    }

    pub async fn set_user_active(&self, actor_id: EntityId, user_id: EntityId, active: bool) -> AccessResult<User> {
        let mut user = load_user(self.store.as_ref(), user_id).await?;

        let batch = WriteBatch::new().with(WriteOperation::SetUserActive { user_id, active }).with(self.recorder.entry(
            activation_event(active),
            format!("{} user {}", activation_verb(active), user.email),
            actor_id,
        ));
        self.commit(actor_id, batch).await?;

        info!(actor_id, user_id, active, "User activation changed");
        user.active = active;
        Ok(user)
    }

    pub async fn set_role_active(&self, actor_id: EntityId, role_id: EntityId, active: bool) -> AccessResult<Role> {
        let mut role = load_role(self.store.as_ref(), role_id).await?;

        let batch = WriteBatch::new().with(WriteOperation::SetRoleActive { role_id, active }).with(self.recorder.entry(
            activation_event(active),
            format!("{} role {}", activation_verb(active), role.name),
            actor_id,
        ));
        self.commit(actor_id, batch).await?;

        info!(actor_id, role_id, active, "Role activation changed");
        role.active = active;
        Ok(role)
    }

    pub async fn set_module_active(&self, actor_id: EntityId, module_id: EntityId, active: bool) -> AccessResult<Module> {
        let mut module = load_module(self.store.as_ref(), module_id).await?;

        let batch = WriteBatch::new().with(WriteOperation::SetModuleActive { module_id, active }).with(self.recorder.entry(
            activation_event(active),
            format!("{} module {}", activation_verb(active), module.name),
            actor_id,
        ));
        self.commit(actor_id, batch).await?;

        info!(actor_id, module_id, module_key = %module.module_key, active, "Module activation changed");
        module.active = active;
        Ok(module)
    }

    /// Create a batch of accounts, each with its initial role.
    ///
    /// The whole load is one unit of work: a duplicate email or unknown role
    /// anywhere in it leaves no user, role assignment or audit record behind.
    /// Each account gets an `INSERT` record for its creation and one for its role.
    pub async fn bulk_create_users(&self, actor_id: EntityId, users: Vec<BulkUser>) -> AccessResult<Vec<User>> {
        let mut roles: BTreeMap<EntityId, Role> = BTreeMap::new();
        let mut seen = HashSet::new();
        let mut batch = WriteBatch::new();
        let mut inserts = Vec::with_capacity(users.len());

        for entry in users {
            let email = entry.email.trim().to_string();
            if !seen.insert(email.to_lowercase()) || self.store.find_user_by_email(&email).await?.is_some() {
                return Err(AccessError::AlreadyExists {
                    entity: "user",
                    field: "email",
                    value: email,
                });
            }

            let role_name = match roles.get(&entry.role_id) {
                Some(role) => role.name.clone(),
                None => {
                    let role = load_role(self.store.as_ref(), entry.role_id).await?;
                    let name = role.name.clone();
                    roles.insert(role.id, role);
                    name
                }
            };

            let password_hash = self.passwords.spawn_hash(&entry.password).await?;
            inserts.push(batch.push(WriteOperation::InsertUser {
                user: NewUser {
                    name: entry.name,
                    email: email.clone(),
                    password_hash,
                    active: entry.active,
                    module_key: None,
                },
                role_ids: vec![entry.role_id],
            }));
            batch.push(self.recorder.entry(AuditEvent::Insert, format!("Created user {email}"), actor_id));
            batch.push(
                self.recorder
                    .entry(AuditEvent::Insert, format!("Assigned role {role_name} to user {email}"), actor_id),
            );
        }

        if inserts.is_empty() {
            return Ok(Vec::new());
        }

        let outcome = self.commit(actor_id, batch).await?;

        let mut created = Vec::with_capacity(inserts.len());
        for index in inserts {
            let Some(user_id) = outcome.inserted_id(index) else {
                continue;
            };
            created.push(load_user(self.store.as_ref(), user_id).await?);
        }

        info!(actor_id, count = created.len(), "Bulk user load committed");
        Ok(created)
    }

    /// Create a batch of permissions under their modules, all or none.
    /// Inactive modules reject the load like single assignment does.
    pub async fn bulk_create_permissions(&self, actor_id: EntityId, permissions: Vec<NewPermission>) -> AccessResult<Vec<Permission>> {
        let mut modules: BTreeMap<EntityId, Module> = BTreeMap::new();
        let mut batch = WriteBatch::new();
        let mut inserts = Vec::with_capacity(permissions.len());

        for permission in permissions {
            if !modules.contains_key(&permission.module_id) {
                let module = load_module(self.store.as_ref(), permission.module_id).await?;
                modules.insert(module.id, module);
            }
            if modules.get(&permission.module_id).is_some_and(|m| !m.active) {
                return Err(AccessError::InactiveModule {
                    module_id: permission.module_id,
                });
            }

            let description = format!("Created permission {}", permission.name);
            inserts.push((batch.push(WriteOperation::InsertPermission(permission.clone())), permission));
            batch.push(self.recorder.entry(AuditEvent::Insert, description, actor_id));
        }

        if inserts.is_empty() {
            return Ok(Vec::new());
        }

        let outcome = self.commit(actor_id, batch).await?;

        let created: Vec<Permission> = inserts
            .into_iter()
            .filter_map(|(index, permission)| {
                outcome.inserted_id(index).map(|id| Permission {
                    id,
                    name: permission.name,
                    description: permission.description,
                    active: permission.active,
                    module_id: permission.module_id,
                })
            })
            .collect();

        info!(actor_id, count = created.len(), "Bulk permission load committed");
        Ok(created)
    }
}
