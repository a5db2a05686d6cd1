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

//! In-process entity store

use crate::auth::lockout::LockoutState;
use crate::models::{
    AuditRecord, AuditRow, EntityId, GrantedPermission, Module, NewModule, NewPermission, NewRole, NewUser, Permission, Role, RolePermission, User, UserRole,
};
use crate::store::{AuditRecordFilter, AuditRowFilter, BatchOutcome, EntityStore, OperationResult, StoreError, StoreResult, WriteBatch, WriteOperation};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::debug;

/// Tables held by the memory store. Audit records live outside so that
/// batches can stage a copy of the tables without cloning the ledger.
#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<EntityId, User>,
    roles: BTreeMap<EntityId, Role>,
    permissions: BTreeMap<EntityId, Permission>,
    modules: BTreeMap<EntityId, Module>,
    user_roles: BTreeMap<EntityId, UserRole>,
    role_permissions: BTreeMap<EntityId, RolePermission>,
    /// Last id handed out per table
    sequences: BTreeMap<&'static str, EntityId>,
}

impl Tables {
    fn allocate_id(&mut self, table: &'static str) -> EntityId {
        let last = self.sequences.entry(table).or_insert(0);
        *last += 1;
        *last
    }

    fn require_user(&self, user_id: EntityId) -> StoreResult<()> {
        if self.users.contains_key(&user_id) {
            Ok(())
        } else {
            Err(StoreError::NotFound { entity: "user", id: user_id })
        }
    }

    fn require_role(&self, role_id: EntityId) -> StoreResult<()> {
        if self.roles.contains_key(&role_id) {
            Ok(())
        } else {
            Err(StoreError::NotFound { entity: "role", id: role_id })
        }
    }

    fn require_permission(&self, permission_id: EntityId) -> StoreResult<()> {
        if self.permissions.contains_key(&permission_id) {
            Ok(())
        } else {
            Err(StoreError::NotFound {
                entity: "permission",
                id: permission_id,
            })
        }
    }

    fn require_module(&self, module_id: EntityId) -> StoreResult<()> {
        if self.modules.contains_key(&module_id) {
            Ok(())
        } else {
            Err(StoreError::NotFound { entity: "module", id: module_id })
        }
    }

    fn insert_user(&mut self, user: NewUser) -> StoreResult<User> {
        if self.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StoreError::UniqueViolation {
                constraint: "users(email)".to_string(),
            });
        }

        let now = Utc::now();
        let id = self.allocate_id("users");
        let user = User {
            id,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            active: user.active,
            module_key: user.module_key,
            failed_attempts: 0,
            locked_until: None,
            reset_token_digest: None,
            reset_token_expires_at: None,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(id, user.clone());
        Ok(user)
    }

    fn insert_permission(&mut self, permission: NewPermission) -> StoreResult<Permission> {
        self.require_module(permission.module_id)?;

        let id = self.allocate_id("permissions");
        let permission = Permission {
            id,
            name: permission.name,
            description: permission.description,
            active: permission.active,
            module_id: permission.module_id,
        };
        self.permissions.insert(id, permission.clone());
        Ok(permission)
    }

    fn insert_user_role(&mut self, user_id: EntityId, role_id: EntityId) -> StoreResult<EntityId> {
        self.require_user(user_id)?;
        self.require_role(role_id)?;
        if self.user_roles.values().any(|ur| ur.user_id == user_id && ur.role_id == role_id) {
            return Err(StoreError::UniqueViolation {
                constraint: "user_roles(user_id, role_id)".to_string(),
            });
        }
        let id = self.allocate_id("user_roles");
        self.user_roles.insert(id, UserRole { id, user_id, role_id });
        Ok(id)
    }

    fn user_mut(&mut self, user_id: EntityId) -> StoreResult<&mut User> {
        self.users.get_mut(&user_id).ok_or(StoreError::NotFound { entity: "user", id: user_id })
    }

    /// Apply one operation to the staged tables. Audit appends are returned to the caller.
    fn apply_operation(&mut self, operation: WriteOperation, audit: &mut Vec<AuditRecord>, next_audit_id: &mut EntityId) -> StoreResult<OperationResult> {
        let now = Utc::now();

        match operation {
            WriteOperation::InsertUser { user, role_ids } => {
                let user = self.insert_user(user)?;
                for role_id in role_ids {
                    self.insert_user_role(user.id, role_id)?;
                }
                Ok(OperationResult::Inserted(user.id))
            }
            WriteOperation::InsertPermission(permission) => {
                let permission = self.insert_permission(permission)?;
                Ok(OperationResult::Inserted(permission.id))
            }
            WriteOperation::InsertUserRole { user_id, role_id } => {
                let id = self.insert_user_role(user_id, role_id)?;
                Ok(OperationResult::Inserted(id))
            }
            WriteOperation::DeleteUserRole { user_id, role_id, must_exist } => {
                let before = self.user_roles.len();
                self.user_roles.retain(|_, ur| !(ur.user_id == user_id && ur.role_id == role_id));
                let removed = (before - self.user_roles.len()) as u64;
                if must_exist && removed == 0 {
                    return Err(StoreError::Conflict {
                        message: format!("role {role_id} is no longer assigned to user {user_id}"),
                    });
                }
                Ok(OperationResult::Affected(removed))
            }
            WriteOperation::InsertRolePermission { role_id, permission_id } => {
                self.require_role(role_id)?;
                self.require_permission(permission_id)?;
                if self.role_permissions.values().any(|rp| rp.role_id == role_id && rp.permission_id == permission_id) {
                    return Err(StoreError::UniqueViolation {
                        constraint: "role_permissions(role_id, permission_id)".to_string(),
                    });
                }
                let id = self.allocate_id("role_permissions");
                self.role_permissions.insert(id, RolePermission { id, role_id, permission_id });
                Ok(OperationResult::Inserted(id))
            }
            WriteOperation::DeleteRolePermission {
                role_id,
                permission_id,
                must_exist,
            } => {
                let before = self.role_permissions.len();
                self.role_permissions.retain(|_, rp| !(rp.role_id == role_id && rp.permission_id == permission_id));
                let removed = (before - self.role_permissions.len()) as u64;
                if must_exist && removed == 0 {
                    return Err(StoreError::Conflict {
                        message: format!("permission {permission_id} is no longer assigned to role {role_id}"),
                    });
                }
                Ok(OperationResult::Affected(removed))
            }
            WriteOperation::SetPermissionModule { permission_id, module_id } => {
                self.require_module(module_id)?;
                let permission = self.permissions.get_mut(&permission_id).ok_or(StoreError::NotFound {
                    entity: "permission",
                    id: permission_id,
                })?;
                permission.module_id = module_id;
                Ok(OperationResult::Affected(1))
            }
            WriteOperation::SetUserActive { user_id, active } => {
                let user = self.user_mut(user_id)?;
                user.active = active;
                user.updated_at = now;
                Ok(OperationResult::Affected(1))
            }
            WriteOperation::SetRoleActive { role_id, active } => {
                let role = self.roles.get_mut(&role_id).ok_or(StoreError::NotFound { entity: "role", id: role_id })?;
                role.active = active;
                Ok(OperationResult::Affected(1))
            }
            WriteOperation::SetModuleActive { module_id, active } => {
                let module = self.modules.get_mut(&module_id).ok_or(StoreError::NotFound { entity: "module", id: module_id })?;
                module.active = active;
                Ok(OperationResult::Affected(1))
            }
            WriteOperation::SetResetToken { user_id, digest, expires_at } => {
                let user = self.user_mut(user_id)?;
                user.reset_token_digest = Some(digest);
                user.reset_token_expires_at = Some(expires_at);
                user.updated_at = now;
                Ok(OperationResult::Affected(1))
            }
            WriteOperation::SetCredentials {
                user_id,
                password_hash,
                expected_digest,
            } => {
                let user = self.user_mut(user_id)?;
                if user.reset_token_digest.as_deref() != Some(expected_digest.as_str()) {
                    return Err(StoreError::Conflict {
                        message: format!("reset token of user {user_id} was already used or replaced"),
                    });
                }
                user.password_hash = password_hash;
                user.reset_token_digest = None;
                user.reset_token_expires_at = None;
                user.failed_attempts = 0;
                user.locked_until = None;
                user.updated_at = now;
                Ok(OperationResult::Affected(1))
            }
            WriteOperation::AppendAudit(new_record) => {
                *next_audit_id += 1;
                let id = *next_audit_id;
                audit.push(AuditRecord {
                    id,
                    event: new_record.event,
                    description: new_record.description,
                    user_id: new_record.user_id,
                    origin_service: new_record.origin_service,
                    date: new_record.date,
                });
                Ok(OperationResult::Inserted(id))
            }
        }
    }
}

/// Entity store kept entirely in memory
///
/// Writes are serialized behind one lock, which gives batches and the
/// lockout compare-and-swap the same atomicity a row-locking database would.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    audit: RwLock<Vec<AuditRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of audit records in the ledger
    pub fn audit_len(&self) -> usize {
        self.audit.read().len()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        self.tables.write().insert_user(user)
    }

    async fn insert_role(&self, role: NewRole) -> StoreResult<Role> {
        let mut tables = self.tables.write();
        if tables.roles.values().any(|r| r.name == role.name) {
            return Err(StoreError::UniqueViolation {
                constraint: "roles(name)".to_string(),
            });
        }

        let id = tables.allocate_id("roles");
        let role = Role {
            id,
            name: role.name,
            description: role.description,
            active: role.active,
        };
        tables.roles.insert(id, role.clone());
        Ok(role)
    }

    async fn insert_module(&self, module: NewModule) -> StoreResult<Module> {
        let mut tables = self.tables.write();
        if tables.modules.values().any(|m| m.name == module.name) {
            return Err(StoreError::UniqueViolation {
                constraint: "modules(name)".to_string(),
            });
        }

        let id = tables.allocate_id("modules");
        let module = Module {
            id,
            name: module.name,
            module_key: module.module_key,
            description: module.description,
            active: module.active,
        };
        tables.modules.insert(id, module.clone());
        Ok(module)
    }

    async fn insert_permission(&self, permission: NewPermission) -> StoreResult<Permission> {
        self.tables.write().insert_permission(permission)
    }

    async fn get_user(&self, user_id: EntityId) -> StoreResult<Option<User>> {
        Ok(self.tables.read().users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.tables.read().users.values().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn find_user_by_reset_digest(&self, digest: &str) -> StoreResult<Option<User>> {
        Ok(self.tables.read().users.values().find(|u| u.reset_token_digest.as_deref() == Some(digest)).cloned())
    }

    async fn get_role(&self, role_id: EntityId) -> StoreResult<Option<Role>> {
        Ok(self.tables.read().roles.get(&role_id).cloned())
    }

    async fn get_permission(&self, permission_id: EntityId) -> StoreResult<Option<Permission>> {
        Ok(self.tables.read().permissions.get(&permission_id).cloned())
    }

    async fn get_module(&self, module_id: EntityId) -> StoreResult<Option<Module>> {
        Ok(self.tables.read().modules.get(&module_id).cloned())
    }

    async fn find_user_role(&self, user_id: EntityId, role_id: EntityId) -> StoreResult<Option<UserRole>> {
        Ok(self.tables.read().user_roles.values().find(|ur| ur.user_id == user_id && ur.role_id == role_id).cloned())
    }

    async fn find_role_permission(&self, role_id: EntityId, permission_id: EntityId) -> StoreResult<Option<RolePermission>> {
        Ok(self
            .tables
            .read()
            .role_permissions
            .values()
            .find(|rp| rp.role_id == role_id && rp.permission_id == permission_id)
            .cloned())
    }

    async fn roles_for_user(&self, user_id: EntityId) -> StoreResult<Vec<Role>> {
        let tables = self.tables.read();
        Ok(tables
            .user_roles
            .values()
            .filter(|ur| ur.user_id == user_id)
            .filter_map(|ur| tables.roles.get(&ur.role_id).cloned())
            .collect())
    }

    async fn permissions_for_user(&self, user_id: EntityId) -> StoreResult<Vec<GrantedPermission>> {
        let tables = self.tables.read();
        let mut granted = Vec::new();

        for user_role in tables.user_roles.values().filter(|ur| ur.user_id == user_id) {
            for role_permission in tables.role_permissions.values().filter(|rp| rp.role_id == user_role.role_id) {
                let Some(permission) = tables.permissions.get(&role_permission.permission_id) else {
                    continue;
                };
                let Some(module) = tables.modules.get(&permission.module_id) else {
                    continue;
                };
                granted.push(GrantedPermission {
                    permission: permission.clone(),
                    module: module.clone(),
                });
            }
        }

        Ok(granted)
    }

    async fn compare_and_swap_lockout(&self, user_id: EntityId, expected: &LockoutState, next: &LockoutState) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        let user = tables.user_mut(user_id)?;

        if user.lockout() != *expected {
            return Ok(false);
        }

        user.failed_attempts = next.failed_attempts;
        user.locked_until = next.locked_until;
        user.updated_at = Utc::now();
        Ok(true)
    }

    async fn apply(&self, batch: WriteBatch) -> StoreResult<BatchOutcome> {
        let mut tables = self.tables.write();
        let mut audit = self.audit.write();

        let mut staged = tables.clone();
        let mut staged_audit = Vec::new();
        let mut next_audit_id = audit.last().map(|r| r.id).unwrap_or(0);
        let mut outcome = BatchOutcome::default();

        for operation in batch.into_operations() {
            let result = staged.apply_operation(operation, &mut staged_audit, &mut next_audit_id)?;
            outcome.results.push(result);
        }

        *tables = staged;
        audit.extend(staged_audit);
        debug!(operations = outcome.results.len(), "Committed write batch");

        Ok(outcome)
    }

    async fn audit_rows(&self, filter: &AuditRowFilter) -> StoreResult<(Vec<AuditRow>, u64)> {
        let tables = self.tables.read();
        let audit = self.audit.read();

        let event_needle = filter.event_contains.as_ref().map(|e| e.to_lowercase());
        let actor_needle = filter.actor_name_contains.as_ref().map(|n| n.to_lowercase());

        // Inner join: records whose actor no longer exists are not listed
        let matching: Vec<AuditRow> = audit
            .iter()
            .filter_map(|record| {
                let actor = tables.users.get(&record.user_id)?;
                if let Some(needle) = &event_needle {
                    if !record.event.to_lowercase().contains(needle.as_str()) {
                        return None;
                    }
                }
                if let Some(needle) = &actor_needle {
                    if !actor.name.to_lowercase().contains(needle.as_str()) {
                        return None;
                    }
                }
                Some(AuditRow {
                    id: record.id,
                    event: record.event.clone(),
                    description: record.description.clone(),
                    user: actor.name.clone(),
                    origin_service: record.origin_service.clone(),
                    date: record.date,
                })
            })
            .collect();

        let total = matching.len() as u64;
        let page = matching.into_iter().skip(filter.offset as usize).take(filter.limit as usize).collect();

        Ok((page, total))
    }

    async fn audit_records(&self, filter: &AuditRecordFilter) -> StoreResult<Vec<AuditRecord>> {
        Ok(self.audit.read().iter().filter(|record| filter.matches(record)).cloned().collect())
    }
}
