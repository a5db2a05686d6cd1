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

//! Entity store abstraction
//!
//! The engine never holds a process-wide database handle. Every component
//! receives an `Arc<dyn EntityStore>` at construction, which lets tests run
//! against [`MemoryStore`] and production run against a relational backend.

pub mod batch;
pub mod memory;

pub use batch::*;
pub use memory::MemoryStore;

use crate::auth::lockout::LockoutState;
use crate::models::{
    AuditRecord, AuditRow, EntityId, GrantedPermission, Module, NewModule, NewPermission, NewRole, NewUser, Permission, Role, RolePermission, User, UserRole,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Storage layer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: EntityId },

    #[error("write conflict: {message}")]
    Conflict { message: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Filter for the paginated, actor-joined audit listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditRowFilter {
    /// Case-insensitive substring of the event kind
    pub event_contains: Option<String>,
    /// Case-insensitive substring of the acting user's name
    pub actor_name_contains: Option<String>,
    pub offset: u64,
    pub limit: u64,
}

/// Filter for raw audit records used by statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditRecordFilter {
    /// Exact event kind
    pub event: Option<String>,
    /// Origin service, compared case-insensitively
    pub origin_service: Option<String>,
    /// Inclusive lower bound
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub to: Option<DateTime<Utc>>,
}

impl AuditRecordFilter {
    pub fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(event) = &self.event {
            if &record.event != event {
                return false;
            }
        }
        if let Some(origin) = &self.origin_service {
            if record.origin_service.to_uppercase() != origin.to_uppercase() {
                return false;
            }
        }
        if let Some(from) = self.from {
            if record.date < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if record.date > to {
                return false;
            }
        }
        true
    }
}

/// Typed repository over users, roles, permissions, modules, their joins and the audit ledger
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User>;

    async fn insert_role(&self, role: NewRole) -> StoreResult<Role>;

    async fn insert_module(&self, module: NewModule) -> StoreResult<Module>;

    async fn insert_permission(&self, permission: NewPermission) -> StoreResult<Permission>;

    async fn get_user(&self, user_id: EntityId) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_reset_digest(&self, digest: &str) -> StoreResult<Option<User>>;

    async fn get_role(&self, role_id: EntityId) -> StoreResult<Option<Role>>;

    async fn get_permission(&self, permission_id: EntityId) -> StoreResult<Option<Permission>>;

    async fn get_module(&self, module_id: EntityId) -> StoreResult<Option<Module>>;

    async fn find_user_role(&self, user_id: EntityId, role_id: EntityId) -> StoreResult<Option<UserRole>>;

    async fn find_role_permission(&self, role_id: EntityId, permission_id: EntityId) -> StoreResult<Option<RolePermission>>;

    /// Roles currently assigned to the user
    async fn roles_for_user(&self, user_id: EntityId) -> StoreResult<Vec<Role>>;

    /// Every permission reachable from the user through its roles, with the owning module.
    /// A permission shared by several roles may appear more than once.
    async fn permissions_for_user(&self, user_id: EntityId) -> StoreResult<Vec<GrantedPermission>>;

    /// Atomically replace the user's lockout fields if they still equal `expected`.
    /// Returns `false` when another writer got there first.
    async fn compare_and_swap_lockout(&self, user_id: EntityId, expected: &LockoutState, next: &LockoutState) -> StoreResult<bool>;

    /// Apply every operation of the batch or none of them
    async fn apply(&self, batch: WriteBatch) -> StoreResult<BatchOutcome>;

    /// One page of audit rows joined with actor names, plus the unpaginated total
    async fn audit_rows(&self, filter: &AuditRowFilter) -> StoreResult<(Vec<AuditRow>, u64)>;

    /// All audit records matching the filter, in insertion order
    async fn audit_records(&self, filter: &AuditRecordFilter) -> StoreResult<Vec<AuditRecord>>;
}
