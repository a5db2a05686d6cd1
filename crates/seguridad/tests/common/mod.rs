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

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use seguridad::auth::LockoutState;
use seguridad::clock::ManualClock;
use seguridad::config::{PasswordConfig, TokenConfig};
use seguridad::models::{
    AuditRecord, AuditRow, EntityId, GrantedPermission, Module, NewModule, NewPermission, NewRole, NewUser, Permission, Role, RolePermission, User, UserRole,
};
use seguridad::notify::Notifier;
use seguridad::store::{
    AuditRecordFilter, AuditRowFilter, BatchOutcome, EntityStore, MemoryStore, StoreError, StoreResult, WriteBatch, WriteOperation,
};
use seguridad::{AccessResult, Config, SecurityService};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub const PASSWORD: &str = "Cl4ve-Segura";

mockall::mock! {
    pub Notifier {}

    #[async_trait]
    impl Notifier for Notifier {
        async fn notify(&self, recipient: &str, subject: &str, body: &str) -> AccessResult<()>;
    }
}

/// Notifier that keeps every message for inspection
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingNotifier {
    pub fn messages_to(&self, recipient: &str) -> Vec<String> {
        self.sent.lock().iter().filter(|(to, _, _)| to == recipient).map(|(_, _, body)| body.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, recipient: &str, subject: &str, body: &str) -> AccessResult<()> {
        self.sent.lock().push((recipient.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

/// Store wrapper that can be told to reject writes or serve stale join lookups
#[derive(Debug, Default)]
pub struct FailingStore {
    pub inner: MemoryStore,
    /// Reject any batch carrying an audit append
    pub fail_audit: AtomicBool,
    /// Report every join pair as present, as a read taken before a concurrent revoke would
    pub stale_joins: AtomicBool,
}

impl FailingStore {
    pub fn fail_audit_writes(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    pub fn serve_stale_joins(&self, stale: bool) {
        self.stale_joins.store(stale, Ordering::SeqCst);
    }
}

#[async_trait]
impl EntityStore for FailingStore {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        self.inner.insert_user(user).await
    }

    async fn insert_role(&self, role: NewRole) -> StoreResult<Role> {
        self.inner.insert_role(role).await
    }

    async fn insert_module(&self, module: NewModule) -> StoreResult<Module> {
        self.inner.insert_module(module).await
    }

    async fn insert_permission(&self, permission: NewPermission) -> StoreResult<Permission> {
        self.inner.insert_permission(permission).await
    }

    async fn get_user(&self, user_id: EntityId) -> StoreResult<Option<User>> {
        self.inner.get_user(user_id).await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.inner.find_user_by_email(email).await
    }

    async fn find_user_by_reset_digest(&self, digest: &str) -> StoreResult<Option<User>> {
        self.inner.find_user_by_reset_digest(digest).await
    }

    async fn get_role(&self, role_id: EntityId) -> StoreResult<Option<Role>> {
        self.inner.get_role(role_id).await
    }

    async fn get_permission(&self, permission_id: EntityId) -> StoreResult<Option<Permission>> {
        self.inner.get_permission(permission_id).await
    }

    async fn get_module(&self, module_id: EntityId) -> StoreResult<Option<Module>> {
        self.inner.get_module(module_id).await
    }

    async fn find_user_role(&self, user_id: EntityId, role_id: EntityId) -> StoreResult<Option<UserRole>> {
        if self.stale_joins.load(Ordering::SeqCst) {
            return Ok(Some(UserRole { id: 0, user_id, role_id }));
        }
        self.inner.find_user_role(user_id, role_id).await
    }

    async fn find_role_permission(&self, role_id: EntityId, permission_id: EntityId) -> StoreResult<Option<RolePermission>> {
        if self.stale_joins.load(Ordering::SeqCst) {
            return Ok(Some(RolePermission { id: 0, role_id, permission_id }));
        }
        self.inner.find_role_permission(role_id, permission_id).await
    }

    async fn roles_for_user(&self, user_id: EntityId) -> StoreResult<Vec<Role>> {
        self.inner.roles_for_user(user_id).await
    }

    async fn permissions_for_user(&self, user_id: EntityId) -> StoreResult<Vec<GrantedPermission>> {
        self.inner.permissions_for_user(user_id).await
    }

    async fn compare_and_swap_lockout(&self, user_id: EntityId, expected: &LockoutState, next: &LockoutState) -> StoreResult<bool> {
        self.inner.compare_and_swap_lockout(user_id, expected, next).await
    }

    async fn apply(&self, batch: WriteBatch) -> StoreResult<BatchOutcome> {
        if batch.contains_audit() && self.fail_audit.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: "audit table offline".to_string(),
            });
        }
        self.inner.apply(batch).await
    }

    async fn audit_rows(&self, filter: &AuditRowFilter) -> StoreResult<(Vec<AuditRow>, u64)> {
        self.inner.audit_rows(filter).await
    }

    async fn audit_records(&self, filter: &AuditRecordFilter) -> StoreResult<Vec<AuditRecord>> {
        self.inner.audit_records(filter).await
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 14, 0, 0).unwrap()
}

/// Defaults with a real secret and cheap Argon2 parameters
pub fn test_config() -> Config {
    Config {
        token: TokenConfig {
            secret: "integration-test-secret".to_string(),
            ..Default::default()
        },
        password: PasswordConfig {
            memory_kib: 256,
            iterations: 1,
            parallelism: 1,
        },
        ..Default::default()
    }
}

pub struct Fixture {
    pub service: SecurityService,
    pub store: Arc<dyn EntityStore>,
    pub clock: Arc<ManualClock>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with(Arc::new(MemoryStore::new()), Arc::new(RecordingNotifier::default()))
    }

    pub fn with(store: Arc<dyn EntityStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_config(test_config(), store, notifier)
    }

    pub fn with_config(config: Config, store: Arc<dyn EntityStore>, notifier: Arc<dyn Notifier>) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let service = SecurityService::new(config, store.clone(), notifier, clock.clone()).unwrap();
        Self { service, store, clock }
    }

    pub async fn user(&self, name: &str, email: &str) -> User {
        let password_hash = self.service.passwords().hash(PASSWORD).unwrap();
        self.store
            .insert_user(NewUser {
                name: name.to_string(),
                email: email.to_string(),
                password_hash,
                active: true,
                module_key: None,
            })
            .await
            .unwrap()
    }

    pub async fn role(&self, name: &str) -> Role {
        self.store
            .insert_role(NewRole {
                name: name.to_string(),
                description: format!("{name} role"),
                active: true,
            })
            .await
            .unwrap()
    }

    pub async fn module(&self, name: &str, key: &str) -> Module {
        self.store
            .insert_module(NewModule {
                name: name.to_string(),
                module_key: key.to_string(),
                description: String::new(),
                active: true,
            })
            .await
            .unwrap()
    }

    pub async fn permission(&self, name: &str, module_id: EntityId) -> Permission {
        self.store
            .insert_permission(NewPermission {
                name: name.to_string(),
                description: String::new(),
                active: true,
                module_id,
            })
            .await
            .unwrap()
    }

    /// Unaudited role-permission link for seeding
    pub async fn grant(&self, role_id: EntityId, permission_id: EntityId) {
        self.store
            .apply(WriteBatch::new().with(WriteOperation::InsertRolePermission { role_id, permission_id }))
            .await
            .unwrap();
    }

    /// Unaudited user-role link for seeding
    pub async fn assign(&self, user_id: EntityId, role_id: EntityId) {
        self.service.assign_role_to_user(user_id, role_id).await.unwrap();
    }

    /// User holding one role whose single permission lives in a module keyed `module_key`
    pub async fn user_in_module(&self, email: &str, module_key: &str) -> User {
        let user = self.user("Operador", email).await;
        let role = self.role(&format!("{module_key}-operator")).await;
        let module = self.module(&format!("{module_key} module"), module_key).await;
        let permission = self.permission(&format!("{}.read", module_key.to_lowercase()), module.id).await;
        self.grant(role.id, permission.id).await;
        self.assign(user.id, role.id).await;
        user
    }

    pub async fn audit_records(&self) -> Vec<AuditRecord> {
        self.store.audit_records(&AuditRecordFilter::default()).await.unwrap()
    }
}
