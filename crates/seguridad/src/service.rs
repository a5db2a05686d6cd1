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

//! Engine facade consumed by the transport layer

use crate::audit::{AuditPage, AuditQuery, AuditRecorder, AuditStatistics, StatisticsQuery};
use crate::auth::{LockoutPolicy, PasswordReset, PasswordService, SessionIssuer, SessionToken, TokenManager};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::AccessResult;
use crate::models::{AuditRecord, EntityId, UserRole};
use crate::notify::{Notifier, TracingNotifier};
use crate::rbac::{AdminService, EffectivePermissions, PermissionResolver};
use crate::store::{EntityStore, MemoryStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Access-control and audit engine with every component wired to one store
#[derive(Clone)]
pub struct SecurityService {
    config: Config,
    store: Arc<dyn EntityStore>,
    passwords: PasswordService,
    resolver: PermissionResolver,
    recorder: AuditRecorder,
    admin: AdminService,
    sessions: SessionIssuer,
    reset: PasswordReset,
}

impl SecurityService {
    pub fn new(config: Config, store: Arc<dyn EntityStore>, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> AccessResult<Self> {
        let passwords = PasswordService::new(&config.password)?;
        let recorder = AuditRecorder::new(store.clone(), clock.clone(), config.display_offset()?);
        let resolver = PermissionResolver::new(store.clone());
        let lockout = LockoutPolicy::new(store.clone(), clock.clone(), config.lockout.clone());
        let tokens = TokenManager::new(config.token.clone(), clock.clone());

        let sessions = SessionIssuer::new(
            store.clone(),
            passwords.clone(),
            lockout,
            resolver.clone(),
            tokens,
            recorder.clone(),
            notifier.clone(),
            clock.clone(),
        );
        let reset = PasswordReset::new(
            store.clone(),
            passwords.clone(),
            recorder.clone(),
            notifier,
            clock,
            config.reset_token_ttl(),
            config.reset_url.clone(),
        );
        let admin = AdminService::new(store.clone(), recorder.clone(), passwords.clone());

        Ok(Self {
            config,
            store,
            passwords,
            resolver,
            recorder,
            admin,
            sessions,
            reset,
        })
    }

    /// In-memory engine with the wall clock and log-only notifications
    pub fn in_memory(config: Config) -> AccessResult<Self> {
        Self::new(config, Arc::new(MemoryStore::new()), Arc::new(TracingNotifier), Arc::new(SystemClock))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn passwords(&self) -> &PasswordService {
        &self.passwords
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    pub fn audit(&self) -> &AuditRecorder {
        &self.recorder
    }

    pub fn admin(&self) -> &AdminService {
        &self.admin
    }

    pub fn sessions(&self) -> &SessionIssuer {
        &self.sessions
    }

    pub fn password_reset(&self) -> &PasswordReset {
        &self.reset
    }

    pub async fn authenticate(&self, email: &str, password: &str, module_key: &str) -> AccessResult<SessionToken> {
        self.sessions.authenticate(email, password, module_key).await
    }

    pub async fn resolve_effective_permissions(&self, user_id: EntityId) -> AccessResult<EffectivePermissions> {
        self.resolver.resolve_effective_permissions(user_id).await
    }

    pub async fn has_module_access(&self, user_id: EntityId, module_key: &str) -> AccessResult<bool> {
        self.resolver.has_module_access(user_id, module_key).await
    }

    pub async fn assign_role_to_user(&self, user_id: EntityId, role_id: EntityId) -> AccessResult<UserRole> {
        self.resolver.assign_role_to_user(user_id, role_id).await
    }

    pub async fn remove_role_from_user(&self, user_id: EntityId, role_id: EntityId) -> AccessResult<u64> {
        self.resolver.remove_role_from_user(user_id, role_id).await
    }

    pub async fn record_audit(
        &self,
        event: &str,
        description: &str,
        actor_user_id: EntityId,
        origin_service: &str,
        timestamp: DateTime<Utc>,
    ) -> AccessResult<AuditRecord> {
        self.recorder.record(event, description, actor_user_id, origin_service, timestamp).await
    }

    pub async fn query_audit(&self, query: &AuditQuery, page: u64, page_size: u64) -> AccessResult<AuditPage> {
        self.recorder.query(query, page, page_size).await
    }

    pub async fn audit_statistics(&self, query: &StatisticsQuery) -> AccessResult<AuditStatistics> {
        self.recorder.statistics(query).await
    }
}
