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

//! Credential verification and session issuance

use crate::audit::{AuditEvent, AuditRecorder};
use crate::auth::lockout::LockoutPolicy;
use crate::auth::password::PasswordService;
use crate::auth::token::{Claims, SessionToken, TokenManager};
use crate::clock::Clock;
use crate::error::{AccessError, AccessResult};
use crate::models::{ORIGIN_SERVICE, User};
use crate::notify::Notifier;
use crate::rbac::PermissionResolver;
use crate::store::EntityStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Orchestrates password check, lockout, module gate and token minting
#[derive(Clone)]
pub struct SessionIssuer {
    store: Arc<dyn EntityStore>,
    passwords: PasswordService,
    lockout: LockoutPolicy,
    resolver: PermissionResolver,
    tokens: TokenManager,
    recorder: AuditRecorder,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl SessionIssuer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn EntityStore>,
        passwords: PasswordService,
        lockout: LockoutPolicy,
        resolver: PermissionResolver,
        tokens: TokenManager,
        recorder: AuditRecorder,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            passwords,
            lockout,
            resolver,
            tokens,
            recorder,
            notifier,
            clock,
        }
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Verify credentials and mint a session token scoped to `module_key` (empty for none)
    pub async fn authenticate(&self, email: &str, password: &str, module_key: &str) -> AccessResult<SessionToken> {
        let (_, session) = self.authenticate_user(email, password, module_key).await?;
        Ok(session)
    }

    async fn authenticate_user(&self, email: &str, password: &str, module_key: &str) -> AccessResult<(User, SessionToken)> {
        let Some(user) = self.store.find_user_by_email(email.trim()).await? else {
            self.passwords.spawn_verify_dummy(password).await?;
            warn!(module_key, "Login rejected: invalid credentials");
            return Err(AccessError::InvalidCredentials);
        };

        self.lockout.ensure_unlocked(&user)?;

        if !user.active {
            warn!(user_id = user.id, "Login rejected: account inactive");
            return Err(AccessError::AccountInactive);
        }

        if !self.passwords.spawn_verify(password, &user.password_hash).await? {
            let state = self.lockout.register_failure(&user).await?;
            warn!(user_id = user.id, failed_attempts = state.failed_attempts, "Login rejected: invalid credentials");
            return Err(AccessError::InvalidCredentials);
        }

        self.lockout.register_success(&user).await?;

        let effective = self.resolver.resolve_effective_permissions(user.id).await?;
        let roles = self.resolver.role_names(user.id).await?;

        if !effective.grants_module(module_key) {
            warn!(user_id = user.id, module_key, "Login rejected: no access to module");
            return Err(AccessError::ModuleAccessDenied {
                module_key: module_key.to_string(),
            });
        }

        let claims = self.tokens.claims_for(&user, roles, effective.permission_names());
        let session = self.tokens.issue(claims)?;

        info!(user_id = user.id, module_key, "Login succeeded");
        Ok((user, session))
    }

    /// Authenticate, then write the mandatory login audit record and send a best-effort notice.
    ///
    /// If the audit append fails the caller gets `AuditWriteFailed` even though the
    /// credentials were valid; no token is handed out for an unaudited login.
    pub async fn login(&self, email: &str, password: &str, module_key: &str) -> AccessResult<SessionToken> {
        let (user, session) = self.authenticate_user(email, password, module_key).await?;

        self.recorder
            .record(
                AuditEvent::Insert,
                format!("Login registered for {} in module '{}'", user.email, module_key),
                user.id,
                ORIGIN_SERVICE,
                self.clock.now(),
            )
            .await?;

        let body = format!("Hello {}, a new sign-in to your account was registered.", user.name);
        if let Err(e) = self.notifier.notify(&user.email, "New sign-in", &body).await {
            warn!(user_id = user.id, error = %e, "Login notice could not be delivered");
        }

        Ok(session)
    }

    /// Tokens are self-contained; nothing to invalidate server-side
    pub fn logout(&self, claims: &Claims) -> AccessResult<()> {
        info!(user_id = %claims.sub, "Logout acknowledged");
        Ok(())
    }
}
