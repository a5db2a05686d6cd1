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

//! Password reset by emailed one-time token

use crate::audit::{AuditEvent, AuditRecorder};
use crate::auth::password::PasswordService;
use crate::clock::Clock;
use crate::error::{AccessError, AccessResult};
use crate::notify::Notifier;
use crate::store::{EntityStore, StoreError, WriteBatch, WriteOperation};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Duration;
use ring::digest::{SHA256, digest};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use tracing::{debug, info, warn};

const TOKEN_BYTES: usize = 32;

/// SHA-256 digest stored in place of the token
pub fn token_digest(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(digest(&SHA256, token.as_bytes()).as_ref())
}

fn generate_token(rng: &SystemRandom) -> AccessResult<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    rng.fill(&mut bytes).map_err(|_| AccessError::Internal {
        message: "Failed to generate reset token".to_string(),
    })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Issues reset tokens and applies new passwords
#[derive(Clone)]
pub struct PasswordReset {
    store: Arc<dyn EntityStore>,
    passwords: PasswordService,
    recorder: AuditRecorder,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    rng: Arc<SystemRandom>,
    ttl: Duration,
    reset_url: String,
}

impl PasswordReset {
    pub fn new(
        store: Arc<dyn EntityStore>,
        passwords: PasswordService,
        recorder: AuditRecorder,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        reset_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            passwords,
            recorder,
            notifier,
            clock,
            rng: Arc::new(SystemRandom::new()),
            ttl,
            reset_url: reset_url.into(),
        }
    }

    /// Send a reset link. Unknown or inactive accounts get the same `Ok(())` with no message sent.
    pub async fn request_reset(&self, email: &str) -> AccessResult<()> {
        let user = match self.store.find_user_by_email(email.trim()).await? {
            Some(user) if user.active => user,
            _ => {
                debug!("Password reset requested for unknown or inactive account");
                return Ok(());
            }
        };

        let token = generate_token(&self.rng)?;
        let expires_at = self.clock.now() + self.ttl;

        let batch = WriteBatch::new()
            .with(WriteOperation::SetResetToken {
                user_id: user.id,
                digest: token_digest(&token),
                expires_at,
            })
            .with(self.recorder.entry(AuditEvent::Update, format!("Password reset requested for {}", user.email), user.id));
        self.store.apply(batch).await?;

        let link = format!("{}?token={}", self.reset_url, token);
        let body = format!(
            "Hello {}, use the following link to choose a new password. It expires in {} minutes.\n{}",
            user.name,
            self.ttl.num_minutes(),
            link
        );
        self.notifier.notify(&user.email, "Password reset", &body).await?;

        info!(user_id = user.id, %expires_at, "Password reset token issued");
        Ok(())
    }

    /// Replace the password of the account owning `token`, consuming the token
    pub async fn reset_password(&self, token: &str, new_password: &str) -> AccessResult<()> {
        if token.is_empty() {
            return Err(AccessError::InvalidResetToken);
        }

        let digest = token_digest(token);
        let Some(user) = self.store.find_user_by_reset_digest(&digest).await? else {
            warn!("Password reset attempted with unknown token");
            return Err(AccessError::InvalidResetToken);
        };

        match user.reset_token_expires_at {
            Some(expires_at) if self.clock.now() < expires_at => {}
            _ => {
                warn!(user_id = user.id, "Password reset attempted with expired token");
                return Err(AccessError::InvalidResetToken);
            }
        }

        let password_hash = self.passwords.spawn_hash(new_password).await?;
        let batch = WriteBatch::new()
            .with(WriteOperation::SetCredentials {
                user_id: user.id,
                password_hash,
                expected_digest: digest,
            })
            .with(self.recorder.entry(AuditEvent::Update, format!("Password reset for {}", user.email), user.id));

        // A concurrent redemption of the same token consumed it first
        if let Err(e) = self.store.apply(batch).await {
            return match e {
                StoreError::Conflict { .. } => {
                    warn!(user_id = user.id, "Password reset token already redeemed");
                    Err(AccessError::InvalidResetToken)
                }
                other => Err(other.into()),
            };
        }

        info!(user_id = user.id, "Password reset completed");
        Ok(())
    }
}
