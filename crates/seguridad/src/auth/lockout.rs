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

//! Progressive lockout after repeated failed password checks

use crate::clock::Clock;
use crate::config::LockoutConfig;
use crate::error::{AccessError, AccessResult};
use crate::models::{EntityId, User};
use crate::store::{EntityStore, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Attempts at the compare-and-swap before giving up on a contended user row
const MAX_CAS_RETRIES: usize = 16;

/// Persisted lockout fields of one user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutState {
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Lockout state as seen at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Unlocked { failed_attempts: u32 },
    Locked { until: DateTime<Utc> },
}

impl LockStatus {
    pub fn is_locked(&self) -> bool {
        matches!(self, LockStatus::Locked { .. })
    }
}

impl LockoutState {
    pub fn status(&self, now: DateTime<Utc>) -> LockStatus {
        match self.locked_until {
            Some(until) if now < until => LockStatus::Locked { until },
            // An elapsed window starts the count over
            Some(_) => LockStatus::Unlocked { failed_attempts: 0 },
            None => LockStatus::Unlocked {
                failed_attempts: self.failed_attempts,
            },
        }
    }

    /// State after one more failed password check at `now`
    pub fn after_failure(&self, now: DateTime<Utc>, config: &LockoutConfig) -> LockoutState {
        let failed_attempts = match self.status(now) {
            LockStatus::Locked { .. } => return self.clone(),
            LockStatus::Unlocked { failed_attempts } => failed_attempts.saturating_add(1),
        };

        let locked_until = if failed_attempts >= config.max_attempts {
            Some(now.checked_add_signed(config.lock_duration()).unwrap_or(DateTime::<Utc>::MAX_UTC))
        } else {
            None
        };

        LockoutState { failed_attempts, locked_until }
    }

    /// State after a successful password check
    pub fn after_success(&self) -> LockoutState {
        LockoutState::default()
    }
}

/// Applies lockout transitions through the store's compare-and-swap primitive
#[derive(Clone)]
pub struct LockoutPolicy {
    store: Arc<dyn EntityStore>,
    clock: Arc<dyn Clock>,
    config: LockoutConfig,
}

impl LockoutPolicy {
    pub fn new(store: Arc<dyn EntityStore>, clock: Arc<dyn Clock>, config: LockoutConfig) -> Self {
        Self { store, clock, config }
    }

    pub fn config(&self) -> &LockoutConfig {
        &self.config
    }

    /// Fail fast if the user is inside a lockout window
    pub fn ensure_unlocked(&self, user: &User) -> AccessResult<()> {
        match user.lockout().status(self.clock.now()) {
            LockStatus::Locked { until } => {
                debug!(user_id = user.id, %until, "Rejected attempt on locked account");
                Err(AccessError::AccountLocked)
            }
            LockStatus::Unlocked { .. } => Ok(()),
        }
    }

    /// Count one failed password check, opening a lockout window at the threshold
    pub async fn register_failure(&self, user: &User) -> AccessResult<LockoutState> {
        let mut current = user.lockout();

        for _ in 0..MAX_CAS_RETRIES {
            let now = self.clock.now();
            let next = current.after_failure(now, &self.config);
            if next == current {
                return Ok(next);
            }

            if self.store.compare_and_swap_lockout(user.id, &current, &next).await? {
                if let Some(until) = next.locked_until {
                    warn!(
                        user_id = user.id,
                        failed_attempts = next.failed_attempts,
                        %until,
                        "Account locked after repeated failed logins"
                    );
                } else {
                    debug!(user_id = user.id, failed_attempts = next.failed_attempts, "Recorded failed login");
                }
                return Ok(next);
            }

            current = self.reload(user.id).await?;
        }

        Err(self.contended(user.id))
    }

    /// Return the user to the unlocked state with a zero counter
    pub async fn register_success(&self, user: &User) -> AccessResult<()> {
        let mut current = user.lockout();

        for _ in 0..MAX_CAS_RETRIES {
            let next = current.after_success();
            if next == current {
                return Ok(());
            }

            if self.store.compare_and_swap_lockout(user.id, &current, &next).await? {
                debug!(user_id = user.id, "Reset failed login counter");
                return Ok(());
            }

            current = self.reload(user.id).await?;
        }

        Err(self.contended(user.id))
    }

    async fn reload(&self, user_id: EntityId) -> AccessResult<LockoutState> {
        let user = self.store.get_user(user_id).await?.ok_or_else(|| AccessError::not_found("user", user_id))?;
        Ok(user.lockout())
    }

    fn contended(&self, user_id: EntityId) -> AccessError {
        warn!(user_id, "Gave up updating lockout state under contention");
        AccessError::StorageUnavailable(StoreError::Conflict {
            message: format!("lockout state of user {user_id} kept changing"),
        })
    }
}
