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

//! Argon2id password hashing

use crate::config::PasswordConfig;
use crate::error::{AccessError, AccessResult};
use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use rand::RngCore;
use std::sync::{Arc, OnceLock};
use tokio::task;

const SALT_LEN: usize = 16;

fn hash_error(err: argon2::password_hash::Error) -> AccessError {
    AccessError::PasswordHash { message: err.to_string() }
}

fn join_error(err: task::JoinError) -> AccessError {
    AccessError::Internal {
        message: format!("password hashing task failed: {err}"),
    }
}

/// Hashes and verifies passwords as PHC strings
///
/// The `spawn_*` variants run the same work on tokio's blocking pool so an
/// Argon2 pass never stalls a runtime worker.
#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
    dummy_hash: Arc<OnceLock<String>>,
}

impl std::fmt::Debug for PasswordService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordService").field("params", self.argon2.params()).finish()
    }
}

impl PasswordService {
    pub fn new(config: &PasswordConfig) -> AccessResult<Self> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None).map_err(|e| AccessError::Configuration {
            message: format!("invalid argon2 parameters: {e}"),
        })?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            dummy_hash: Arc::new(OnceLock::new()),
        })
    }

    /// Hash a password with a fresh random salt
    pub fn hash(&self, password: &str) -> AccessResult<String> {
        let mut salt_bytes = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes).map_err(hash_error)?;

        let hash = self.argon2.hash_password(password.as_bytes(), &salt).map_err(hash_error)?;
        Ok(hash.to_string())
    }

    /// Constant-time comparison of a password against a stored PHC string
    pub fn verify(&self, password: &str, stored_hash: &str) -> AccessResult<bool> {
        let parsed = PasswordHash::new(stored_hash).map_err(hash_error)?;

        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(hash_error(e)),
        }
    }

    /// Spend the same work as a real verification; used when the email is unknown
    pub fn verify_dummy(&self, password: &str) {
        let dummy = self.dummy_hash.get_or_init(|| self.hash("dummy-password-never-matches").unwrap_or_default());
        if !dummy.is_empty() {
            let _ = self.verify(password, dummy);
        }
    }

    pub async fn spawn_hash(&self, password: &str) -> AccessResult<String> {
        let service = self.clone();
        let password = password.to_string();
        task::spawn_blocking(move || service.hash(&password)).await.map_err(join_error)?
    }

    pub async fn spawn_verify(&self, password: &str, stored_hash: &str) -> AccessResult<bool> {
        let service = self.clone();
        let (password, stored_hash) = (password.to_string(), stored_hash.to_string());
        task::spawn_blocking(move || service.verify(&password, &stored_hash)).await.map_err(join_error)?
    }

    pub async fn spawn_verify_dummy(&self, password: &str) -> AccessResult<()> {
        let service = self.clone();
        let password = password.to_string();
        task::spawn_blocking(move || service.verify_dummy(&password)).await.map_err(join_error)
    }
}
