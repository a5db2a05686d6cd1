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

//! Configuration management for the security service

use crate::error::{AccessError, AccessResult};
use chrono::{Duration, FixedOffset};
use std::env;
use std::str::FromStr;

const DEFAULT_JWT_SECRET: &str = "default-secret-change-in-production";

/// Ceiling for token lifetimes, lockout windows and reset links (ten years)
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Seconds as a `Duration`, saturating at [`MAX_DURATION_SECS`]
fn bounded_seconds(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_DURATION_SECS) as i64)
}

fn ensure_duration(name: &str, secs: u64) -> AccessResult<()> {
    if secs == 0 || secs > MAX_DURATION_SECS {
        return Err(AccessError::Configuration {
            message: format!("{name} must be between 1 and {MAX_DURATION_SECS} seconds, got {secs}"),
        });
    }
    Ok(())
}

/// Progressive lockout tunables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockoutConfig {
    /// Consecutive failures that open a lockout window
    pub max_attempts: u32,

    /// Length of the lockout window in seconds
    pub lock_duration_secs: u64,
}

impl LockoutConfig {
    pub fn lock_duration(&self) -> Duration {
        bounded_seconds(self.lock_duration_secs)
    }
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            lock_duration_secs: 15 * 60,
        }
    }
}

/// Argon2id cost parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Session token settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    /// HS256 signing secret
    pub secret: String,

    /// Token lifetime in seconds
    pub ttl_secs: u64,

    /// Value of the `iss` claim
    pub issuer: String,
}

impl TokenConfig {
    pub fn ttl(&self) -> Duration {
        bounded_seconds(self.ttl_secs)
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: DEFAULT_JWT_SECRET.to_string(),
            ttl_secs: 3600,
            issuer: "seguridad".to_string(),
        }
    }
}

/// Configuration for the security service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub token: TokenConfig,

    pub lockout: LockoutConfig,

    pub password: PasswordConfig,

    /// Offset of the reporting timezone from UTC, in seconds
    pub display_utc_offset_secs: i32,

    /// Password-reset token lifetime in seconds
    pub reset_token_ttl_secs: u64,

    /// Base URL the reset token is appended to in the reset notice
    pub reset_url: String,

    /// Default tracing filter
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: TokenConfig::default(),
            lockout: LockoutConfig::default(),
            password: PasswordConfig::default(),
            display_utc_offset_secs: -5 * 3600,
            reset_token_ttl_secs: 30 * 60,
            reset_url: "http://localhost:3000/reset-password".to_string(),
            log_level: "info".to_string(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            token: TokenConfig {
                secret: env::var("SEGURIDAD_JWT_SECRET").unwrap_or(defaults.token.secret),
                ttl_secs: env_or("SEGURIDAD_TOKEN_TTL_SECS", defaults.token.ttl_secs),
                issuer: env::var("SEGURIDAD_TOKEN_ISSUER").unwrap_or(defaults.token.issuer),
            },

            lockout: LockoutConfig {
                max_attempts: env_or("SEGURIDAD_MAX_FAILED_ATTEMPTS", defaults.lockout.max_attempts),
                lock_duration_secs: env_or("SEGURIDAD_LOCK_DURATION_SECS", defaults.lockout.lock_duration_secs),
            },

            password: PasswordConfig {
                memory_kib: env_or("SEGURIDAD_ARGON2_MEMORY_KIB", defaults.password.memory_kib),
                iterations: env_or("SEGURIDAD_ARGON2_ITERATIONS", defaults.password.iterations),
                parallelism: env_or("SEGURIDAD_ARGON2_PARALLELISM", defaults.password.parallelism),
            },

            display_utc_offset_secs: env_or("SEGURIDAD_DISPLAY_UTC_OFFSET_SECS", defaults.display_utc_offset_secs),

            reset_token_ttl_secs: env_or("SEGURIDAD_RESET_TOKEN_TTL_SECS", defaults.reset_token_ttl_secs),

            reset_url: env::var("SEGURIDAD_RESET_URL").unwrap_or(defaults.reset_url),

            log_level: env::var("SEGURIDAD_LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    /// Reject settings the engine cannot run safely with
    pub fn validate(&self) -> AccessResult<()> {
        if self.token.secret.is_empty() || self.token.secret == DEFAULT_JWT_SECRET {
            return Err(AccessError::Configuration {
                message: "SEGURIDAD_JWT_SECRET must be set to a non-default value".to_string(),
            });
        }
        ensure_duration("token lifetime", self.token.ttl_secs)?;
        ensure_duration("lock duration", self.lockout.lock_duration_secs)?;
        ensure_duration("reset token lifetime", self.reset_token_ttl_secs)?;
        if self.lockout.max_attempts == 0 {
            return Err(AccessError::Configuration {
                message: "max failed attempts must be at least 1".to_string(),
            });
        }
        self.display_offset()?;
        Ok(())
    }

    /// Fixed timezone used for statistics boundaries and rendered timestamps
    pub fn display_offset(&self) -> AccessResult<FixedOffset> {
        FixedOffset::east_opt(self.display_utc_offset_secs).ok_or_else(|| AccessError::Configuration {
            message: format!("display offset {}s is out of range", self.display_utc_offset_secs),
        })
    }

    pub fn reset_token_ttl(&self) -> Duration {
        bounded_seconds(self.reset_token_ttl_secs)
    }
}
