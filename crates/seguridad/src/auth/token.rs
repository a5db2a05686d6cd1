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

//! Signed session tokens

use crate::clock::Clock;
use crate::config::TokenConfig;
use crate::error::{AccessError, AccessResult};
use crate::models::{EntityId, User};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,

    /// Display name
    pub name: String,

    pub email: String,

    /// Role names
    pub roles: Vec<String>,

    /// Effective permission names
    pub permissions: Vec<String>,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issuer
    pub iss: String,
}

impl Claims {
    pub fn new(user: &User, roles: Vec<String>, permissions: Vec<String>, issued_at: DateTime<Utc>, expires_in: Duration, issuer: &str) -> Self {
        Self {
            sub: user.id.to_string(),
            name: user.name.clone(),
            email: user.email.clone(),
            roles,
            permissions,
            iat: issued_at.timestamp(),
            exp: (issued_at + expires_in).timestamp(),
            iss: issuer.to_string(),
        }
    }

    pub fn user_id(&self) -> Option<EntityId> {
        self.sub.parse().ok()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// Minted session token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionToken {
    pub access_token: String,
    pub token_type: String,
    /// Seconds until expiry
    pub expires_in: u64,
    pub claims: Claims,
}

/// Creates and validates HS256 session tokens
#[derive(Clone)]
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    config: TokenConfig,
    clock: Arc<dyn Clock>,
}

impl TokenManager {
    pub fn new(config: TokenConfig, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        // Expiry is checked against the injected clock
        validation.validate_exp = false;

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            config,
            clock,
        }
    }

    /// Build claims for a user issued now
    pub fn claims_for(&self, user: &User, roles: Vec<String>, permissions: Vec<String>) -> Claims {
        Claims::new(user, roles, permissions, self.clock.now(), self.config.ttl(), &self.config.issuer)
    }

    pub fn create_token(&self, claims: &Claims) -> AccessResult<String> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)?)
    }

    /// Sign the claims and wrap them as a bearer session token
    pub fn issue(&self, claims: Claims) -> AccessResult<SessionToken> {
        let access_token = self.create_token(&claims)?;
        Ok(SessionToken {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.ttl_secs,
            claims,
        })
    }

    /// Check signature, issuer and expiry, returning the claims
    pub fn validate_token(&self, token: &str) -> AccessResult<Claims> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)?.claims;

        if claims.is_expired_at(self.clock.now()) {
            return Err(AccessError::Token(ErrorKind::ExpiredSignature.into()));
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: 42,
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            password_hash: String::new(),
            active: true,
            module_key: None,
            failed_attempts: 0,
            locked_until: None,
            reset_token_digest: None,
            reset_token_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn manager(clock: Arc<ManualClock>) -> TokenManager {
        let config = TokenConfig {
            secret: "test-secret".to_string(),
            ..Default::default()
        };
        TokenManager::new(config, clock)
    }

    #[test]
    fn test_round_trip_claims() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
        let manager = manager(clock);

        let claims = manager.claims_for(&user(), vec!["admin".to_string()], vec!["users.read".to_string()]);
        assert_eq!(claims.exp - claims.iat, 3600);

        let session = manager.issue(claims.clone()).unwrap();
        let decoded = manager.validate_token(&session.access_token).unwrap();

        assert_eq!(decoded, claims);
        assert_eq!(decoded.user_id(), Some(42));
        assert!(decoded.has_role("admin"));
        assert!(decoded.has_permission("users.read"));
    }

    #[test]
    fn test_expired_token_rejected() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
        let manager = manager(clock.clone());
        let session = manager.issue(manager.claims_for(&user(), vec![], vec![])).unwrap();

        clock.advance(Duration::hours(1));
        assert!(matches!(manager.validate_token(&session.access_token), Err(AccessError::Token(_))));
    }

    #[test]
    fn test_foreign_secret_rejected() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let session = manager(clock.clone()).issue(manager(clock.clone()).claims_for(&user(), vec![], vec![])).unwrap();

        let other = TokenManager::new(
            TokenConfig {
                secret: "other-secret".to_string(),
                ..Default::default()
            },
            clock,
        );
        assert!(other.validate_token(&session.access_token).is_err());
    }
}
