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

//! Error taxonomy for the access-control and audit engine

use crate::store::StoreError;
use thiserror::Error;

/// Errors surfaced by the engine to the transport layer
#[derive(Error, Debug)]
pub enum AccessError {
    /// Unknown email or wrong password; the two cases are indistinguishable on purpose
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("The account is temporarily locked. Try again later")]
    AccountLocked,

    #[error("The account is inactive")]
    AccountInactive,

    #[error("No access to module '{module_key}'")]
    ModuleAccessDenied { module_key: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{child} {child_id} is already assigned to {parent} {parent_id}")]
    DuplicateAssignment {
        parent: &'static str,
        parent_id: u64,
        child: &'static str,
        child_id: u64,
    },

    #[error("{entity} with {field} '{value}' already exists")]
    AlreadyExists {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Module {module_id} is inactive and cannot receive new permissions")]
    InactiveModule { module_id: u64 },

    #[error("Invalid date range: {message}")]
    InvalidDateRange { message: String },

    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },

    /// The primary action committed but its audit record could not be written
    #[error("Operation succeeded but could not be audited: {source}")]
    AuditWriteFailed {
        #[source]
        source: StoreError,
    },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[source] StoreError),

    #[error("Invalid or expired reset token")]
    InvalidResetToken,

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Password hashing error: {message}")]
    PasswordHash { message: String },

    #[error("Notification error: {message}")]
    Notification { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AccessError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        AccessError::NotFound { entity, id: id.to_string() }
    }

    /// Stable identifier for the transport layer to map onto its own status codes
    pub fn error_type(&self) -> &'static str {
        match self {
            AccessError::InvalidCredentials => "invalid_credentials",
            AccessError::AccountLocked => "account_locked",
            AccessError::AccountInactive => "account_inactive",
            AccessError::ModuleAccessDenied { .. } => "module_access_denied",
            AccessError::NotFound { .. } => "not_found",
            AccessError::DuplicateAssignment { .. } => "duplicate_assignment",
            AccessError::AlreadyExists { .. } => "already_exists",
            AccessError::InactiveModule { .. } => "inactive_module",
            AccessError::InvalidDateRange { .. } => "invalid_date_range",
            AccessError::InvalidQuery { .. } => "invalid_query",
            AccessError::AuditWriteFailed { .. } => "audit_write_failed",
            AccessError::StorageUnavailable(_) => "storage_unavailable",
            AccessError::InvalidResetToken => "invalid_reset_token",
            AccessError::Token(_) => "token_error",
            AccessError::PasswordHash { .. } => "password_hash_error",
            AccessError::Notification { .. } => "notification_error",
            AccessError::Configuration { .. } => "configuration_error",
            AccessError::Internal { .. } => "internal_error",
        }
    }

    /// True when the primary action committed but the audit trail is missing its record
    pub fn is_audit_failure(&self) -> bool {
        matches!(self, AccessError::AuditWriteFailed { .. })
    }

    /// Authentication failures a caller may show to the end user verbatim
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            AccessError::InvalidCredentials | AccessError::AccountLocked | AccessError::AccountInactive | AccessError::ModuleAccessDenied { .. }
        )
    }
}

impl From<StoreError> for AccessError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => AccessError::NotFound { entity, id: id.to_string() },
            other => AccessError::StorageUnavailable(other),
        }
    }
}

/// Result type for engine operations
pub type AccessResult<T> = Result<T, AccessError>;
