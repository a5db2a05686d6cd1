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

//! Unit of work: a batch of writes committed all-or-nothing

use crate::models::{EntityId, NewAuditRecord, NewPermission, NewUser};
use chrono::{DateTime, Utc};

/// Write operation types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOperation {
    /// Create a user together with its initial role assignments
    InsertUser { user: NewUser, role_ids: Vec<EntityId> },
    InsertPermission(NewPermission),
    /// Create a user-role join record
    InsertUserRole { user_id: EntityId, role_id: EntityId },
    /// Remove a user-role join record. With `must_exist` the batch fails with
    /// `StoreError::Conflict` when no row matches.
    DeleteUserRole { user_id: EntityId, role_id: EntityId, must_exist: bool },
    /// Create a role-permission join record
    InsertRolePermission { role_id: EntityId, permission_id: EntityId },
    /// Remove a role-permission join record, conditional like `DeleteUserRole`
    DeleteRolePermission {
        role_id: EntityId,
        permission_id: EntityId,
        must_exist: bool,
    },
    /// Move a permission under another module
    SetPermissionModule { permission_id: EntityId, module_id: EntityId },
    SetUserActive { user_id: EntityId, active: bool },
    SetRoleActive { role_id: EntityId, active: bool },
    SetModuleActive { module_id: EntityId, active: bool },
    /// Store a pending password-reset token digest
    SetResetToken {
        user_id: EntityId,
        digest: String,
        expires_at: DateTime<Utc>,
    },
    /// Replace the password hash, clearing any reset token and lockout state.
    /// Fails the batch with `StoreError::Conflict` unless the user still holds
    /// the reset token digest `expected_digest`.
    SetCredentials {
        user_id: EntityId,
        password_hash: String,
        expected_digest: String,
    },
    /// Append one audit record
    AppendAudit(NewAuditRecord),
}

/// Result of one operation inside a committed batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// A row was created with this id
    Inserted(EntityId),
    /// Number of rows updated or removed
    Affected(u64),
}

/// Results of a committed batch, in operation order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub results: Vec<OperationResult>,
}

impl BatchOutcome {
    /// Id created by the operation at `index`, if it was an insert
    pub fn inserted_id(&self, index: usize) -> Option<EntityId> {
        match self.results.get(index) {
            Some(OperationResult::Inserted(id)) => Some(*id),
            _ => None,
        }
    }

    /// Rows touched by the operation at `index`; inserts count as one
    pub fn rows_affected(&self, index: usize) -> u64 {
        match self.results.get(index) {
            Some(OperationResult::Inserted(_)) => 1,
            Some(OperationResult::Affected(rows)) => *rows,
            None => 0,
        }
    }
}

/// Ordered list of writes the store applies atomically
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    operations: Vec<WriteOperation>,
}

impl WriteBatch {
    /// Create a new, empty write batch
    pub fn new() -> Self {
        Self { operations: Vec::new() }
    }

    /// Add an operation, returning its index in the batch
    pub fn push(&mut self, operation: WriteOperation) -> usize {
        self.operations.push(operation);
        self.operations.len() - 1
    }

    /// Add an operation, builder style
    pub fn with(mut self, operation: WriteOperation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Get the number of operations in the batch
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Check if the batch is empty
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Whether any operation appends to the audit ledger
    pub fn contains_audit(&self) -> bool {
        self.operations.iter().any(|op| matches!(op, WriteOperation::AppendAudit(_)))
    }

    pub fn operations(&self) -> &[WriteOperation] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<WriteOperation> {
        self.operations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_indices_follow_push_order() {
        let mut batch = WriteBatch::new();
        assert!(batch.is_empty());

        let first = batch.push(WriteOperation::InsertUserRole { user_id: 1, role_id: 2 });
        let second = batch.push(WriteOperation::SetUserActive { user_id: 1, active: false });

        assert_eq!((first, second), (0, 1));
        assert_eq!(batch.len(), 2);
        assert!(!batch.contains_audit());
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome = BatchOutcome {
            results: vec![OperationResult::Inserted(7), OperationResult::Affected(0)],
        };

        assert_eq!(outcome.inserted_id(0), Some(7));
        assert_eq!(outcome.inserted_id(1), None);
        assert_eq!(outcome.rows_affected(0), 1);
        assert_eq!(outcome.rows_affected(1), 0);
        assert_eq!(outcome.rows_affected(5), 0);
    }
}
