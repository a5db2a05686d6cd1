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

//! Audit append and paginated listing

use crate::audit::statistics::{self, AuditStatistics, StatisticsQuery};
use crate::clock::Clock;
use crate::error::{AccessError, AccessResult};
use crate::models::{AuditRecord, AuditRow, EntityId, NewAuditRecord, ORIGIN_SERVICE};
use crate::store::{AuditRowFilter, EntityStore, WriteBatch, WriteOperation};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// Filters for the audit listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditQuery {
    /// Substring of the event kind
    pub event: Option<String>,
    /// Substring of the acting user's name
    pub actor_name: Option<String>,
}

/// One page of the audit listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditPage {
    pub rows: Vec<AuditRow>,
    /// Matching rows before pagination
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

impl AuditPage {
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(self.page_size)
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Writes and reads the audit ledger. Records are never updated or removed.
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn EntityStore>,
    clock: Arc<dyn Clock>,
    display_offset: FixedOffset,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn EntityStore>, clock: Arc<dyn Clock>, display_offset: FixedOffset) -> Self {
        Self {
            store,
            clock,
            display_offset,
        }
    }

    /// Audit append for this service, timestamped now, to be committed inside a caller's batch
    pub fn entry(&self, event: impl AsRef<str>, description: impl Into<String>, actor_user_id: EntityId) -> WriteOperation {
        WriteOperation::AppendAudit(NewAuditRecord {
            event: event.as_ref().to_string(),
            description: description.into(),
            user_id: actor_user_id,
            origin_service: ORIGIN_SERVICE.to_string(),
            date: self.clock.now(),
        })
    }

    /// Append one record on its own. A storage failure is reported as `AuditWriteFailed`.
    pub async fn record(
        &self,
        event: impl AsRef<str>,
        description: impl Into<String>,
        actor_user_id: EntityId,
        origin_service: &str,
        timestamp: DateTime<Utc>,
    ) -> AccessResult<AuditRecord> {
        let new_record = NewAuditRecord {
            event: event.as_ref().to_string(),
            description: description.into(),
            user_id: actor_user_id,
            origin_service: origin_service.to_string(),
            date: timestamp,
        };

        let outcome = match self.store.apply(WriteBatch::new().with(WriteOperation::AppendAudit(new_record.clone()))).await {
            Ok(outcome) => outcome,
            Err(source) => {
                error!(
                    user_id = actor_user_id,
                    event = %new_record.event,
                    origin_service = %new_record.origin_service,
                    error = %source,
                    "Failed to append audit record"
                );
                return Err(AccessError::AuditWriteFailed { source });
            }
        };

        let id = outcome.inserted_id(0).unwrap_or_default();
        debug!(audit_id = id, user_id = actor_user_id, event = %new_record.event, "Audit record appended");

        Ok(AuditRecord {
            id,
            event: new_record.event,
            description: new_record.description,
            user_id: new_record.user_id,
            origin_service: new_record.origin_service,
            date: new_record.date,
        })
    }

    /// One 1-based page of audit rows joined with actor names, in insertion order
    pub async fn query(&self, query: &AuditQuery, page: u64, page_size: u64) -> AccessResult<AuditPage> {
        if page == 0 || page_size == 0 {
            return Err(AccessError::InvalidQuery {
                message: format!("page and page size must be positive, got page {page} size {page_size}"),
            });
        }
        let offset = (page - 1).checked_mul(page_size).ok_or_else(|| AccessError::InvalidQuery {
            message: format!("page {page} is out of range"),
        })?;

        let filter = AuditRowFilter {
            event_contains: non_blank(&query.event),
            actor_name_contains: non_blank(&query.actor_name),
            offset,
            limit: page_size,
        };
        let (rows, total) = self.store.audit_rows(&filter).await?;

        Ok(AuditPage { rows, total, page, page_size })
    }

    /// Grouped counts of matching records plus the records themselves
    pub async fn statistics(&self, query: &StatisticsQuery) -> AccessResult<AuditStatistics> {
        let filter = query.to_filter(self.display_offset)?;
        let records = self.store.audit_records(&filter).await?;
        let groups = statistics::aggregate(&records, self.display_offset);

        debug!(groups = groups.len(), records = records.len(), "Computed audit statistics");
        Ok(AuditStatistics { groups, records })
    }
}
