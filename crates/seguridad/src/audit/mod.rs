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

//! Append-only audit ledger with paginated listing and statistics

pub mod recorder;
pub mod statistics;

pub use recorder::{AuditPage, AuditQuery, AuditRecorder};
pub use statistics::{AuditStatistics, DateRange, StatisticsGroup, StatisticsQuery};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Event kinds this service writes. Other services may log free-text kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditEvent {
    Insert,
    Update,
    Delete,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEvent::Insert => "INSERT",
            AuditEvent::Update => "UPDATE",
            AuditEvent::Delete => "DELETE",
        }
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for AuditEvent {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl FromStr for AuditEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(AuditEvent::Insert),
            "UPDATE" => Ok(AuditEvent::Update),
            "DELETE" => Ok(AuditEvent::Delete),
            other => Err(format!("unknown audit event '{other}'")),
        }
    }
}
