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

//! Audit statistics grouped by event and origin service

use crate::error::{AccessError, AccessResult};
use crate::models::AuditRecord;
use crate::store::AuditRecordFilter;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Statistics filters as received from the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsQuery {
    /// Exact event kind
    pub event: Option<String>,
    /// Origin service, matched case-insensitively
    pub module: Option<String>,
    /// First day, `YYYY-MM-DD` in the display timezone
    pub start_date: Option<String>,
    /// Last day, included in full
    pub end_date: Option<String>,
}

/// Inclusive instant range covering whole days in the display timezone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    /// Range from the start of `start` to the last instant of `end`
    pub fn parse(start: &str, end: &str, offset: FixedOffset) -> AccessResult<Self> {
        let start_day = parse_day(start)?;
        let end_day = parse_day(end)?;

        if start_day > end_day {
            return Err(AccessError::InvalidDateRange {
                message: format!("start date {start_day} is after end date {end_day}"),
            });
        }

        let next_day = end_day.succ_opt().ok_or_else(|| AccessError::InvalidDateRange {
            message: format!("end date {end_day} is out of range"),
        })?;

        Ok(Self {
            from: start_of_day(start_day, offset)?,
            to: start_of_day(next_day, offset)? - Duration::nanoseconds(1),
        })
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from <= instant && instant <= self.to
    }
}

fn parse_day(value: &str) -> AccessResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| AccessError::InvalidDateRange {
        message: format!("'{value}' is not a YYYY-MM-DD date"),
    })
}

fn start_of_day(day: NaiveDate, offset: FixedOffset) -> AccessResult<DateTime<Utc>> {
    day.and_hms_opt(0, 0, 0)
        .and_then(|midnight| offset.from_local_datetime(&midnight).single())
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| AccessError::InvalidDateRange {
            message: format!("{day} has no midnight in the display timezone"),
        })
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl StatisticsQuery {
    /// Translate into a store filter. The date range applies only when both bounds are given,
    /// but any bound that is given must be a valid date.
    pub fn to_filter(&self, offset: FixedOffset) -> AccessResult<AuditRecordFilter> {
        let start = non_blank(&self.start_date);
        let end = non_blank(&self.end_date);

        if let Some(start) = start {
            parse_day(start)?;
        }
        if let Some(end) = end {
            parse_day(end)?;
        }

        let range = match (start, end) {
            (Some(start), Some(end)) => Some(DateRange::parse(start, end, offset)?),
            _ => None,
        };

        Ok(AuditRecordFilter {
            event: non_blank(&self.event).map(str::to_string),
            origin_service: non_blank(&self.module).map(str::to_string),
            from: range.map(|r| r.from),
            to: range.map(|r| r.to),
        })
    }
}

/// Aggregate row for one `(event, origin service)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsGroup {
    pub event: String,
    /// Origin service, upper-cased
    pub origin_service: String,
    pub total: u64,
    /// Latest record of the group in the display timezone
    pub last_event: DateTime<FixedOffset>,
    /// `last_event` as `YYYY-MM-DD HH:MM:SS`
    pub last_event_formatted: String,
}

/// Statistics result: aggregates plus the matching records for drill-down
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStatistics {
    pub groups: Vec<StatisticsGroup>,
    pub records: Vec<AuditRecord>,
}

/// Group records by event and upper-cased origin, sorted by event then origin
pub fn aggregate(records: &[AuditRecord], offset: FixedOffset) -> Vec<StatisticsGroup> {
    let mut groups: BTreeMap<(String, String), (u64, DateTime<Utc>)> = BTreeMap::new();

    for record in records {
        let key = (record.event.clone(), record.origin_service.to_uppercase());
        groups
            .entry(key)
            .and_modify(|(total, last)| {
                *total += 1;
                if record.date > *last {
                    *last = record.date;
                }
            })
            .or_insert((1, record.date));
    }

    groups
        .into_iter()
        .map(|((event, origin_service), (total, last))| {
            let last_event = last.with_timezone(&offset);
            StatisticsGroup {
                event,
                origin_service,
                total,
                last_event_formatted: last_event.format(TIMESTAMP_FORMAT).to_string(),
                last_event,
            }
        })
        .collect()
}
