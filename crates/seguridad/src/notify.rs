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

//! Outbound notifications

use crate::error::AccessResult;
use async_trait::async_trait;
use tracing::info;

/// Delivery channel for messages to end users (email in production)
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: &str, subject: &str, body: &str) -> AccessResult<()>;
}

/// Notifier that only logs; used when no delivery channel is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, recipient: &str, subject: &str, _body: &str) -> AccessResult<()> {
        // Body may carry a reset link, keep it out of the logs
        info!(recipient, subject, "Notification dispatched");
        Ok(())
    }
}
