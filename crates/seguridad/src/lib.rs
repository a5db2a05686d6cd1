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

//! Seguridad access-control and audit engine
//!
//! Authenticates principals with progressive lockout, resolves module-scoped
//! role-based permissions, and keeps an append-only audit ledger with
//! paginated listing and statistics. Storage, delivery of notifications and
//! transport are injected collaborators.

pub mod audit;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod notify;
pub mod rbac;
pub mod service;
pub mod store;

pub use config::Config;
pub use error::{AccessError, AccessResult};
pub use service::SecurityService;
