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

use crate::config::Config;
use crate::error::{AccessError, AccessResult};
use tracing::{Level, info};

/// Install the global fmt subscriber at the configured level. Output goes to stderr.
pub fn init(config: &Config) -> AccessResult<()> {
    let level: Level = config.log_level.trim().parse().map_err(|_| AccessError::Configuration {
        message: format!("unknown log level '{}'", config.log_level),
    })?;

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AccessError::Configuration {
            message: format!("failed to install subscriber: {e}"),
        })?;

    info!(%level, "Logging initialized");
    Ok(())
}
