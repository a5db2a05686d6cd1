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

use anyhow::Result;
use clap::{Parser, Subcommand};
use seguridad::auth::{PasswordService, TokenManager};
use seguridad::clock::SystemClock;
use seguridad::{Config, logging};
use std::sync::Arc;

/// Operator tooling for the seguridad service
#[derive(Parser, Debug)]
#[command(name = "seguridad", about = "Access-control and audit engine tooling")]
pub struct Cli {
    /// Log level (overrides $SEGURIDAD_LOG_LEVEL)
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print an Argon2id hash of a password for seeding user records
    HashPassword {
        password: String,
    },

    /// Validate a session token with the configured secret and print its claims
    InspectToken {
        token: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    logging::init(&config)?;

    match cli.command {
        Commands::HashPassword { password } => {
            let passwords = PasswordService::new(&config.password)?;
            println!("{}", passwords.hash(&password)?);
        }
        Commands::InspectToken { token } => {
            config.validate()?;
            let tokens = TokenManager::new(config.token.clone(), Arc::new(SystemClock));
            let claims = tokens.validate_token(&token)?;
            println!("{}", serde_json::to_string_pretty(&claims)?);
        }
    }

    Ok(())
}
