//! Evergreen CLI - inspect and manage the persisted session slot.
//!
//! Talks to the slot file, not to the daemon: a running daemon notices
//! slot changes through its liveness poll and adopts or tears down the
//! session accordingly.
//!
//! # Usage
//!
//! ```bash
//! # Show the persisted session
//! evergreen status
//!
//! # Write a session obtained from the identity server
//! evergreen login --token tok-abc --user-id usr-1 \
//!     --email maya@pennyworth.app --name "Maya Lindqvist"
//!
//! # Clear the slot
//! evergreen logout
//! ```

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use evergreen_core::{SessionRecord, UserProfile};
use evergreend::SessionStore;

/// Evergreen CLI - session slot management
#[derive(Parser, Debug)]
#[command(name = "evergreen", version, about)]
struct Args {
    /// Path of the persisted session slot
    #[arg(long, global = true)]
    state_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the persisted session
    Status,
    /// Write a session to the slot
    Login {
        /// Access token issued by the identity server
        #[arg(long)]
        token: String,

        /// User identifier
        #[arg(long)]
        user_id: String,

        /// User email
        #[arg(long)]
        email: String,

        /// User display name
        #[arg(long)]
        name: String,

        /// Validity in seconds
        #[arg(long, default_value_t = 3_600)]
        expires_in: i64,
    },
    /// Clear the slot
    Logout,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("evergreend=warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let store = SessionStore::new(
        args.state_path
            .clone()
            .unwrap_or_else(SessionStore::default_path),
    );

    match args.command {
        Command::Status => {
            let code = print_status(&store);
            process::exit(code);
        }
        Command::Login {
            token,
            user_id,
            email,
            name,
            expires_in,
        } => {
            let user = UserProfile::new(user_id, email, name);
            let record =
                SessionRecord::issued(token, user, expires_in, Utc::now().timestamp_millis());
            store.try_set(&record)?;
            println!(
                "Session for {} written to {}",
                record.user,
                store.path().display()
            );
            println!("A running daemon adopts it within its poll interval.");
            Ok(())
        }
        Command::Logout => {
            store.try_clear()?;
            println!("Session slot cleared.");
            Ok(())
        }
    }
}

fn print_status(store: &SessionStore) -> i32 {
    let Some(record) = store.get() else {
        println!("No session.");
        return 1;
    };

    println!("User:    {}", record.user);
    println!("Token:   {}", redact(&record.access_token));
    match DateTime::<Utc>::from_timestamp_millis(record.expires_at) {
        Some(at) => println!("Expires: {}", at.to_rfc3339()),
        None => println!("Expires: {} (epoch ms)", record.expires_at),
    }

    let now_ms = Utc::now().timestamp_millis();
    if record.is_valid(now_ms) {
        let minutes = record.time_until_expiry(now_ms) / 60_000;
        println!("Status:  valid ({minutes} minutes left)");
        0
    } else {
        println!("Status:  expired");
        1
    }
}

fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{prefix}...")
}
