// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Operator-only secret management. Never exposed over HTTP.
//!
//! Keys are read from stdin rather than the command line so they stay out of
//! shell history.
//!
//! The database file is locked by whichever process opens it first. Stop the
//! `balance-reloader` server before running any subcommand, otherwise every
//! subcommand fails with "database ... is in use by another process".

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use balance_reloader::config::{Config, ALIAS_CACHE_CAPACITY};
use balance_reloader::secrets::{SecretError, SecretKey, SecretStore};
use balance_reloader::storage::{AliasCache, Database, StoreError, TransactionLog};
use balance_reloader::telemetry::init_tracing;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "secrets-admin", version, about = "Manage balance reloader secrets")]
struct Args {
    /// Data directory (defaults to DATA_DIR or ./data)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Delete every secret and store new site credentials under a fresh key
    Reset,
    /// Decrypt and print every stored secret document
    Read,
    /// Add cards interactively until end of input
    AddCards,
    /// Print recent batches with full card numbers
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Debug, thiserror::Error)]
enum AdminError {
    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Aborted")]
    Aborted,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    init_tracing(config.log_format);

    match run(args.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, config: &Config) -> Result<(), AdminError> {
    let database = Arc::new(Database::open(&config.database_path())?);
    let secrets = SecretStore::new(
        database.clone(),
        Arc::new(AliasCache::new(ALIAS_CACHE_CAPACITY)),
    );

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut out = io::stdout().lock();

    match command {
        Command::Reset => reset(&secrets, &mut input, &mut out),
        Command::Read => {
            let key = read_key(&mut input, &mut out)?;
            read(&secrets, &key, &mut out)
        }
        Command::AddCards => {
            let key = read_key(&mut input, &mut out)?;
            add_cards(&secrets, &key, &mut input, &mut out)
        }
        Command::History { limit } => history(database.as_ref(), limit, &mut out),
    }
}

/// Print `label` and read one trimmed line. `None` on end of input.
fn prompt(input: &mut impl BufRead, out: &mut impl Write, label: &str) -> io::Result<Option<String>> {
    write!(out, "{label}: ")?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn read_key(input: &mut impl BufRead, out: &mut impl Write) -> Result<SecretKey, AdminError> {
    let raw = prompt(input, out, "Key")?.ok_or(AdminError::Aborted)?;
    Ok(SecretKey::parse(&raw).map_err(SecretError::from)?)
}

fn reset(
    secrets: &SecretStore,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<(), AdminError> {
    writeln!(out, "This permanently deletes every stored secret.")?;
    let confirm = prompt(input, out, "Type 'yes' to continue")?;
    if confirm.as_deref() != Some("yes") {
        return Err(AdminError::Aborted);
    }
    let username = prompt(input, out, "Username")?.ok_or(AdminError::Aborted)?;
    let password = prompt(input, out, "Password")?.ok_or(AdminError::Aborted)?;

    let key = secrets.reset_all(&username, &password)?;
    writeln!(out, "New key (shown once, store it now):")?;
    writeln!(out, "{}", key.encode())?;
    Ok(())
}

fn read(secrets: &SecretStore, key: &SecretKey, out: &mut impl Write) -> Result<(), AdminError> {
    let exported = secrets.export(key)?;
    serde_json::to_writer_pretty(&mut *out, &exported)?;
    writeln!(out)?;
    Ok(())
}

fn add_cards(
    secrets: &SecretStore,
    key: &SecretKey,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<(), AdminError> {
    // A wrong key fails here, before any card is typed in.
    secrets.credentials(key)?;

    loop {
        let Some(name) = prompt(input, out, "Card name")? else {
            break;
        };
        let Some(number) = prompt(input, out, "Card number")? else {
            break;
        };
        match secrets.add_card(key, &name, &number) {
            Ok(card) => writeln!(out, "Added {name} ({card})")?,
            Err(SecretError::Validation(e)) => writeln!(out, "Rejected: {e}")?,
            Err(e) => return Err(e.into()),
        }
    }
    writeln!(out)?;
    Ok(())
}

fn history(log: &dyn TransactionLog, limit: usize, out: &mut impl Write) -> Result<(), AdminError> {
    for transaction in log.recent(limit)? {
        serde_json::to_writer(&mut *out, &transaction)?;
        writeln!(out)?;
    }
    Ok(())
}
