//! Inspect recorded replay sessions.
//!
//! `list` prints the sessions in a directory, `show` prints one
//! session's interactions, and `check` decodes every session file and exits
//! non-zero if any is corrupt.

#![forbid(unsafe_code)]

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use cloudreplay::config::{HarnessConfig, REPLAY_ENV_DIR};
use cloudreplay::store::{FileSessionStore, SessionStore};
use cloudreplay::Session;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "session_inspect")]
#[command(about = "List, show and validate recorded replay sessions")]
struct Args {
    /// Session directory (default: $REPLAY_SESSION_DIR or tests/fixtures/replay).
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every recorded session with its provider and size.
    List,
    /// Print one session's annotations and interactions.
    Show {
        name: String,
        /// Print the session as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },
    /// Decode every session file; exit non-zero if any is corrupt.
    Check,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let dir = match args.dir {
        Some(dir) => dir,
        None => {
            HarnessConfig::from_env()
                .with_context(|| format!("read {REPLAY_ENV_DIR}"))?
                .session_dir
        }
    };
    let store = FileSessionStore::new(dir);

    match args.command {
        Command::List => {
            for name in store.list().context("list sessions")? {
                match store.load(&name) {
                    Ok(session) => println!(
                        "{name}\t{}\t{} interactions",
                        session.provider,
                        session.len()
                    ),
                    Err(_) => println!("{name}\t<corrupt>"),
                }
            }
        }
        Command::Show { name, json } => {
            let session = store
                .load(&name)
                .with_context(|| format!("load session {name}"))?;
            if json {
                let bytes = cloudreplay::store::encode_session(&session)
                    .context("encode session")?;
                print!("{}", String::from_utf8_lossy(&bytes));
            } else {
                print_session(&session);
            }
        }
        Command::Check => {
            let names = store.list().context("list sessions")?;
            let mut corrupt = 0usize;
            for name in &names {
                match store.load(name) {
                    Ok(session) => println!("ok      {name} ({} interactions)", session.len()),
                    Err(err) => {
                        corrupt += 1;
                        println!("CORRUPT {name}: {err}");
                    }
                }
            }
            if corrupt > 0 {
                bail!(
                    "{corrupt} of {} sessions in {} failed to decode",
                    names.len(),
                    store.dir().display()
                );
            }
        }
    }
    Ok(())
}

fn print_session(session: &Session) {
    println!("session:     {}", session.name);
    println!("provider:    {}", session.provider);
    println!("recorded_at: {}", session.recorded_at);
    for (key, value) in &session.annotations {
        println!("annotation:  {key} = {value}");
    }
    for (index, interaction) in session.interactions.iter().enumerate() {
        println!(
            "[{index:>3}] {} -> {}",
            interaction.request.debug_key(),
            interaction.outcome.summary()
        );
    }
}
