use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

mod auth;

#[cfg(test)]
mod tests;

pub use auth::{AuthArgs, AuthCommand};

#[derive(Debug, Parser)]
#[command(name = "enquete")]
#[command(about = "Resumable renovation questionnaire", version)]
pub struct Cli {
    /// Directory holding the database, resume slot and journal.
    #[arg(long, default_value = ".enquete")]
    pub root: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the questionnaire interactively, resuming any pending session.
    Run,
    /// Show the resume slot, the referenced session and the answer count.
    Status,
    /// Print the summary of a completed or in-progress session.
    Result(ResultArgs),
    /// Complete the cached pending session with the signed-in identity.
    Finalize,
    /// Abandon local progress by clearing the resume slot.
    Reset,
    /// Manage local accounts.
    Auth(AuthArgs),
}

#[derive(Debug, Args)]
pub struct ResultArgs {
    /// Session id; defaults to the session in the resume slot.
    #[arg(long)]
    pub session: Option<String>,
}
