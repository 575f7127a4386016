//! Command-line interface parsing for JournalSync
//!
//! Flags select the configuration files, the cache behaviour and the log
//! verbosity; an optional subcommand picks what to do (sync by default).

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// JournalSync - copy a Monica journal into a Zim notebook
#[derive(Parser, Debug)]
#[command(name = "journalsync")]
#[command(about = "Sync a Monica journal into a Zim notebook, one page per date")]
#[command(version)]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, value_name = "PATH", default_value = "config.yaml")]
    pub config: PathBuf,

    /// File holding secrets not found in the environment
    #[arg(long, value_name = "PATH", default_value = "secrets/config.yaml")]
    pub secrets: PathBuf,

    /// Always query the API, ignoring and not updating the response cache
    #[arg(long)]
    pub no_cache: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// What to do once configured
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Command {
    /// Write one page per journal date, overwriting existing pages
    #[default]
    Sync,
    /// Show the journal's dates and how many entries each has
    List,
    /// Show entry titles per date
    Titles,
    /// Check that the API answers
    Check,
    /// Show journal pages already in the notebook
    Pages,
}

impl Cli {
    /// The subcommand, `sync` when none was given
    pub fn command(&self) -> Command {
        self.command.unwrap_or_default()
    }

    /// Default `tracing` filter for the chosen verbosity
    ///
    /// `RUST_LOG` takes precedence when set.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "journalsync=info",
            1 => "journalsync=debug",
            _ => "journalsync=trace",
        }
    }
}
