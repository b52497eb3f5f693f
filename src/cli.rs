//! Command-line interface definitions
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::connection::ConnectionOverrides;

/// bullview - BullMQ queue dashboard
///
/// Inspect and operate BullMQ job queues stored in Redis.
#[derive(Parser, Debug)]
#[command(name = "bullview")]
#[command(version)]
#[command(about = "Terminal dashboard for BullMQ job queues in Redis")]
#[command(disable_help_flag = true)]
#[command(after_help = "\
CONNECTION:
  Flags override REDIS_URL, which overrides the [connection] section of
  $XDG_CONFIG_HOME/bullview/config.toml. Default: localhost:6379, db 0.

DASHBOARD KEYS:
  Tab            Switch between queues and jobs
  Up/Down, j/k   Move selection
  Enter          Open queue / inspect job
  Esc            Close detail, then go back
  a              Add queue (queues panel) or job (jobs panel)
  p  d  c  x     Pause/resume, drain, clean completed, delete queue
  h/l, Left/Right  Cycle job state filter
  r  x           Retry / remove job (jobs panel)
  R              Refresh now
  q, Ctrl+C      Quit

EXAMPLES:
  bullview                       Open the dashboard
  bullview -h redis.local -p 6380
  bullview queues --json         Print queue counters once
  bullview jobs orders --state failed")]
pub struct Args {
    /// Redis host
    #[arg(short = 'h', long, global = true)]
    pub host: Option<String>,

    /// Redis port
    #[arg(short = 'p', long, global = true)]
    pub port: Option<u16>,

    /// Redis password
    #[arg(short = 'P', long, global = true)]
    pub password: Option<String>,

    /// Redis logical database
    #[arg(short = 'd', long, global = true)]
    pub db: Option<i64>,

    /// BullMQ key prefix
    #[arg(long, global = true)]
    pub prefix: Option<String>,

    /// Write dashboard logs here instead of the XDG state directory
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Print help
    #[arg(long, action = clap::ArgAction::Help, global = true)]
    pub help: Option<bool>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Args {
    /// Connection flags given on the command line
    #[must_use]
    pub fn overrides(&self) -> ConnectionOverrides {
        ConnectionOverrides {
            host: self.host.clone(),
            port: self.port,
            password: self.password.clone(),
            db: self.db,
            prefix: self.prefix.clone(),
        }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open the interactive dashboard (default)
    #[command(disable_help_flag = true)]
    Tui,

    /// Print every queue with its counters
    #[command(disable_help_flag = true)]
    Queues {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the newest jobs of one queue
    #[command(disable_help_flag = true)]
    Jobs {
        /// Queue name
        queue: String,

        /// Only jobs in this state (waiting, active, completed, failed, delayed, all)
        #[arg(long, short = 's', default_value = "all")]
        state: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the resolved configuration
    #[command(disable_help_flag = true)]
    Config,
}
