//! `bullview` - terminal dashboard for BullMQ queues
//!
//! Inspects and operates a Redis-backed job-queue cluster that uses the BullMQ key layout.
//!
//! # Features
//! - Queue list with per-state counters and pause flag
//! - Job list per queue, filtered by state, with detail and log view
//! - Queue control: create, pause/resume, drain, clean, delete
//! - Job control: add, retry, remove
//! - Connected worker overview from the Redis client list
//!
//! The data layer ([`gateway`]) is a set of async traits so that the
//! interactive core ([`poller`], `tui`) can be driven by any backend.

pub mod cli;
pub mod commands;
pub mod config;
pub mod connection;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod poller;
pub mod style;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export commonly used types for convenience
pub use cli::Args;
pub use config::Config;
pub use connection::{ConnectionConfig, RedisHandle};

#[allow(clippy::needless_raw_string_hashes, clippy::doc_markdown)]
mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Version string shown in `--version` output and the TUI header
///
/// Includes the short git hash when the binary was built from a checkout.
#[must_use]
pub fn version_string() -> String {
    match built_info::GIT_COMMIT_HASH_SHORT {
        Some(hash) if built_info::GIT_DIRTY == Some(true) => {
            format!("v{} ({hash}-dirty)", built_info::PKG_VERSION)
        }
        Some(hash) => format!("v{} ({hash})", built_info::PKG_VERSION),
        None => format!("v{}", built_info::PKG_VERSION),
    }
}
