use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::{ClientConfig, DEFAULT_MACHINE};

#[derive(Parser, Debug)]
#[command(author, version, about = "Key operations against an etcd cluster", long_about = None)]
pub struct Cli {
    /// Comma-separated member endpoints, tried in order.
    #[arg(long, value_delimiter = ',', default_value = DEFAULT_MACHINE)]
    pub peers: Vec<String>,

    /// Give up on a call after this many milliseconds.
    #[arg(long)]
    pub deadline_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn client_config(&self) -> ClientConfig {
        let config = ClientConfig::new(self.peers.iter().cloned());
        match self.deadline_ms {
            Some(ms) => config.deadline(Duration::from_millis(ms)),
            None => config,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read a key.
    Get {
        key: String,
        /// Return the directory listing sorted by key.
        #[arg(long)]
        sort: bool,
        /// Read linearizably through the leader.
        #[arg(long)]
        consistent: bool,
    },
    /// List a directory.
    Ls {
        #[arg(default_value = "/")]
        key: String,
        #[arg(long)]
        recursive: bool,
    },
    /// Set a key, optionally only if it matches a previous value or index.
    Set(SetArgs),
    /// Create a key that must not exist yet.
    Mk(WriteArgs),
    /// Update a key that must already exist.
    Update(WriteArgs),
    /// Append an in-order key under a directory.
    Post(WriteArgs),
    /// Remove a key or directory.
    Rm {
        key: String,
        #[arg(long)]
        recursive: bool,
    },
    /// Wait for the next change to a key.
    Watch {
        key: String,
        /// Report the first change at or after this index.
        #[arg(long)]
        after_index: Option<u64>,
        #[arg(long)]
        recursive: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct WriteArgs {
    pub key: String,
    #[arg(default_value = "")]
    pub value: String,
    /// Time to live in seconds.
    #[arg(long)]
    pub ttl: Option<u64>,
}

impl WriteArgs {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl.map(Duration::from_secs)
    }
}

#[derive(Args, Debug, Clone)]
pub struct SetArgs {
    #[command(flatten)]
    pub write: WriteArgs,
    #[arg(long)]
    pub swap_with_value: Option<String>,
    #[arg(long)]
    pub swap_with_index: Option<u64>,
}
