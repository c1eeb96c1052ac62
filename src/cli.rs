//! Command-line arguments.

use clap::Parser;
use std::path::PathBuf;

use treemirror_lib::{HashAlgorithm, SyncConfig, SyncResult};

/// Mirror SOURCE into DESTINATION every INTERVAL seconds.
#[derive(Parser, Debug)]
#[command(name = "treemirror", version, about)]
pub struct Cli {
    /// Directory to mirror from
    pub source: PathBuf,

    /// Directory to mirror into
    pub destination: PathBuf,

    /// Seconds between synchronizations
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// File that receives the log
    pub log_file: PathBuf,

    /// Fingerprint algorithm (xxh3 or sha256)
    #[arg(long, default_value = "xxh3")]
    pub hash: HashAlgorithm,

    /// Log what would change without touching the destination
    #[arg(long)]
    pub dry_run: bool,

    /// Give copied files the source's modification time
    #[arg(long)]
    pub preserve_mtime: bool,

    /// Synchronize once and exit
    #[arg(long)]
    pub once: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn into_config(self) -> SyncResult<SyncConfig> {
        let mut config = SyncConfig::new(self.source, self.destination, self.interval, self.log_file)?;
        config.hash = self.hash;
        config.dry_run = self.dry_run;
        config.preserve_mtime = self.preserve_mtime;
        config.run_once = self.once;
        config.verbose = self.verbose;
        Ok(config)
    }
}
