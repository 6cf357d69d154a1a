use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Keep a community page widget in sync with an HTTP text or image source
#[derive(Parser)]
#[command(name = "widgetsync", version)]
#[command(about = "Keep a community page widget in sync with an HTTP source", long_about = None)]
pub struct Cli {
    /// Settings file (defaults to <config dir>/widgetsync.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a single synchronization now
    Sync,
    /// Start periodic sync and keep running until interrupted
    Start,
    /// Stop periodic sync
    Stop,
    /// Re-arm periodic sync if it was active before a restart or upgrade
    Resume,
    /// Show job and cache state
    Status,
    /// List widgets on the configured community page
    Widgets,
}
