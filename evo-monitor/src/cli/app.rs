use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "evo-monitor",
    version,
    about = "Evolution Monitor - learn from how code is generated",
    long_about = "Evolution Monitor watches a project tree, groups files created in quick succession into generation sessions, and records the patterns it finds as lessons in a Markdown learning journal."
)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch a directory until interrupted
    #[command(about = "Watch a directory and capture lessons until Ctrl-C")]
    Watch {
        /// Directory to watch (defaults to the configured root)
        path: Option<PathBuf>,

        /// Learning journal to append to
        #[arg(short, long)]
        journal: Option<PathBuf>,
    },

    /// Write a default configuration file
    #[command(about = "Write the default configuration as TOML")]
    Init {
        /// Destination file
        #[arg(short, long, default_value = "evo-monitor.toml")]
        output: PathBuf,
    },
}
