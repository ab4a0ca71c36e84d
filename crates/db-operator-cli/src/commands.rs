use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "db-operator")]
#[command(about = "Builds and compares distribution content databases", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build the database of a content tree and save it when it changed
    Build {
        /// Folder with the content that will be in the database
        source_dir: PathBuf,
        /// Where the database, zips and README are written (defaults to SOURCE_DIR)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Compare two published databases (URL or path); exits 1 when they differ
    Compare {
        /// Address pointing to a database
        left: String,
        /// Address pointing to another database
        right: String,
    },
    /// Print configuration values
    PrintConfig,
}

impl Cli {
    /// `compare` leaves the filesystem untouched, log file included.
    pub fn writes_log_file(&self) -> bool {
        !matches!(self.command, Some(Commands::Compare { .. }))
    }
}
