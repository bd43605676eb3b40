use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Operate on a flat-fs disk image
#[derive(Parser)]
pub struct Cli {
    /// Disk image path (created when absent)
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the direct children of a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },

    /// Print file metadata
    Stat { path: String },

    /// Create an empty regular file
    Touch { path: String },

    /// Create a directory
    Mkdir { path: String },

    /// Write into a file, creating it when absent
    Write {
        path: String,

        /// Literal text to write
        #[arg(long, conflicts_with = "from")]
        text: Option<String>,

        /// Host file to copy in; stdin when neither is given
        #[arg(long)]
        from: Option<PathBuf>,

        /// Byte offset to write at
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },

    /// Print file contents
    Cat { path: String },

    /// Remove a regular file
    Rm { path: String },

    /// Remove an empty directory
    Rmdir { path: String },

    /// Rename a file or directory
    Mv { from: String, to: String },

    /// Check that a path exists
    Access { path: String },

    /// Import a host directory tree into the image
    Pack { source: PathBuf },
}
