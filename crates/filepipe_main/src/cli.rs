use std::path::PathBuf;

use clap::{Parser, Subcommand};
use filepipe_fs::{DEFAULT_CHUNK_SIZE, UNBOUNDED};

#[derive(Parser, Debug)]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Enable verbose output mode.
    ///
    /// Logs every opened file and the number of bytes moved. `FILEPIPE_LOG`
    /// overrides the filter entirely.
    #[arg(long, short = 'v', default_value_t = false, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Stream a byte range of a file to stdout
    Read {
        /// Path to the file
        path: PathBuf,

        /// First byte to read
        #[arg(long, short, default_value_t = 0, allow_negative_numbers = true)]
        start: i64,

        /// Last byte to read, inclusive. -1 reads to the end of the file.
        #[arg(long, short, default_value_t = UNBOUNDED, allow_negative_numbers = true)]
        end: i64,

        /// Size of each chunk read from the file
        #[arg(long, env = "FILEPIPE_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },

    /// Copy stdin into a file, replacing its previous content
    Write {
        /// Path to the file
        path: PathBuf,

        /// Size of each chunk read from stdin
        #[arg(long, env = "FILEPIPE_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },
}
