mod cli;
mod log;
mod pipe;

pub use cli::{Cli, Command};
pub use log::init_tracing;
pub use pipe::{read_to, run, write_from};
