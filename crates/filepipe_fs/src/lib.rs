//! # filepipe_fs
//!
//! Bridges blocking file handles and async byte streams.
//!
//! [`FilePipe::read_range`] exposes a file, or an inclusive byte range of it,
//! as a [`ByteStream`]. [`FilePipe::writer`] returns a [`FileWriter`] whose
//! chunks are persisted to a file that is truncated to the written length once
//! the input ends.
//!
//! Every blocking call runs on the tokio blocking pool, and each file handle
//! is owned by exactly one blocking task, which drops it on every exit path.
//! Errors carry context in the form "Failed to [operation] [path]" and wrap a
//! typed [`Error`] where the caller may want to match on it.

mod error;
mod options;
mod range;
mod read_range;
mod writer;

pub use error::Error;
pub use options::{ReadOptions, WriteOptions, DEFAULT_CAPACITY, DEFAULT_CHUNK_SIZE};
pub use range::{ByteRange, ResolvedRange, UNBOUNDED};
pub use read_range::ByteStream;
pub use writer::FileWriter;

pub struct FilePipe;
