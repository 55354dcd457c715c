use derive_setters::Setters;
use tokio::runtime::Handle;

use crate::range::ByteRange;

/// Size of each chunk handed to a [`crate::ByteStream`] consumer.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Number of chunks allowed in flight between the file and the async side.
pub const DEFAULT_CAPACITY: usize = filepipe_stream::DEFAULT_CAPACITY;

#[derive(Debug, Clone, Setters)]
#[setters(into, strip_option)]
pub struct ReadOptions {
    /// Bytes to read, the whole file by default
    pub range: ByteRange,

    /// Upper bound on the size of each produced chunk
    pub chunk_size: usize,

    /// Chunks buffered ahead of the consumer
    pub capacity: usize,

    /// Runtime whose blocking pool runs the file reads. Defaults to the
    /// runtime of the caller.
    pub runtime: Option<Handle>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            range: ByteRange::full(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            capacity: DEFAULT_CAPACITY,
            runtime: None,
        }
    }
}

#[derive(Debug, Clone, Setters)]
#[setters(into, strip_option)]
pub struct WriteOptions {
    /// Chunks buffered ahead of the file writes
    pub capacity: usize,

    /// Runtime whose blocking pool runs the file writes. Defaults to the
    /// runtime of the caller.
    pub runtime: Option<Handle>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { capacity: DEFAULT_CAPACITY, runtime: None }
    }
}

pub(crate) fn runtime_or_current(runtime: &Option<Handle>) -> Handle {
    runtime.clone().unwrap_or_else(Handle::current)
}
