use std::cmp;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use anyhow::{Context, Result};
use bytes::{Bytes, BytesMut};
use filepipe_stream::MpscStream;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc::Sender;
use tracing::{debug, trace};

use crate::options::{runtime_or_current, ReadOptions};
use crate::range::ResolvedRange;

/// The contents of a file range, produced chunk by chunk by a blocking reader.
///
/// An `Err` item is always the last one.
pub struct ByteStream {
    inner: MpscStream<Result<Bytes>>,
    range: ResolvedRange,
}

impl ByteStream {
    /// The validated range being streamed.
    pub fn range(&self) -> &ResolvedRange {
        &self.range
    }
}

impl Stream for ByteStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl crate::FilePipe {
    /// Streams a byte range of a file.
    ///
    /// The file is opened and the range validated before this returns, so a
    /// malformed range fails here without producing a stream. The copy loop
    /// then runs on the blocking pool of `options.runtime`, at most
    /// `options.capacity` chunks ahead of the consumer.
    pub async fn read_range<T: AsRef<Path>>(path: T, options: ReadOptions) -> Result<ByteStream> {
        let path = path.as_ref().to_path_buf();
        let runtime = runtime_or_current(&options.runtime);
        let range = options.range;

        let open_path = path.clone();
        let (file, resolved) = runtime
            .spawn_blocking(move || -> Result<(File, ResolvedRange)> {
                let mut file = File::open(&open_path)
                    .with_context(|| format!("Failed to open file {}", open_path.display()))?;
                let file_len = file
                    .metadata()
                    .with_context(|| {
                        format!("Failed to get metadata for file {}", open_path.display())
                    })?
                    .len();

                let resolved = range.resolve(file_len)?;
                if resolved.start > 0 {
                    file.seek(SeekFrom::Start(resolved.start)).with_context(|| {
                        format!(
                            "Failed to seek to {} in file {}",
                            resolved.start,
                            open_path.display()
                        )
                    })?;
                }
                Ok((file, resolved))
            })
            .await
            .context("Failed to spawn blocking task")??;

        debug!(
            path = %path.display(),
            range = %range,
            bytes = resolved.len(),
            "Streaming file range"
        );

        let chunk_size = options.chunk_size;
        let inner = MpscStream::spawn_blocking(&runtime, options.capacity, move |tx| {
            let copied =
                copy_range(file, &path, range.start, range.end_inclusive, chunk_size, &tx);
            debug!(path = %path.display(), bytes = copied, "Finished streaming file range");
        });

        Ok(ByteStream { inner, range: resolved })
    }

    /// Reads a byte range of a file into memory.
    pub async fn read_range_bytes<T: AsRef<Path>>(path: T, options: ReadOptions) -> Result<Bytes> {
        let mut stream = Self::read_range(path, options).await?;
        let capacity = usize::try_from(stream.range().len()).unwrap_or(0);
        let mut content = BytesMut::with_capacity(capacity);
        while let Some(chunk) = stream.next().await {
            content.extend_from_slice(&chunk?);
        }
        Ok(content.freeze())
    }
}

/// Copies from `reader`, already positioned at `start`, into `tx`.
///
/// Without an end the copy runs until the reader reports end of stream.
/// With one, each read is clamped to the bytes left before `end_inclusive`.
/// A read failure is sent as the final item. The copy also stops once the
/// consumer goes away. `reader` is dropped before returning in every case.
///
/// Returns the number of bytes handed to the consumer.
pub(crate) fn copy_range<R: Read>(
    mut reader: R,
    path: &Path,
    start: u64,
    end_inclusive: Option<u64>,
    chunk_size: usize,
    tx: &Sender<Result<Bytes>>,
) -> u64 {
    let chunk_size = chunk_size.max(1);
    let mut position = start;

    loop {
        let wanted = match end_inclusive {
            Some(end) if position > end => break,
            Some(end) => cmp::min(chunk_size as u64, end - position + 1) as usize,
            None => chunk_size,
        };

        let mut chunk = BytesMut::zeroed(wanted);
        let read = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                let err = anyhow::Error::new(err)
                    .context(format!("Failed to read file {} at {}", path.display(), position));
                let _ = tx.blocking_send(Err(err));
                break;
            }
        };
        chunk.truncate(read);
        position += read as u64;

        trace!(path = %path.display(), position, bytes = read, "Read chunk");
        if tx.blocking_send(Ok(chunk.freeze())).is_err() {
            debug!(path = %path.display(), position, "Consumer dropped the stream");
            position -= read as u64;
            break;
        }
    }

    drop(reader);
    position - start
}
