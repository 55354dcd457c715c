use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::options::{runtime_or_current, WriteOptions};

/// A destination that can be cut to its final length once all input has been
/// written.
pub(crate) trait Truncate: Write {
    fn truncate(&mut self, len: u64) -> std::io::Result<()>;
}

impl Truncate for File {
    fn truncate(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len)
    }
}

enum Message {
    Data(Bytes),
    /// Stop without truncating.
    Abort,
}

/// Writable end of a file.
///
/// Chunks passed to [`FileWriter::write`] are written in order by a blocking
/// task. Once the input ends, either through [`FileWriter::finish`] or by
/// dropping the writer, the file is truncated to the number of bytes written
/// so no stale tail from earlier content survives. [`FileWriter::abort`] stops
/// the copy and leaves the file untruncated.
pub struct FileWriter {
    sender: Option<Sender<Message>>,
    task: Option<JoinHandle<Result<u64>>>,
    path: PathBuf,
}

impl FileWriter {
    fn spawn<W>(runtime: &Handle, capacity: usize, sink: W, path: PathBuf) -> Self
    where
        W: Truncate + Send + 'static,
    {
        let (tx, rx) = tokio::sync::mpsc::channel(capacity.max(1));
        let task_path = path.clone();
        let task = runtime.spawn_blocking(move || {
            // A dropped writer has nobody to report to
            drain_into(sink, rx, &task_path).inspect_err(|err| {
                warn!(path = %task_path.display(), error = ?err, "File writer failed");
            })
        });
        Self { sender: Some(tx), task: Some(task), path }
    }

    /// Queues `bytes` for writing, waiting while the writer is `capacity`
    /// chunks behind.
    ///
    /// Fails with the writer's I/O error if an earlier chunk could not be
    /// written, and with [`Error::WriterClosed`] after that.
    pub async fn write(&mut self, bytes: impl Into<Bytes>) -> Result<()> {
        let bytes = bytes.into();
        let sender = self.sender.as_ref().ok_or(Error::WriterClosed)?;
        if bytes.is_empty() {
            return Ok(());
        }

        if sender.send(Message::Data(bytes)).await.is_err() {
            // The blocking side stopped early, which only happens on failure
            self.sender = None;
            return match self.join().await {
                Err(err) => Err(err),
                Ok(_) => Err(Error::WriterClosed.into()),
            };
        }
        Ok(())
    }

    /// Ends the input, waits for the remaining chunks and the truncation, and
    /// returns the final length of the file.
    pub async fn finish(mut self) -> Result<u64> {
        self.sender = None;
        self.join().await
    }

    /// Stops after the chunks already queued, without truncating, and returns
    /// the number of bytes written. The file is released once this returns.
    pub async fn abort(mut self) -> Result<u64> {
        if let Some(sender) = self.sender.take() {
            // A failed send means the task already stopped; join reports why
            let _ = sender.send(Message::Abort).await;
        }
        self.join().await
    }

    async fn join(&mut self) -> Result<u64> {
        let task = self.task.take().ok_or(Error::WriterClosed)?;
        task.await.context("Failed to join blocking task")?
    }
}

impl crate::FilePipe {
    /// Opens `path` for writing through a [`FileWriter`].
    ///
    /// The file is created if missing and is not truncated up front; existing
    /// bytes are overwritten from offset 0 and any remainder is cut off when
    /// the writer finishes.
    pub async fn writer<T: AsRef<Path>>(path: T, options: WriteOptions) -> Result<FileWriter> {
        let path = path.as_ref().to_path_buf();
        let runtime = runtime_or_current(&options.runtime);

        let open_path = path.clone();
        let file = runtime
            .spawn_blocking(move || {
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(&open_path)
                    .with_context(|| format!("Failed to open file {}", open_path.display()))
            })
            .await
            .context("Failed to spawn blocking task")??;

        debug!(path = %path.display(), "Opened file for writing");
        Ok(FileWriter::spawn(&runtime, options.capacity, file, path))
    }

    /// Writes every chunk of `stream` to `path` and returns the final file
    /// length.
    ///
    /// An error from `stream` aborts the copy: the bytes already written stay
    /// in the file, nothing is truncated, and the file is released before the
    /// error is returned.
    pub async fn write_stream<T, S, B, E>(
        path: T,
        stream: S,
        options: WriteOptions,
    ) -> Result<u64>
    where
        T: AsRef<Path>,
        S: Stream<Item = std::result::Result<B, E>>,
        B: Into<Bytes>,
        E: Into<anyhow::Error>,
    {
        let mut writer = Self::writer(path, options).await?;
        futures::pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => writer.write(chunk).await?,
                Err(err) => {
                    let path = writer.path.clone();
                    match writer.abort().await {
                        Ok(written) => {
                            debug!(path = %path.display(), bytes = written, "Input failed");
                        }
                        Err(abort_err) => {
                            warn!(path = %path.display(), error = ?abort_err, "Failed to abort");
                        }
                    }
                    return Err(err.into());
                }
            }
        }
        writer.finish().await
    }
}

/// Writes everything received on `rx` into `sink` from its current position,
/// then truncates it to the number of bytes written unless the copy was
/// aborted. `sink` is dropped before returning in every case.
fn drain_into<W: Truncate>(mut sink: W, mut rx: Receiver<Message>, path: &Path) -> Result<u64> {
    let mut copied = 0u64;
    while let Some(message) = rx.blocking_recv() {
        let chunk = match message {
            Message::Data(chunk) => chunk,
            Message::Abort => {
                debug!(path = %path.display(), bytes = copied, "Aborted writing file");
                return Ok(copied);
            }
        };
        sink.write_all(&chunk).with_context(|| {
            format!("Failed to write file {} at {}", path.display(), copied)
        })?;
        copied += chunk.len() as u64;
        trace!(path = %path.display(), bytes = chunk.len(), "Wrote chunk");
    }

    sink.truncate(copied)
        .with_context(|| format!("Failed to truncate file {} to {}", path.display(), copied))?;
    sink.flush()
        .with_context(|| format!("Failed to flush file {}", path.display()))?;

    debug!(path = %path.display(), bytes = copied, "Finished writing file");
    Ok(copied)
}

#[cfg(test)]
mod test {
    use std::io::{self, Cursor};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use tokio::fs;
    use tokio::sync::oneshot;
    use tracing::field::{Field, Visit};
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::registry;

    use super::*;
    use crate::FilePipe;

    /// Records the fields of every `WARN` event.
    #[derive(Clone, Default)]
    struct WarnCapture(Arc<Mutex<Vec<String>>>);

    impl WarnCapture {
        fn contains(&self, needle: &str) -> bool {
            self.0.lock().unwrap().iter().any(|line| line.contains(needle))
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarnCapture {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if *event.metadata().level() == tracing::Level::WARN {
                let mut line = String::new();
                event.record(&mut FieldWriter(&mut line));
                self.0.lock().unwrap().push(line);
            }
        }
    }

    struct FieldWriter<'a>(&'a mut String);

    impl Visit for FieldWriter<'_> {
        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            use std::fmt::Write as _;
            let _ = write!(self.0, "{}={:?} ", field.name(), value);
        }
    }

    async fn create_test_file(content: &[u8]) -> Result<tempfile::NamedTempFile> {
        let file = tempfile::NamedTempFile::new()?;
        fs::write(file.path(), content).await?;
        Ok(file)
    }

    /// In-memory sink that fails after `fail_after` bytes and reports when it
    /// is dropped.
    struct InstrumentedSink {
        inner: Cursor<Vec<u8>>,
        fail_after: usize,
        dropped: Option<oneshot::Sender<()>>,
    }

    impl Write for InstrumentedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.inner.get_ref().len() + buf.len() > self.fail_after {
                return Err(io::Error::other("disk full"));
            }
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Truncate for InstrumentedSink {
        fn truncate(&mut self, len: u64) -> io::Result<()> {
            self.inner.get_mut().truncate(len as usize);
            Ok(())
        }
    }

    impl Drop for InstrumentedSink {
        fn drop(&mut self) {
            if let Some(tx) = self.dropped.take() {
                let _ = tx.send(());
            }
        }
    }

    #[tokio::test]
    async fn test_overwrite_truncates_stale_tail() -> Result<()> {
        let file = create_test_file(b"a much longer previous content").await?;

        let mut writer = FilePipe::writer(file.path(), WriteOptions::default()).await?;
        writer.write("short").await?;
        let written = writer.finish().await?;

        assert_eq!(written, 5);
        assert_eq!(fs::read(file.path()).await?, b"short");
        Ok(())
    }

    #[tokio::test]
    async fn test_new_file_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.bin");
        let content: Vec<u8> = (0..=255u8).cycle().take(50_000).collect();

        let mut writer = FilePipe::writer(&path, WriteOptions::default().capacity(4usize)).await?;
        for chunk in content.chunks(4096) {
            writer.write(chunk.to_vec()).await?;
        }
        let written = writer.finish().await?;

        assert_eq!(written, content.len() as u64);
        assert_eq!(fs::read(&path).await?, content);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_input_truncates_to_zero() -> Result<()> {
        let file = create_test_file(b"leftover").await?;

        let writer = FilePipe::writer(file.path(), WriteOptions::default()).await?;
        assert_eq!(writer.finish().await?, 0);

        assert!(fs::read(file.path()).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_write_stream() -> Result<()> {
        let file = create_test_file(b"0123456789").await?;
        let chunks = vec![Ok::<_, io::Error>("ab"), Ok("cd"), Ok("e")];

        let stream = futures::stream::iter(chunks);
        let written = FilePipe::write_stream(file.path(), stream, WriteOptions::default()).await?;

        assert_eq!(written, 5);
        assert_eq!(fs::read(file.path()).await?, b"abcde");
        Ok(())
    }

    #[tokio::test]
    async fn test_write_stream_input_error_leaves_file_untruncated() -> Result<()> {
        let old: Vec<u8> = vec![b'o'; 200_000];
        let file = create_test_file(&old).await?;
        let chunks = vec![
            Ok(Bytes::from(vec![b'n'; 100_000])),
            Err(io::Error::other("upstream failed")),
            Ok(Bytes::from_static(b"never written")),
        ];

        let stream = futures::stream::iter(chunks);
        let err = FilePipe::write_stream(file.path(), stream, WriteOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("upstream failed"));

        // The file is settled once the error is returned
        let content = fs::read(file.path()).await?;
        assert_eq!(content.len(), old.len());
        assert!(content[..100_000].iter().all(|byte| *byte == b'n'));
        assert!(content[100_000..].iter().all(|byte| *byte == b'o'));
        Ok(())
    }

    #[tokio::test]
    async fn test_abort_skips_truncation() -> Result<()> {
        let file = create_test_file(b"0123456789").await?;

        let mut writer = FilePipe::writer(file.path(), WriteOptions::default()).await?;
        writer.write("xy").await?;
        let written = writer.abort().await?;

        assert_eq!(written, 2);
        assert_eq!(fs::read(file.path()).await?, b"xy23456789");
        Ok(())
    }

    #[tokio::test]
    async fn test_write_failure_is_reported_and_releases_sink() {
        let (dropped_tx, dropped_rx) = oneshot::channel();
        let sink = InstrumentedSink {
            inner: Cursor::new(Vec::new()),
            fail_after: 4,
            dropped: Some(dropped_tx),
        };

        let mut writer = FileWriter::spawn(&Handle::current(), 1, sink, PathBuf::from("full.bin"));
        writer.write("0123").await.unwrap();
        writer.write("45").await.ok();
        let err = writer.finish().await.unwrap_err();

        assert!(err.downcast_ref::<io::Error>().is_some());
        assert!(err.to_string().starts_with("Failed to write file full.bin"));
        dropped_rx.await.expect("Sink should have been dropped");
    }

    #[tokio::test]
    async fn test_write_after_failure_surfaces_error() {
        let sink =
            InstrumentedSink { inner: Cursor::new(Vec::new()), fail_after: 0, dropped: None };

        let mut writer = FileWriter::spawn(&Handle::current(), 1, sink, PathBuf::from("full.bin"));

        // The first chunk is accepted by the channel, the write itself fails
        // in the background and the following writes observe it.
        let mut result = Ok(());
        for _ in 0..3 {
            result = writer.write("x").await;
            if result.is_err() {
                break;
            }
        }

        let err = result.unwrap_err();
        assert!(err.downcast_ref::<io::Error>().is_some());
        assert!(
            writer.write("y").await.unwrap_err().downcast_ref::<Error>().is_some(),
            "Writer should be closed after a failure"
        );
        assert!(
            writer.write(Bytes::new()).await.is_err(),
            "An empty chunk should not hide a closed writer"
        );
    }

    #[tokio::test]
    async fn test_dropped_writer_logs_failure() {
        let capture = WarnCapture::default();
        tracing::subscriber::set_global_default(registry().with(capture.clone())).unwrap();

        let (dropped_tx, dropped_rx) = oneshot::channel();
        let sink = InstrumentedSink {
            inner: Cursor::new(Vec::new()),
            fail_after: 0,
            dropped: Some(dropped_tx),
        };

        let mut writer =
            FileWriter::spawn(&Handle::current(), 1, sink, PathBuf::from("dropped.bin"));
        writer.write("x").await.unwrap();
        drop(writer);

        dropped_rx.await.expect("Sink should have been dropped");
        for _ in 0..200 {
            if capture.contains("dropped.bin") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(
            capture.contains("dropped.bin"),
            "Failure of a dropped writer should be logged"
        );
    }

    #[tokio::test]
    async fn test_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("out.bin");

        let result = FilePipe::writer(&path, WriteOptions::default()).await;

        assert!(result.is_err(), "Opening inside a missing directory should error");
    }
}
