use std::path::Path;

use anyhow::{Context, Result};
use bytes::BytesMut;
use filepipe_fs::{ByteRange, FilePipe, ReadOptions, WriteOptions};
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;

use crate::cli::{Cli, Command};

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Read { path, start, end, chunk_size } => {
            let range = ByteRange::try_from((start, end))?;
            let mut stdout = tokio::io::stdout();
            read_to(&path, range, chunk_size, &mut stdout).await?;
        }
        Command::Write { path, chunk_size } => {
            let mut stdin = tokio::io::stdin();
            write_from(&path, &mut stdin, chunk_size).await?;
        }
    }
    Ok(())
}

/// Copies `range` of the file at `path` into `out` and returns the number of
/// bytes copied.
pub async fn read_to<W>(
    path: &Path,
    range: ByteRange,
    chunk_size: usize,
    out: &mut W,
) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let options = ReadOptions::default().range(range).chunk_size(chunk_size);
    let mut stream = FilePipe::read_range(path, options).await?;
    let expected = stream.range().len();

    let mut copied = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        out.write_all(&chunk).await.context("Failed to write output")?;
        copied += chunk.len() as u64;
    }
    out.flush().await.context("Failed to flush output")?;

    info!(path = %path.display(), range = %range, bytes = copied, expected, "Read file range");
    Ok(copied)
}

/// Replaces the content of the file at `path` with everything read from
/// `input` and returns the new file length.
pub async fn write_from<R>(path: &Path, input: &mut R, chunk_size: usize) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let chunk_size = chunk_size.max(1);
    let mut writer = FilePipe::writer(path, WriteOptions::default()).await?;

    loop {
        let mut chunk = BytesMut::with_capacity(chunk_size);
        let read = input.read_buf(&mut chunk).await.context("Failed to read input")?;
        if read == 0 {
            break;
        }
        writer.write(chunk.freeze()).await?;
    }

    let written = writer.finish().await?;
    info!(path = %path.display(), bytes = written, "Wrote file");
    Ok(written)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use tokio::fs;

    use super::*;

    #[tokio::test]
    async fn test_read_to_copies_range() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        fs::write(file.path(), b"0123456789").await?;

        let mut out = Vec::new();
        let copied = read_to(file.path(), ByteRange::bounded(2, 5), 3, &mut out).await?;

        assert_eq!(copied, 4);
        assert_eq!(out, b"2345");
        Ok(())
    }

    #[tokio::test]
    async fn test_write_from_replaces_content() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        fs::write(file.path(), b"previous content that is longer").await?;

        let mut input: &[u8] = b"fresh";
        let written = write_from(file.path(), &mut input, 2).await?;

        assert_eq!(written, 5);
        assert_eq!(fs::read(file.path()).await?, b"fresh");
        Ok(())
    }

    #[tokio::test]
    async fn test_round_trip_through_both_commands() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("round_trip.bin");
        let content: Vec<u8> = (0..=255u8).cycle().take(20_000).collect();

        let mut input = content.as_slice();
        write_from(&path, &mut input, 1000).await?;

        let mut out = Vec::new();
        read_to(&path, ByteRange::full(), 777, &mut out).await?;

        assert_eq!(out, content);
        Ok(())
    }
}
