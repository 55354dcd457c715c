use thiserror::Error;

/// Error type for file range and writer operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Start position {0} is negative")]
    NegativeStart(i64),

    #[error("End position {0} is negative, use -1 to read to the end of the file")]
    NegativeEnd(i64),

    #[error("End position {end} is beyond the last byte of a file of {total} bytes")]
    EndBeyondFileSize { end: u64, total: u64 },

    #[error("Start position {start} is greater than end position {end}")]
    StartGreaterThanEnd { start: u64, end: u64 },

    #[error("File writer has already shut down")]
    WriterClosed,
}
