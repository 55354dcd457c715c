mod mpsc_stream;

pub use mpsc_stream::*;
