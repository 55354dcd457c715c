use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinHandle;

/// Number of items the producer may run ahead of the consumer when no
/// capacity is given.
pub const DEFAULT_CAPACITY: usize = 1;

/// A stream fed by a background producer through a bounded channel.
///
/// The producer suspends (or blocks, for [`MpscStream::spawn_blocking`]) once
/// `capacity` items are waiting, and the consumer suspends until an item
/// arrives. The stream ends when the producer drops its [`Sender`].
///
/// Dropping the stream closes the channel, so the producer's next send fails
/// and it can release whatever it owns.
pub struct MpscStream<T> {
    join_handle: JoinHandle<()>,
    receiver: Receiver<T>,
}

impl<T: Send + 'static> MpscStream<T> {
    pub fn spawn<F, S>(f: F) -> MpscStream<T>
    where
        F: (FnOnce(Sender<T>) -> S) + Send + 'static,
        S: Future<Output = ()> + Send + 'static,
    {
        Self::spawn_with_capacity(DEFAULT_CAPACITY, f)
    }

    pub fn spawn_with_capacity<F, S>(capacity: usize, f: F) -> MpscStream<T>
    where
        F: (FnOnce(Sender<T>) -> S) + Send + 'static,
        S: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = tokio::sync::mpsc::channel(capacity.max(1));
        MpscStream { join_handle: tokio::spawn(f(tx)), receiver: rx }
    }

    /// Runs a blocking producer on `handle`'s blocking pool.
    ///
    /// The producer must use [`Sender::blocking_send`] and should stop as soon
    /// as a send fails.
    pub fn spawn_blocking<F>(handle: &Handle, capacity: usize, f: F) -> MpscStream<T>
    where
        F: FnOnce(Sender<T>) + Send + 'static,
    {
        let (tx, rx) = tokio::sync::mpsc::channel(capacity.max(1));
        MpscStream { join_handle: handle.spawn_blocking(move || f(tx)), receiver: rx }
    }
}

impl<T> Stream for MpscStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl<T> Drop for MpscStream<T> {
    fn drop(&mut self) {
        // Close the receiver to prevent any new messages
        self.receiver.close();
        // Has no effect on a blocking producer that already started; that one
        // stops on its next failed send.
        self.join_handle.abort();
    }
}
