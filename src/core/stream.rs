//! Cancellable event streams shared by the provider adapters.
//!
//! An adapter call hands back an [`EventStream`] and keeps the matching
//! [`EventSink`] inside its worker task. Dropping or cancelling the stream
//! trips the sink's token, which the worker observes to release its
//! provider-side resources.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default buffer for adapter event channels.
pub const EVENT_BUFFER_SIZE: usize = 256;

/// Consumer half of an adapter call.
#[derive(Debug)]
pub struct EventStream<T> {
    rx: mpsc::Receiver<T>,
    cancel: CancellationToken,
}

/// Producer half of an adapter call, owned by the worker task.
#[derive(Debug)]
pub struct EventSink<T> {
    tx: mpsc::Sender<T>,
    cancel: CancellationToken,
}

impl<T> Clone for EventSink<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

/// Create a connected sink/stream pair.
pub fn event_channel<T>(buffer: usize) -> (EventSink<T>, EventStream<T>) {
    let (tx, rx) = mpsc::channel(buffer);
    let cancel = CancellationToken::new();
    (
        EventSink {
            tx,
            cancel: cancel.clone(),
        },
        EventStream { rx, cancel },
    )
}

impl<T> EventStream<T> {
    /// Next event, or `None` once every sink is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Ask the producing task to stop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<T> Drop for EventStream<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<T> EventSink<T> {
    /// Deliver an event. Returns false if the consumer is gone or cancelled.
    pub async fn send(&self, event: T) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.send(event).await.is_ok()
    }

    /// Deliver an event without waiting for buffer space.
    pub fn try_send(&self, event: T) -> bool {
        !self.cancel.is_cancelled() && self.tx.try_send(event).is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the consumer cancels or drops the stream.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}
