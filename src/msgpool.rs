//! Bounded producer/consumer channel between per-file reader threads and the
//! fixed pool of builder worker threads.

use crossbeam_channel::{Receiver, Sender};

/// Default number of in-flight batches before a producer blocks.
pub const MSGPOOLRSIZE: usize = 16;

/// A bounded multi-producer, multi-consumer queue of `T`. Cloning gives an
/// independent handle sharing the same underlying channel; producers drop
/// their `Sender` when done, and once every sender is gone `recv` on every
/// consumer starts returning `None`.
pub struct MessagePool<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> MessagePool<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<T> {
        self.tx.clone()
    }

    pub fn receiver(&self) -> Receiver<T> {
        self.rx.clone()
    }

    /// Drop this pool's own sender handle. Callers that spawn producer
    /// threads should clone `sender()` into each one and drop the pool's
    /// copy once all producers hold their own, so the channel closes only
    /// when the last real producer finishes.
    pub fn close_local_sender(self) {
        drop(self.tx);
    }
}
