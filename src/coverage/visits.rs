//! Shared buffer of visited probe ids.
//!
//! Probes fire on every thread the instrumented program runs. Each visit is appended to a
//! bounded buffer; when the buffer fills up, its content is handed to a [`VisitSink`] in one
//! batch. The sink is called outside the lock, so slow transports never block other threads
//! from recording.

use std::sync::Mutex;

use crate::Result;

/// Capacity used by [`VisitQueue::with_default_capacity`].
pub const DEFAULT_VISIT_CAPACITY: usize = 1000;

/// Destination of flushed visit batches.
pub trait VisitSink: Send + Sync {
    /// Receives one batch of visited ids, in recording order per thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be delivered; the batch is dropped.
    fn send(&self, ids: &[u32]) -> Result<()>;
}

/// Bounded, thread-safe visit buffer with overflow flush.
pub struct VisitQueue<S: VisitSink> {
    sink: S,
    capacity: usize,
    pending: Mutex<Vec<u32>>,
}

impl<S: VisitSink> VisitQueue<S> {
    /// Creates a queue that flushes to `sink` every `capacity` ids (at least one).
    pub fn new(sink: S, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        VisitQueue {
            sink,
            capacity,
            pending: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Creates a queue with [`DEFAULT_VISIT_CAPACITY`].
    pub fn with_default_capacity(sink: S) -> Self {
        Self::new(sink, DEFAULT_VISIT_CAPACITY)
    }

    /// Number of ids buffered per batch.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The sink batches are flushed to.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Records one visit, flushing if the buffer is full.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LockError`] if the buffer is poisoned, or the sink's error
    /// if an overflow flush fails.
    pub fn record(&self, id: u32) -> Result<()> {
        let batch = {
            let mut pending = lock!(self.pending);
            pending.push(id);
            if pending.len() < self.capacity {
                return Ok(());
            }
            std::mem::replace(&mut *pending, Vec::with_capacity(self.capacity))
        };

        self.sink.send(&batch)
    }

    /// Hands every buffered id to the sink.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LockError`] if the buffer is poisoned, or the sink's error.
    pub fn flush(&self) -> Result<()> {
        let batch = std::mem::take(&mut *lock!(self.pending));
        if batch.is_empty() {
            return Ok(());
        }

        log::trace!("Flushing {} visits", batch.len());
        self.sink.send(&batch)
    }

    /// Number of ids waiting for the next flush.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LockError`] if the buffer is poisoned.
    pub fn pending(&self) -> Result<usize> {
        Ok(lock!(self.pending).len())
    }
}
