//! Bounded command and chunk queues.
//!
//! Commands run strictly in FIFO order, so the chunks of the head write are
//! always at the front of the chunk queue.

use crate::error::{StoreError, StoreResult};
use bytes::Bytes;
use std::collections::VecDeque;

/// Fixed-capacity FIFO.
#[derive(Debug)]
pub(crate) struct Ring<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> Ring<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn free(&self) -> usize {
        self.capacity - self.items.len()
    }

    pub(crate) fn push_back(&mut self, item: T) -> StoreResult<()> {
        if self.free() == 0 {
            return Err(StoreError::NoSpaceInQueues);
        }
        self.items.push_back(item);
        Ok(())
    }

    /// Returns an item just popped from the front.
    pub(crate) fn push_front(&mut self, item: T) {
        self.items.push_front(item);
    }

    pub(crate) fn pop_front(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

/// Data chunks of queued writes.
#[derive(Debug)]
pub(crate) struct ChunkQueue {
    ring: Ring<Bytes>,
}

impl ChunkQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            ring: Ring::new(capacity),
        }
    }

    /// Whether `count` more chunks fit.
    pub(crate) fn has_room(&self, count: usize) -> bool {
        self.ring.free() >= count
    }

    /// Enqueues all chunks of one write, or none of them.
    pub(crate) fn push_all(&mut self, chunks: &[Bytes]) -> StoreResult<()> {
        if !self.has_room(chunks.len()) {
            return Err(StoreError::NoSpaceInQueues);
        }
        for chunk in chunks {
            self.ring.push_back(chunk.clone())?;
        }
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Option<Bytes> {
        self.ring.pop_front()
    }

    /// Drops the first `count` chunks.
    pub(crate) fn discard(&mut self, count: usize) {
        for _ in 0..count {
            if self.ring.pop_front().is_none() {
                break;
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.ring.len()
    }
}
