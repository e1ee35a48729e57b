use thiserror::Error;

use crate::sequence::sequence_less_than;

/// Errors that can occur during SequenceBuffer operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceBufferError {
    /// Attempted to insert a duplicate id into the buffer
    #[error("duplicate sequence id {id} not allowed in SequenceBuffer")]
    DuplicateId { id: u16 },
}

/// A list of items kept sorted by wrapping sequence order.
///
/// The front is always the minimum under `sequence_less_than`, so
/// `pop_front` is extract-min and bounded callers evict from the front.
/// Insertion scans from the back because ids arrive mostly in order.
pub struct SequenceBuffer<T> {
    list: Vec<(u16, T)>,
}

impl<T> SequenceBuffer<T> {
    pub fn new() -> Self {
        Self { list: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn front(&self) -> Option<&(u16, T)> {
        self.list.first()
    }

    /// Removes and returns the minimum-id item.
    pub fn pop_front(&mut self) -> Option<(u16, T)> {
        if self.list.is_empty() {
            return None;
        }
        Some(self.list.remove(0))
    }

    /// Inserts an item with the given id, scanning from the back.
    /// Returns an error if the id already exists.
    pub fn try_insert(&mut self, id: u16, item: T) -> Result<(), SequenceBufferError> {
        let mut index = self.list.len();

        loop {
            if index == 0 {
                // made it all the way through, insert at front and be done
                self.list.insert(index, (id, item));
                return Ok(());
            }

            index -= 1;

            let (old_id, _) = &self.list[index];
            if *old_id == id {
                return Err(SequenceBufferError::DuplicateId { id });
            }
            if sequence_less_than(*old_id, id) {
                self.list.insert(index + 1, (id, item));
                return Ok(());
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(u16, T)> {
        self.list.iter()
    }

    /// Removes every item, yielding them in sequence order.
    pub fn drain(&mut self) -> impl Iterator<Item = (u16, T)> + '_ {
        self.list.drain(..)
    }
}

impl<T> Default for SequenceBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}
