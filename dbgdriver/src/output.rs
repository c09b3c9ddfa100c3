/// Output accumulation
///
/// Bytes read from the debugger are collected here until a prompt shows
/// up. Output that arrives before the write of the active command was
/// acknowledged is parked in a [`DelayedOutput`] and replayed later.

use std::collections::VecDeque;

/// Initial capacity of a fresh [`OutputBuffer`]
pub const DEFAULT_OUTPUT_CAPACITY: usize = 4000;

/// Growable byte buffer holding everything received since the last prompt
#[derive(Debug)]
pub struct OutputBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_OUTPUT_CAPACITY)
    }
}

impl OutputBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a chunk, doubling the capacity until it fits
    pub fn append(&mut self, chunk: &[u8]) {
        let needed = self.data.len() + chunk.len();
        if needed >= self.capacity {
            let mut capacity = self.capacity;
            while needed >= capacity {
                capacity *= 2;
            }
            log::trace!("growing output buffer {} -> {} bytes", self.capacity, capacity);
            self.data.reserve_exact(capacity - self.data.len());
            self.capacity = capacity;
        }
        self.data.extend_from_slice(chunk);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Text before `end`, decoded lossily
    pub fn text_before(&self, end: usize) -> String {
        let end = end.min(self.data.len());
        String::from_utf8_lossy(&self.data[..end]).into_owned()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Logical capacity; grows by doubling and never shrinks
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

/// Chunks received before the pending write was acknowledged
#[derive(Debug, Default)]
pub struct DelayedOutput {
    chunks: VecDeque<Vec<u8>>,
}

impl DelayedOutput {
    pub fn push(&mut self, chunk: &[u8]) {
        self.chunks.push_back(chunk.to_vec());
    }

    /// Oldest held chunk
    pub fn pop(&mut self) -> Option<Vec<u8>> {
        self.chunks.pop_front()
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
