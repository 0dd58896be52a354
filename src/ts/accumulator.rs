//! Per-PID elementary-stream accumulator.
//!
//! Grounded on the teacher's `PESBuilder` push/take idiom in
//! `format/ts/demuxer.rs`, backed by a `bytes::BytesMut` buffer that grows
//! by a fixed increment (rather than the original reference's periodic
//! realloc+memcpy compaction) and is cleared, not reallocated, on flush.

use bytes::{BufMut, BytesMut};

/// Growing byte buffer for one elementary PID. Appended to on every TS
/// packet belonging to the PID; consumed on the next PUSI or end-of-stream
/// flush.
pub struct ElementaryAccumulator {
    buf: BytesMut,
    growth_increment: usize,
}

impl ElementaryAccumulator {
    /// Creates an empty accumulator that grows by `growth_increment` bytes
    /// whenever more capacity is needed.
    pub fn new(growth_increment: usize) -> Self {
        ElementaryAccumulator {
            buf: BytesMut::with_capacity(growth_increment),
            growth_increment,
        }
    }

    /// Appends `data`, growing the backing buffer by the configured
    /// increment if there isn't enough spare capacity.
    pub fn push(&mut self, data: &[u8]) {
        if self.buf.capacity() - self.buf.len() < data.len() {
            self.buf.reserve(self.growth_increment.max(data.len()));
        }
        self.buf.put_slice(data);
    }

    /// Current accumulated bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Number of bytes currently accumulated.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been accumulated since the last flush.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Clears the buffer in place, retaining its allocated capacity.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_across_multiple_pushes() {
        let mut acc = ElementaryAccumulator::new(16);
        acc.push(&[1, 2, 3]);
        acc.push(&[4, 5]);
        assert_eq!(acc.bytes(), &[1, 2, 3, 4, 5]);
        assert_eq!(acc.len(), 5);
    }

    #[test]
    fn clear_resets_length_but_keeps_capacity() {
        let mut acc = ElementaryAccumulator::new(4);
        acc.push(&[1, 2, 3, 4, 5, 6]);
        let capacity_before = acc.buf.capacity();
        acc.clear();
        assert!(acc.is_empty());
        assert_eq!(acc.buf.capacity(), capacity_before);
    }

    #[test]
    fn grows_past_initial_increment_when_needed() {
        let mut acc = ElementaryAccumulator::new(4);
        acc.push(&[0u8; 100]);
        assert_eq!(acc.len(), 100);
    }
}
