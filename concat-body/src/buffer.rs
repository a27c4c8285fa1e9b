//! Fixed-capacity FIFO byte buffer used by the pump.
//!
//! Bytes are appended at the back with [`PumpBuffer::spare_mut`] +
//! [`PumpBuffer::fill`], consumed from the front with [`PumpBuffer::drain`],
//! and moved back to the start of the storage with [`PumpBuffer::compact`].
//! All index arithmetic stays inside this type.

use crate::error::{BodyError, BodyResult};

/// Owned byte buffer with a fixed capacity.
pub struct PumpBuffer {
    data: Box<[u8]>,
    start: usize,
    end: usize,
}

impl PumpBuffer {
    /// Allocate a zeroed buffer.
    ///
    /// Fails if `capacity` is zero or the allocation cannot be made.
    pub fn with_capacity(capacity: usize) -> BodyResult<Self> {
        if capacity == 0 {
            return Err(BodyError::Allocation(capacity));
        }
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| BodyError::Allocation(capacity))?;
        data.resize(capacity, 0);
        Ok(Self {
            data: data.into_boxed_slice(),
            start: 0,
            end: 0,
        })
    }

    /// Total capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of buffered, unwritten bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Check if no bytes are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Space available at the back.
    #[must_use]
    pub fn free(&self) -> usize {
        self.data.len() - self.end
    }

    /// Check if buffered bytes start at the front of the storage.
    #[must_use]
    pub fn is_compact(&self) -> bool {
        self.start == 0
    }

    /// Buffered bytes, oldest first.
    #[must_use]
    pub fn filled(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    /// Writable space after the buffered bytes.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.end..]
    }

    /// Mark `n` bytes written into [`spare_mut`](Self::spare_mut) as buffered.
    ///
    /// Counts beyond the free space are clamped.
    pub fn fill(&mut self, n: usize) {
        debug_assert!(n <= self.free(), "fill past capacity");
        self.end += n.min(self.free());
    }

    /// Drop up to `n` bytes from the front. Returns how many were dropped.
    pub fn drain(&mut self, n: usize) -> usize {
        let n = n.min(self.len());
        self.start += n;
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
        n
    }

    /// Move buffered bytes to the front of the storage.
    pub fn compact(&mut self) {
        if self.start == 0 {
            return;
        }
        self.data.copy_within(self.start..self.end, 0);
        self.end -= self.start;
        self.start = 0;
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }
}

impl std::fmt::Debug for PumpBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PumpBuffer")
            .field("capacity", &self.capacity())
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn push(buffer: &mut PumpBuffer, bytes: &[u8]) {
        let n = bytes.len().min(buffer.free());
        buffer.spare_mut()[..n].copy_from_slice(&bytes[..n]);
        buffer.fill(n);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(matches!(
            PumpBuffer::with_capacity(0),
            Err(BodyError::Allocation(0))
        ));
    }

    #[test]
    fn test_fill_and_drain() {
        let mut buffer = PumpBuffer::with_capacity(8).unwrap();
        push(&mut buffer, b"abcdef");
        assert_eq!(buffer.len(), 6);
        assert_eq!(buffer.free(), 2);

        assert_eq!(buffer.drain(2), 2);
        assert_eq!(buffer.filled(), b"cdef");
        assert!(!buffer.is_compact());
        assert_eq!(buffer.free(), 2);

        buffer.compact();
        assert!(buffer.is_compact());
        assert_eq!(buffer.filled(), b"cdef");
        assert_eq!(buffer.free(), 4);
    }

    #[test]
    fn test_drain_everything_resets() {
        let mut buffer = PumpBuffer::with_capacity(4).unwrap();
        push(&mut buffer, b"abcd");
        assert_eq!(buffer.free(), 0);
        assert_eq!(buffer.drain(10), 4);
        assert!(buffer.is_empty());
        assert!(buffer.is_compact());
        assert_eq!(buffer.free(), 4);
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(5)]
    #[case(16)]
    fn test_len_never_exceeds_capacity(#[case] capacity: usize) {
        let mut buffer = PumpBuffer::with_capacity(capacity).unwrap();
        let input: Vec<u8> = (0..64u8).collect();
        let mut output = Vec::new();
        let mut offset = 0;

        while output.len() < input.len() {
            buffer.compact();
            let take = (input.len() - offset).min(buffer.free());
            push(&mut buffer, &input[offset..offset + take]);
            offset += take;
            assert!(buffer.len() <= buffer.capacity());

            let half = (buffer.len() + 1) / 2;
            output.extend_from_slice(&buffer.filled()[..half]);
            buffer.drain(half);
        }

        assert_eq!(output, input);
    }

    #[test]
    fn test_clear() {
        let mut buffer = PumpBuffer::with_capacity(4).unwrap();
        push(&mut buffer, b"ab");
        buffer.drain(1);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.free(), 4);
    }
}
