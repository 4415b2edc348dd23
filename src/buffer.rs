//! The single growable chunk buffer (§2, §5).

use smallvec::SmallVec;

/// Chunks smaller than this are kept inline rather than heap-allocated.
const INLINE_THRESHOLD: usize = 256;

/// Holds the one archive chunk currently materialized. `step` empties it
/// before producing the next chunk; at most one chunk is ever live.
#[derive(Debug, Default)]
pub(crate) struct ChunkBuffer {
    data: SmallVec<[u8; INLINE_THRESHOLD]>,
}

impl ChunkBuffer {
    pub(crate) fn new() -> Self {
        ChunkBuffer::default()
    }

    /// True once a builder has filled the buffer for the current state.
    pub(crate) fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Discards any previously produced chunk.
    pub(crate) fn clear(&mut self) {
        self.data.clear();
    }

    /// Appends raw bytes to the buffer.
    pub(crate) fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Reserves and zero-fills `additional` bytes at the end of the buffer,
    /// returning their range so the caller can fill them in place (used for
    /// the raw payload reader, which reads directly into the buffer).
    pub(crate) fn acquire_exact(&mut self, additional: usize) -> &mut [u8] {
        let start = self.data.len();
        self.data.resize(start + additional, 0);
        &mut self.data[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let b = ChunkBuffer::new();
        assert!(b.is_empty());
        assert_eq!(b.len(), 0);
    }

    #[test]
    fn clear_resets_to_empty() {
        let mut b = ChunkBuffer::new();
        b.extend_from_slice(b"abc");
        assert_eq!(b.len(), 3);
        b.clear();
        assert!(b.is_empty());
    }

    #[test]
    fn acquire_exact_grows_and_is_writable() {
        let mut b = ChunkBuffer::new();
        let slice = b.acquire_exact(4);
        slice.copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(b.as_slice(), &[1, 2, 3, 4]);
    }
}
