/// Growable byte buffer used by the frame decoder.
///
/// Scanning logic lives in the decoder; this type only appends, searches and
/// drops bytes from the front.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    bytes: Vec<u8>,
}

impl FrameBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Drops `n` bytes from the front (everything if `n >= len`).
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.bytes.len());
        self.bytes.drain(..n);
    }

    /// Keeps only the last `keep` bytes. Returns how many bytes were dropped.
    pub fn retain_tail(&mut self, keep: usize) -> usize {
        let drop = self.bytes.len().saturating_sub(keep);
        self.consume(drop);
        drop
    }

    /// Offset of the first occurrence of `pattern`.
    pub fn find(&self, pattern: &[u8]) -> Option<usize> {
        if pattern.is_empty() || self.bytes.len() < pattern.len() {
            return None;
        }
        self.bytes.windows(pattern.len()).position(|w| w == pattern)
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}
