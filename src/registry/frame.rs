//! Frame and client identifier types
//!
//! A `Frame` is one complete JPEG image cut out of the transcoder stream. It
//! is cheap to clone: all clients of a broadcast pass share the same
//! reference-counted allocation.

use bytes::Bytes;

/// One complete, marker-delimited image
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
}

impl Frame {
    /// Wrap encoded image bytes
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }

    /// Encoded bytes
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the frame has no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Take the underlying bytes
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Self::new(Bytes::from(data))
    }
}

/// Unique, monotonically assigned client identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_clone_shares_bytes() {
        let frame = Frame::from(vec![0xFF, 0xD8, 0xFF, 0xD9]);
        let copy = frame.clone();

        assert_eq!(frame.len(), 4);
        assert!(!frame.is_empty());
        assert_eq!(frame.data().as_ptr(), copy.data().as_ptr());
    }

    #[test]
    fn test_client_id_display_and_order() {
        assert_eq!(ClientId(7).to_string(), "client-7");
        assert!(ClientId(1) < ClientId(2));
    }
}
