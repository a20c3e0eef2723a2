//! Shared byte storage for column files
//!
//! Every reader in this crate decodes from an [`OwnedBytes`] view, regardless
//! of whether the bytes were read onto the heap or memory-mapped. Readers never
//! see the difference.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Cheaply cloneable, immutable view into a shared byte buffer.
///
/// The backing store is either a heap `Vec<u8>` or a memory map; slicing
/// shares the backing store (zero-copy).
#[derive(Clone)]
pub struct OwnedBytes {
    data: Arc<dyn AsRef<[u8]> + Send + Sync>,
    range: Range<usize>,
}

impl OwnedBytes {
    pub fn new(data: Vec<u8>) -> Self {
        let len = data.len();
        Self {
            data: Arc::new(data),
            range: 0..len,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Wrap any shared byte owner (e.g. a memory map).
    pub fn from_owner<T>(owner: Arc<T>) -> Self
    where
        T: AsRef<[u8]> + Send + Sync + 'static,
    {
        let len = (*owner).as_ref().len();
        Self {
            data: owner,
            range: 0..len,
        }
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Sub-view relative to this view. Callers validate bounds first.
    pub fn slice(&self, range: Range<usize>) -> Self {
        debug_assert!(range.start <= range.end && range.end <= self.len());
        let start = self.range.start + range.start;
        let end = self.range.start + range.end;
        Self {
            data: Arc::clone(&self.data),
            range: start..end,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &(*self.data).as_ref()[self.range.clone()]
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }
}

impl fmt::Debug for OwnedBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedBytes")
            .field("len", &self.len())
            .finish()
    }
}

impl AsRef<[u8]> for OwnedBytes {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl std::ops::Deref for OwnedBytes {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl From<Vec<u8>> for OwnedBytes {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owned_bytes_slice_shares_storage() {
        let bytes = OwnedBytes::new((0u8..32).collect());
        let mid = bytes.slice(8..24);
        assert_eq!(mid.len(), 16);
        assert_eq!(mid[0], 8);

        let inner = mid.slice(4..6);
        assert_eq!(inner.as_slice(), &[12, 13]);
        assert!(bytes.slice(5..5).is_empty());
    }
}
