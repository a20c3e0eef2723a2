//! Inverted index reader: dictionary id -> doc id bitmap
//!
//! File format (`.inv`):
//! ```text
//! [offsets: (cardinality + 1) × u64 LE]   relative to the end of this table
//! [bitmap 0][bitmap 1]...[bitmap cardinality-1]   serialized RoaringBitmap
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::directories::{OwnedBytes, ReadMode};
use crate::structures::RoaringBitmap;
use crate::{DictId, Error, Result};

enum Postings {
    /// Decoded at open time.
    Decoded(Vec<Arc<RoaringBitmap>>),
    /// Decoded from the backing bytes on each lookup.
    Lazy {
        offsets: OwnedBytes,
        payload: OwnedBytes,
    },
}

/// Per-column inverted index, shared read-only across queries.
pub struct InvertedIndex {
    cardinality: u32,
    postings: Postings,
    lookups: AtomicU64,
}

impl std::fmt::Debug for InvertedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvertedIndex")
            .field("cardinality", &self.cardinality)
            .field("eager", &matches!(self.postings, Postings::Decoded(_)))
            .finish()
    }
}

impl InvertedIndex {
    /// Open an inverted index with `cardinality` bitmaps.
    ///
    /// `Heap` decodes every bitmap up front; `Mmap` keeps the bytes and decodes
    /// on demand so only touched pages are read.
    pub fn open(data: OwnedBytes, cardinality: u32, mode: ReadMode) -> Result<Self> {
        let table_len = (cardinality as usize + 1) * 8;
        if data.len() < table_len {
            return Err(Error::corrupt(format!(
                "inverted index holds {} bytes, offset table needs {}",
                data.len(),
                table_len
            )));
        }
        let offsets = data.slice(0..table_len);
        let payload = data.slice(table_len..data.len());

        let raw = offsets.as_slice();
        let mut prev = 0u64;
        for i in 0..=cardinality as usize {
            let off = LittleEndian::read_u64(&raw[i * 8..i * 8 + 8]);
            if off < prev || off > payload.len() as u64 {
                return Err(Error::corrupt(format!(
                    "inverted index offset {} = {} (previous {}, payload {})",
                    i,
                    off,
                    prev,
                    payload.len()
                )));
            }
            prev = off;
        }

        let postings = match mode {
            ReadMode::Heap => {
                let mut decoded = Vec::with_capacity(cardinality as usize);
                for id in 0..cardinality {
                    decoded.push(Arc::new(decode_at(&offsets, &payload, id)?));
                }
                Postings::Decoded(decoded)
            }
            ReadMode::Mmap => Postings::Lazy { offsets, payload },
        };

        Ok(Self {
            cardinality,
            postings,
            lookups: AtomicU64::new(0),
        })
    }

    /// Build an in-memory index from already-built bitmaps.
    pub fn from_bitmaps(bitmaps: Vec<RoaringBitmap>) -> Self {
        Self {
            cardinality: bitmaps.len() as u32,
            postings: Postings::Decoded(bitmaps.into_iter().map(Arc::new).collect()),
            lookups: AtomicU64::new(0),
        }
    }

    pub fn cardinality(&self) -> u32 {
        self.cardinality
    }

    /// Number of `bitmap_for` calls served so far.
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Doc ids holding dictionary id `id`.
    pub fn bitmap_for(&self, id: DictId) -> Result<Arc<RoaringBitmap>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        if id >= self.cardinality {
            return Err(Error::out_of_range(
                "dictionary id",
                id as u64,
                self.cardinality as u64,
            ));
        }
        match &self.postings {
            Postings::Decoded(bitmaps) => Ok(Arc::clone(&bitmaps[id as usize])),
            Postings::Lazy { offsets, payload } => Ok(Arc::new(decode_at(offsets, payload, id)?)),
        }
    }
}

fn decode_at(offsets: &OwnedBytes, payload: &OwnedBytes, id: DictId) -> Result<RoaringBitmap> {
    let raw = offsets.as_slice();
    let i = id as usize * 8;
    let start = LittleEndian::read_u64(&raw[i..i + 8]) as usize;
    let end = LittleEndian::read_u64(&raw[i + 8..i + 16]) as usize;
    RoaringBitmap::deserialize(&payload.as_slice()[start..end])
        .map_err(|e| Error::corrupt(format!("inverted index bitmap {}: {}", id, e)))
}

/// Serialize one bitmap per dictionary id, in id order.
pub fn write_inverted_index(bitmaps: &[RoaringBitmap], out: &mut Vec<u8>) -> Result<()> {
    let mut payload = Vec::new();
    let mut offsets = Vec::with_capacity(bitmaps.len() + 1);
    for bitmap in bitmaps {
        offsets.push(payload.len() as u64);
        bitmap.serialize(&mut payload)?;
    }
    offsets.push(payload.len() as u64);

    out.reserve(offsets.len() * 8 + payload.len());
    for off in offsets {
        out.write_u64::<LittleEndian>(off)?;
    }
    out.extend_from_slice(&payload);
    Ok(())
}
