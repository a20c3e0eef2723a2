//! Forward index readers: doc id -> dictionary id(s)
//!
//! Single-value layout (`.fwd`):
//! ```text
//! [packed dict ids: total_docs × bits_per_element bits, LSB-first]
//! ```
//!
//! Multi-value layout (`.fwd`):
//! ```text
//! [header: total_docs × (start: u32 LE, len: u32 LE)]
//! [packed dict ids: sum(len) × bits_per_element bits, LSB-first]
//! ```

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::directories::OwnedBytes;
use crate::structures::{PackedBits, bitpack_write};
use crate::{DictId, DocId, Error, Result};

const MULTI_HEADER_ENTRY: usize = 8;

/// Reader for a column holding exactly one value per document.
#[derive(Debug, Clone)]
pub struct SingleValueForwardIndex {
    ids: PackedBits,
}

impl SingleValueForwardIndex {
    pub fn open(data: OwnedBytes, total_docs: u32, bits_per_element: u8) -> Result<Self> {
        let ids = PackedBits::open(data, bits_per_element, total_docs as usize)?;
        Ok(Self { ids })
    }

    pub fn num_docs(&self) -> u32 {
        self.ids.len() as u32
    }

    pub fn bits_per_element(&self) -> u8 {
        self.ids.bits_per_value()
    }

    pub fn get(&self, doc: DocId) -> Result<DictId> {
        self.check_doc(doc)?;
        Ok(self.ids.get(doc as usize))
    }

    /// Append dictionary ids of docs `[start, start + count)` to `out`.
    pub fn read_range_into(&self, start: DocId, count: u32, out: &mut Vec<DictId>) -> Result<()> {
        let end = start as u64 + count as u64;
        if end > self.ids.len() as u64 {
            return Err(Error::out_of_range("doc id", end.saturating_sub(1), self.ids.len() as u64));
        }
        self.ids.read_range_into(start as usize, count as usize, out);
        Ok(())
    }

    fn check_doc(&self, doc: DocId) -> Result<()> {
        if doc as usize >= self.ids.len() {
            return Err(Error::out_of_range("doc id", doc as u64, self.ids.len() as u64));
        }
        Ok(())
    }
}

/// Reader for a column holding an ordered, possibly empty, list of values
/// per document.
#[derive(Debug, Clone)]
pub struct MultiValueForwardIndex {
    header: OwnedBytes,
    ids: PackedBits,
    num_docs: u32,
}

impl MultiValueForwardIndex {
    pub fn open(data: OwnedBytes, total_docs: u32, bits_per_element: u8) -> Result<Self> {
        let header_len = total_docs as usize * MULTI_HEADER_ENTRY;
        if data.len() < header_len {
            return Err(Error::corrupt(format!(
                "multi-value header holds {} bytes, {} docs need {}",
                data.len(),
                total_docs,
                header_len
            )));
        }
        let header = data.slice(0..header_len);

        // Entries must tile the flat array in doc order.
        let raw = header.as_slice();
        let mut expected_start = 0u64;
        for doc in 0..total_docs as usize {
            let entry = &raw[doc * MULTI_HEADER_ENTRY..(doc + 1) * MULTI_HEADER_ENTRY];
            let start = LittleEndian::read_u32(&entry[0..4]) as u64;
            let len = LittleEndian::read_u32(&entry[4..8]) as u64;
            if start != expected_start {
                return Err(Error::corrupt(format!(
                    "multi-value doc {} starts at {}, expected {}",
                    doc, start, expected_start
                )));
            }
            expected_start = start + len;
        }
        if expected_start > u32::MAX as u64 {
            return Err(Error::corrupt(format!(
                "multi-value column holds {} values",
                expected_start
            )));
        }

        let ids = PackedBits::open(
            data.slice(header_len..data.len()),
            bits_per_element,
            expected_start as usize,
        )?;
        Ok(Self {
            header,
            ids,
            num_docs: total_docs,
        })
    }

    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    pub fn bits_per_element(&self) -> u8 {
        self.ids.bits_per_value()
    }

    /// Total number of values across all documents.
    pub fn total_values(&self) -> usize {
        self.ids.len()
    }

    /// `(start, len)` of the doc's run in the flat array.
    fn entry(&self, doc: DocId) -> Result<(usize, usize)> {
        if doc >= self.num_docs {
            return Err(Error::out_of_range("doc id", doc as u64, self.num_docs as u64));
        }
        let off = doc as usize * MULTI_HEADER_ENTRY;
        let raw = &self.header.as_slice()[off..off + MULTI_HEADER_ENTRY];
        Ok((
            LittleEndian::read_u32(&raw[0..4]) as usize,
            LittleEndian::read_u32(&raw[4..8]) as usize,
        ))
    }

    pub fn value_count(&self, doc: DocId) -> Result<usize> {
        Ok(self.entry(doc)?.1)
    }

    pub fn get(&self, doc: DocId) -> Result<Vec<DictId>> {
        let mut out = Vec::new();
        self.get_into(doc, &mut out)?;
        Ok(out)
    }

    /// Replace the contents of `out` with the doc's dictionary ids.
    pub fn get_into(&self, doc: DocId, out: &mut Vec<DictId>) -> Result<()> {
        let (start, len) = self.entry(doc)?;
        out.clear();
        self.ids.read_range_into(start, len, out);
        Ok(())
    }
}

/// Forward index of either shape, as selected by the column metadata.
#[derive(Debug, Clone)]
pub enum ForwardIndex {
    Single(SingleValueForwardIndex),
    Multi(MultiValueForwardIndex),
}

impl ForwardIndex {
    pub fn is_single_value(&self) -> bool {
        matches!(self, ForwardIndex::Single(_))
    }

    pub fn num_docs(&self) -> u32 {
        match self {
            ForwardIndex::Single(f) => f.num_docs(),
            ForwardIndex::Multi(f) => f.num_docs(),
        }
    }

    pub fn bits_per_element(&self) -> u8 {
        match self {
            ForwardIndex::Single(f) => f.bits_per_element(),
            ForwardIndex::Multi(f) => f.bits_per_element(),
        }
    }

    pub fn as_single(&self) -> Option<&SingleValueForwardIndex> {
        match self {
            ForwardIndex::Single(f) => Some(f),
            ForwardIndex::Multi(_) => None,
        }
    }

    pub fn as_multi(&self) -> Option<&MultiValueForwardIndex> {
        match self {
            ForwardIndex::Multi(f) => Some(f),
            ForwardIndex::Single(_) => None,
        }
    }
}

impl From<SingleValueForwardIndex> for ForwardIndex {
    fn from(f: SingleValueForwardIndex) -> Self {
        ForwardIndex::Single(f)
    }
}

impl From<MultiValueForwardIndex> for ForwardIndex {
    fn from(f: MultiValueForwardIndex) -> Self {
        ForwardIndex::Multi(f)
    }
}

/// Serialize a single-value forward index, one dictionary id per doc.
pub fn write_single_value(ids: &[DictId], bits_per_element: u8, out: &mut Vec<u8>) {
    bitpack_write(ids, bits_per_element, out);
}

/// Serialize a multi-value forward index from per-doc id lists.
pub fn write_multi_value(
    docs: &[Vec<DictId>],
    bits_per_element: u8,
    out: &mut Vec<u8>,
) -> Result<()> {
    let mut start = 0u32;
    for values in docs {
        let len = u32::try_from(values.len())
            .map_err(|_| Error::corrupt("multi-value doc holds more than u32::MAX values"))?;
        out.write_u32::<LittleEndian>(start)?;
        out.write_u32::<LittleEndian>(len)?;
        start = start
            .checked_add(len)
            .ok_or_else(|| Error::corrupt("multi-value column holds more than u32::MAX values"))?;
    }
    let flat: Vec<DictId> = docs.iter().flatten().copied().collect();
    bitpack_write(&flat, bits_per_element, out);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_value_get() {
        let ids: Vec<DictId> = (0..1000).map(|i| i % 13).collect();
        let mut buf = Vec::new();
        write_single_value(&ids, 4, &mut buf);
        let fwd = SingleValueForwardIndex::open(OwnedBytes::new(buf), 1000, 4).unwrap();

        assert_eq!(fwd.num_docs(), 1000);
        for (doc, &id) in ids.iter().enumerate() {
            assert_eq!(fwd.get(doc as DocId).unwrap(), id);
        }
        let mut range = Vec::new();
        fwd.read_range_into(990, 10, &mut range).unwrap();
        assert_eq!(range, &ids[990..]);
    }

    #[test]
    fn test_single_value_out_of_range() {
        let mut buf = Vec::new();
        write_single_value(&[1, 0, 1], 1, &mut buf);
        let fwd = SingleValueForwardIndex::open(OwnedBytes::new(buf), 3, 1).unwrap();
        assert!(matches!(
            fwd.get(3),
            Err(Error::OutOfRange { what: "doc id", index: 3, bound: 3 })
        ));
        let mut out = Vec::new();
        assert!(fwd.read_range_into(2, 2, &mut out).is_err());
    }

    #[test]
    fn test_multi_value_roundtrip() {
        let mut docs: Vec<Vec<DictId>> = vec![vec![]; 8];
        docs[0] = vec![1];
        docs[2] = vec![4, 4];
        docs[5] = vec![7, 3, 9];
        docs[7] = vec![0, 15];

        let mut buf = Vec::new();
        write_multi_value(&docs, 4, &mut buf).unwrap();
        let fwd = MultiValueForwardIndex::open(OwnedBytes::new(buf), 8, 4).unwrap();

        assert_eq!(fwd.get(5).unwrap(), vec![7, 3, 9]);
        assert_eq!(fwd.value_count(5).unwrap(), 3);
        assert!(fwd.get(1).unwrap().is_empty());
        assert_eq!(fwd.value_count(1).unwrap(), 0);
        assert_eq!(fwd.total_values(), 8);

        let mut scratch = vec![99, 99, 99, 99];
        fwd.get_into(7, &mut scratch).unwrap();
        assert_eq!(scratch, vec![0, 15]);

        assert!(matches!(fwd.get(8), Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn test_multi_value_rejects_gapped_header() {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(0).unwrap();
        buf.write_u32::<LittleEndian>(2).unwrap();
        buf.write_u32::<LittleEndian>(3).unwrap();
        buf.write_u32::<LittleEndian>(1).unwrap();
        bitpack_write(&[1, 2, 3, 4], 3, &mut buf);
        let err = MultiValueForwardIndex::open(OwnedBytes::new(buf), 2, 3).unwrap_err();
        assert!(matches!(err, Error::CorruptLayout(_)));
    }

    #[test]
    fn test_multi_value_rejects_short_payload() {
        let docs = vec![vec![1, 2, 3], vec![4, 5]];
        let mut buf = Vec::new();
        write_multi_value(&docs, 8, &mut buf).unwrap();
        buf.truncate(buf.len() - 1);
        let err = MultiValueForwardIndex::open(OwnedBytes::new(buf), 2, 8).unwrap_err();
        assert!(matches!(err, Error::CorruptLayout(_)));
    }

    #[test]
    fn test_forward_index_shape() {
        let mut buf = Vec::new();
        write_single_value(&[0, 1], 1, &mut buf);
        let fwd: ForwardIndex = SingleValueForwardIndex::open(OwnedBytes::new(buf), 2, 1)
            .unwrap()
            .into();
        assert!(fwd.is_single_value());
        assert!(fwd.as_multi().is_none());
        assert_eq!(fwd.num_docs(), 2);
    }
}
