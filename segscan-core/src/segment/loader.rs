//! Column reader loaders
//!
//! Each loader opens one column file in the requested [`ReadMode`] and checks
//! it against the column's [`ColumnMetadata`] before handing out a reader.

use std::path::{Path, PathBuf};

use crate::directories::{ReadMode, open_file};
use crate::index::{
    Dictionary, ForwardIndex, InvertedIndex, MultiValueForwardIndex, SingleValueForwardIndex,
};
use crate::Result;

use super::ColumnMetadata;

/// Paths of a column's files inside a segment directory.
#[derive(Debug, Clone)]
pub struct ColumnFiles {
    pub dictionary: PathBuf,
    pub forward: PathBuf,
    pub inverted: PathBuf,
}

impl ColumnFiles {
    pub fn new(dir: &Path, column: &str) -> Self {
        Self {
            dictionary: dir.join(format!("{}.dict", column)),
            forward: dir.join(format!("{}.fwd", column)),
            inverted: dir.join(format!("{}.inv", column)),
        }
    }
}

/// Load the column dictionary, decoding entries per `meta.data_type`.
pub fn load_dictionary(meta: &ColumnMetadata, path: &Path, mode: ReadMode) -> Result<Dictionary> {
    let data = open_file(path, mode)?;
    log::debug!(
        "Loading dictionary {}: type={}, cardinality={}, size={} bytes, mode={:?}",
        meta.column_name,
        meta.data_type,
        meta.cardinality,
        data.len(),
        mode
    );
    Dictionary::open(data, meta.data_type, meta.cardinality)
}

/// Load the forward index, single- or multi-value per `meta.single_value`.
pub fn load_forward_index(
    meta: &ColumnMetadata,
    path: &Path,
    mode: ReadMode,
) -> Result<ForwardIndex> {
    meta.validate()?;
    let data = open_file(path, mode)?;
    log::debug!(
        "Loading forward index {}: single_value={}, docs={}, bits={}, size={} bytes, mode={:?}",
        meta.column_name,
        meta.single_value,
        meta.total_docs,
        meta.bits_per_element,
        data.len(),
        mode
    );
    if meta.single_value {
        SingleValueForwardIndex::open(data, meta.total_docs, meta.bits_per_element)
            .map(ForwardIndex::Single)
    } else {
        MultiValueForwardIndex::open(data, meta.total_docs, meta.bits_per_element)
            .map(ForwardIndex::Multi)
    }
}

/// Load the inverted index; `Heap` decodes every bitmap up front.
pub fn load_inverted_index(
    meta: &ColumnMetadata,
    path: &Path,
    mode: ReadMode,
) -> Result<InvertedIndex> {
    let data = open_file(path, mode)?;
    log::debug!(
        "Loading inverted index {}: cardinality={}, size={} bytes, mode={:?}",
        meta.column_name,
        meta.cardinality,
        data.len(),
        mode
    );
    InvertedIndex::open(data, meta.cardinality, mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::index::{Value, write_dictionary, write_inverted_index, write_single_value};
    use crate::segment::DataType;
    use crate::structures::RoaringBitmap;
    use tempfile::TempDir;

    fn write_column(dir: &Path) -> ColumnMetadata {
        let meta = ColumnMetadata::new("age", DataType::Int, true, 4, 3);
        let files = ColumnFiles::new(dir, "age");

        let mut buf = Vec::new();
        write_dictionary(DataType::Int, &[30.into(), 10.into(), 20.into()], &mut buf).unwrap();
        std::fs::write(&files.dictionary, &buf).unwrap();

        buf.clear();
        write_single_value(&[0, 2, 1, 2], meta.bits_per_element, &mut buf);
        std::fs::write(&files.forward, &buf).unwrap();

        buf.clear();
        let bitmaps = vec![
            RoaringBitmap::from_sorted_slice(&[0]),
            RoaringBitmap::from_sorted_slice(&[2]),
            RoaringBitmap::from_sorted_slice(&[1, 3]),
        ];
        write_inverted_index(&bitmaps, &mut buf).unwrap();
        std::fs::write(&files.inverted, &buf).unwrap();
        meta
    }

    #[test]
    fn test_load_column_both_modes() {
        let temp_dir = TempDir::new().unwrap();
        let meta = write_column(temp_dir.path());
        let files = ColumnFiles::new(temp_dir.path(), "age");

        for mode in [ReadMode::Heap, ReadMode::Mmap] {
            let dict = load_dictionary(&meta, &files.dictionary, mode).unwrap();
            assert_eq!(dict.value_at(2).unwrap(), Value::Int(30));

            let fwd = load_forward_index(&meta, &files.forward, mode).unwrap();
            assert_eq!(fwd.as_single().unwrap().get(3).unwrap(), 2);

            let inv = load_inverted_index(&meta, &files.inverted, mode).unwrap();
            assert!(inv.bitmap_for(2).unwrap().contains(3));
        }
    }

    #[test]
    fn test_load_rejects_mismatched_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let meta = write_column(temp_dir.path());
        let files = ColumnFiles::new(temp_dir.path(), "age");

        let wider = ColumnMetadata {
            total_docs: 400,
            ..meta.clone()
        };
        assert!(matches!(
            load_forward_index(&wider, &files.forward, ReadMode::Heap),
            Err(Error::CorruptLayout(_))
        ));

        let bigger = ColumnMetadata {
            cardinality: 10,
            bits_per_element: 4,
            ..meta.clone()
        };
        assert!(matches!(
            load_dictionary(&bigger, &files.dictionary, ReadMode::Mmap),
            Err(Error::CorruptLayout(_))
        ));
        assert!(matches!(
            load_inverted_index(&bigger, &files.inverted, ReadMode::Heap),
            Err(Error::CorruptLayout(_))
        ));

        let missing = temp_dir.path().join("nope.fwd");
        assert!(matches!(
            load_forward_index(&meta, &missing, ReadMode::Heap),
            Err(Error::Io(_))
        ));
    }
}
