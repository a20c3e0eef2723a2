//! Read-only sorted column dictionary
//!
//! Maps each distinct column value to a dense id in `[0, cardinality)` and
//! back. Entries are stored sorted by value so that equality and range
//! lookups are binary searches over the backing bytes.
//!
//! ## File format (`.dict`)
//!
//! ```text
//! INT / FLOAT:     [value: 4 bytes LE] × cardinality
//! LONG / DOUBLE:   [value: 8 bytes LE] × cardinality
//! STRING/BOOLEAN:  [len: u32 LE][utf8 bytes] × cardinality
//! ```
//!
//! Booleans are stored as the strings `"false"` and `"true"`.

use std::cmp::Ordering;
use std::ops::{Bound, Range};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::directories::OwnedBytes;
use crate::segment::DataType;
use crate::{DictId, Error, Result};

use super::Value;

enum Entries {
    /// Fixed-width numeric entries, `width` bytes each.
    Fixed { data: OwnedBytes, width: usize },
    /// Length-prefixed UTF-8 entries with an offset table built at open time.
    Text {
        data: OwnedBytes,
        offsets: Vec<(u32, u32)>,
    },
}

/// Sorted, immutable dictionary for one column.
///
/// Safe to share across threads; lookups only read the backing bytes.
pub struct Dictionary {
    data_type: DataType,
    cardinality: u32,
    entries: Entries,
    searches: AtomicU64,
}

impl std::fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dictionary")
            .field("data_type", &self.data_type)
            .field("cardinality", &self.cardinality)
            .finish()
    }
}

impl Dictionary {
    /// Open a dictionary of `cardinality` entries stored at the start of `data`.
    pub fn open(data: OwnedBytes, data_type: DataType, cardinality: u32) -> Result<Self> {
        let entries = match data_type.fixed_width() {
            Some(width) => {
                let needed = cardinality as usize * width;
                if data.len() < needed {
                    return Err(Error::corrupt(format!(
                        "{} dictionary holds {} bytes, {} entries need {}",
                        data_type,
                        data.len(),
                        cardinality,
                        needed
                    )));
                }
                Entries::Fixed {
                    data: data.slice(0..needed),
                    width,
                }
            }
            None => Self::open_text(data, cardinality)?,
        };
        Ok(Self {
            data_type,
            cardinality,
            entries,
            searches: AtomicU64::new(0),
        })
    }

    fn open_text(data: OwnedBytes, cardinality: u32) -> Result<Entries> {
        let raw = data.as_slice();
        let mut pos = 0usize;
        let mut offsets = Vec::with_capacity(cardinality as usize);

        for ordinal in 0..cardinality {
            let len_bytes = raw.get(pos..pos + 4).ok_or_else(|| {
                Error::corrupt(format!("text dictionary truncated at entry {}", ordinal))
            })?;
            let len = LittleEndian::read_u32(len_bytes) as usize;
            pos += 4;
            let bytes = raw.get(pos..pos + len).ok_or_else(|| {
                Error::corrupt(format!("text dictionary entry {} truncated", ordinal))
            })?;
            std::str::from_utf8(bytes).map_err(|e| {
                Error::corrupt(format!("text dictionary entry {}: {}", ordinal, e))
            })?;
            offsets.push((pos as u32, len as u32));
            pos += len;
        }

        Ok(Entries::Text {
            data: data.slice(0..pos),
            offsets,
        })
    }

    /// Build an in-memory dictionary from arbitrary values of `data_type`.
    pub fn from_values(data_type: DataType, values: &[Value]) -> Result<Self> {
        let mut buf = Vec::new();
        let cardinality = write_dictionary(data_type, values, &mut buf)?;
        Self::open(OwnedBytes::new(buf), data_type, cardinality)
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn cardinality(&self) -> u32 {
        self.cardinality
    }

    pub fn is_empty(&self) -> bool {
        self.cardinality == 0
    }

    /// Number of value searches (`id_of` / range resolution) served so far.
    pub fn search_count(&self) -> u64 {
        self.searches.load(AtomicOrdering::Relaxed)
    }

    /// Value stored under `id`.
    pub fn value_at(&self, id: DictId) -> Result<Value> {
        self.check_id(id)?;
        Ok(self.decode(id))
    }

    /// Borrowed text of `id` for string/boolean dictionaries, `None` otherwise.
    pub fn text_at(&self, id: DictId) -> Result<Option<&str>> {
        self.check_id(id)?;
        Ok(match &self.entries {
            Entries::Text { .. } => Some(self.text(id)),
            Entries::Fixed { .. } => None,
        })
    }

    /// Id of `value`, `None` if absent or not comparable with this column's type.
    pub fn id_of(&self, value: &Value) -> Option<DictId> {
        self.searches.fetch_add(1, AtomicOrdering::Relaxed);
        if !self.accepts(value) {
            return None;
        }
        let idx = self.partition_point(|id| self.compare_entry(id, value) == Ordering::Less);
        (idx < self.cardinality && self.compare_entry(idx, value) == Ordering::Equal)
            .then_some(idx)
    }

    /// Contiguous id range of entries within `(lower, upper)`.
    ///
    /// Returns `None` when a bound is not comparable with this column's type.
    /// An empty range means nothing in the dictionary falls in the bounds.
    pub fn ids_in_range(&self, lower: Bound<&Value>, upper: Bound<&Value>) -> Option<Range<DictId>> {
        self.searches.fetch_add(1, AtomicOrdering::Relaxed);
        let start = match lower {
            Bound::Unbounded => 0,
            Bound::Included(v) if self.accepts(v) => {
                self.partition_point(|id| self.compare_entry(id, v) == Ordering::Less)
            }
            Bound::Excluded(v) if self.accepts(v) => {
                self.partition_point(|id| self.compare_entry(id, v) != Ordering::Greater)
            }
            _ => return None,
        };
        let end = match upper {
            Bound::Unbounded => self.cardinality,
            Bound::Included(v) if self.accepts(v) => {
                self.partition_point(|id| self.compare_entry(id, v) != Ordering::Greater)
            }
            Bound::Excluded(v) if self.accepts(v) => {
                self.partition_point(|id| self.compare_entry(id, v) == Ordering::Less)
            }
            _ => return None,
        };
        Some(start..end.max(start))
    }

    /// Iterate all values in id order.
    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.cardinality).map(|id| self.decode(id))
    }

    fn check_id(&self, id: DictId) -> Result<()> {
        if id >= self.cardinality {
            return Err(Error::out_of_range(
                "dictionary id",
                id as u64,
                self.cardinality as u64,
            ));
        }
        Ok(())
    }

    /// Whether `value` shares a comparison domain with this column.
    fn accepts(&self, value: &Value) -> bool {
        match self.data_type {
            DataType::Int | DataType::Long | DataType::Float | DataType::Double => {
                value.as_f64().is_some()
            }
            DataType::String => matches!(value, Value::String(_)),
            DataType::Boolean => matches!(value, Value::Boolean(_) | Value::String(_)),
        }
    }

    /// First id in `[0, cardinality)` for which `pred` is false.
    fn partition_point(&self, pred: impl Fn(DictId) -> bool) -> DictId {
        let (mut lo, mut hi) = (0u32, self.cardinality);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if pred(mid) {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    fn compare_entry(&self, id: DictId, target: &Value) -> Ordering {
        match &self.entries {
            Entries::Text { .. } => match target.as_text() {
                Some(text) => self.text(id).cmp(text),
                None => Ordering::Less,
            },
            Entries::Fixed { .. } => self
                .decode(id)
                .compare(target)
                .unwrap_or(Ordering::Less),
        }
    }

    fn text(&self, id: DictId) -> &str {
        match &self.entries {
            Entries::Text { data, offsets } => {
                let (off, len) = offsets[id as usize];
                let bytes = &data.as_slice()[off as usize..(off + len) as usize];
                // Validated as UTF-8 in open()
                std::str::from_utf8(bytes).unwrap_or_default()
            }
            Entries::Fixed { .. } => "",
        }
    }

    fn decode(&self, id: DictId) -> Value {
        match &self.entries {
            Entries::Fixed { data, width } => {
                let start = id as usize * width;
                let raw = &data.as_slice()[start..start + width];
                match self.data_type {
                    DataType::Int => Value::Int(LittleEndian::read_i32(raw)),
                    DataType::Float => Value::Float(LittleEndian::read_f32(raw)),
                    DataType::Long => Value::Long(LittleEndian::read_i64(raw)),
                    _ => Value::Double(LittleEndian::read_f64(raw)),
                }
            }
            Entries::Text { .. } => {
                let text = self.text(id);
                match self.data_type {
                    DataType::Boolean => Value::Boolean(text == "true"),
                    _ => Value::String(text.to_string()),
                }
            }
        }
    }
}

/// Serialize a dictionary of `data_type` holding the distinct `values`.
///
/// Values are sorted and deduplicated; the id of a value is its position in
/// sorted order. Returns the cardinality.
pub fn write_dictionary(data_type: DataType, values: &[Value], out: &mut Vec<u8>) -> Result<u32> {
    if let Some(bad) = values.iter().find(|v| v.data_type() != data_type) {
        return Err(Error::TypeMismatch(format!(
            "{} dictionary cannot hold {} value {}",
            data_type,
            bad.data_type(),
            bad
        )));
    }

    let mut sorted: Vec<&Value> = values.iter().collect();
    sorted.sort_by(|a, b| a.compare(b).unwrap_or(Ordering::Equal));
    sorted.dedup_by(|a, b| a.compare(b) == Some(Ordering::Equal));

    for value in &sorted {
        match value {
            Value::Int(v) => out.write_i32::<LittleEndian>(*v)?,
            Value::Long(v) => out.write_i64::<LittleEndian>(*v)?,
            Value::Float(v) => out.write_f32::<LittleEndian>(*v)?,
            Value::Double(v) => out.write_f64::<LittleEndian>(*v)?,
            Value::String(_) | Value::Boolean(_) => {
                let text = value.as_text().unwrap_or_default();
                out.write_u32::<LittleEndian>(text.len() as u32)?;
                out.extend_from_slice(text.as_bytes());
            }
        }
    }
    Ok(sorted.len() as u32)
}
