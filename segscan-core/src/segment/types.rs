//! Column metadata and data types

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::structures::{MAX_BITS_PER_VALUE, bits_for_cardinality};
use crate::{Error, Result};

/// Value type of a dictionary-encoded column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    Int,
    Long,
    Float,
    Double,
    String,
    Boolean,
}

impl DataType {
    /// Parse a type name as written in segment metadata (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "INT" => Ok(Self::Int),
            "LONG" => Ok(Self::Long),
            "FLOAT" => Ok(Self::Float),
            "DOUBLE" => Ok(Self::Double),
            "STRING" => Ok(Self::String),
            "BOOLEAN" => Ok(Self::Boolean),
            _ => Err(Error::UnsupportedType(name.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Int => "INT",
            Self::Long => "LONG",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::String => "STRING",
            Self::Boolean => "BOOLEAN",
        }
    }

    /// Byte width of one dictionary entry, `None` for variable-width types.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            Self::Int | Self::Float => Some(4),
            Self::Long | Self::Double => Some(8),
            Self::String | Self::Boolean => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable per-column descriptor, created once at segment load and shared
/// read-only by every reader of the column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub column_name: String,
    pub data_type: DataType,
    pub single_value: bool,
    /// Documents in the segment; doc ids range over `[0, total_docs)`.
    pub total_docs: u32,
    /// Dictionary size; dictionary ids range over `[0, cardinality)`.
    pub cardinality: u32,
    /// Packed width of one dictionary id in the forward index.
    pub bits_per_element: u8,
}

impl ColumnMetadata {
    /// Metadata with the minimal packed width for `cardinality`.
    pub fn new(
        column_name: impl Into<String>,
        data_type: DataType,
        single_value: bool,
        total_docs: u32,
        cardinality: u32,
    ) -> Self {
        Self {
            column_name: column_name.into(),
            data_type,
            single_value,
            total_docs,
            cardinality,
            bits_per_element: bits_for_cardinality(cardinality),
        }
    }

    pub fn is_single_value(&self) -> bool {
        self.single_value
    }

    /// Check the packed width can hold every dictionary id.
    pub fn validate(&self) -> Result<()> {
        let min_bits = bits_for_cardinality(self.cardinality);
        if self.bits_per_element < min_bits || self.bits_per_element > MAX_BITS_PER_VALUE {
            return Err(Error::corrupt(format!(
                "column {}: bits_per_element {} invalid for cardinality {} (need {}..={})",
                self.column_name,
                self.bits_per_element,
                self.cardinality,
                min_bits,
                MAX_BITS_PER_VALUE
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_from_name() {
        assert_eq!(DataType::from_name("int").unwrap(), DataType::Int);
        assert_eq!(DataType::from_name("Double").unwrap(), DataType::Double);
        assert_eq!(DataType::from_name("BOOLEAN").unwrap(), DataType::Boolean);
        assert!(matches!(
            DataType::from_name("BYTES"),
            Err(Error::UnsupportedType(name)) if name == "BYTES"
        ));
    }

    #[test]
    fn test_metadata_bits() {
        let meta = ColumnMetadata::new("country", DataType::String, true, 100, 5);
        assert_eq!(meta.bits_per_element, 3);
        meta.validate().unwrap();

        let narrow = ColumnMetadata {
            bits_per_element: 2,
            ..meta.clone()
        };
        assert!(matches!(narrow.validate(), Err(Error::CorruptLayout(_))));

        let wide = ColumnMetadata {
            bits_per_element: 12,
            ..meta
        };
        wide.validate().unwrap();
    }

    #[test]
    fn test_metadata_serde() {
        let meta = ColumnMetadata::new("tags", DataType::Long, false, 10, 300);
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"LONG\""));
        let back: ColumnMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }
}
