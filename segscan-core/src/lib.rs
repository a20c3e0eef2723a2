//! Segscan - columnar scan-and-filter core for immutable segments
//!
//! This library provides:
//! - Sorted column dictionaries with binary-search equality and range lookups
//! - Bit-packed forward indexes for single- and multi-value columns
//! - Roaring-bitmap inverted indexes, read from the heap or a memory map
//! - Lazy, evaluate-once predicate filtering behind a per-column data source
//! - Fixed-capacity batching of doc ids into aggregation functions

pub mod aggregation;
pub mod config;
pub mod directories;
pub mod error;
pub mod index;
pub mod query;
pub mod segment;
pub mod source;
pub mod structures;

// Re-exports from index
pub use index::{Dictionary, ForwardIndex, InvertedIndex, Value};

// Re-exports from query
pub use query::{BitmapCombiner, Predicate};

// Re-exports from source
pub use source::{Block, BlockId, ColumnDataSource, DataSource, SourceState};

// Re-exports from other modules
pub use aggregation::{AggregationFunction, AggregationService};
pub use config::ScanConfig;
pub use directories::{OwnedBytes, ReadMode};
pub use error::{Error, Result};
pub use segment::{ColumnMetadata, ColumnReaders, DataType, Segment};
pub use structures::RoaringBitmap;

/// Document id within a segment, dense in `[0, total_docs)`.
pub type DocId = u32;
/// Dictionary id within a column, dense in `[0, cardinality)`.
pub type DictId = u32;
