//! Segments and their columns
//!
//! A [`Segment`] is an immutable set of documents `[0, total_docs)` with one
//! [`ColumnReaders`] per column. Readers are `Arc`-shared so that any number of
//! concurrent queries can scan the same column.

mod loader;
mod types;

pub use loader::{ColumnFiles, load_dictionary, load_forward_index, load_inverted_index};
pub use types::{ColumnMetadata, DataType};

use std::path::Path;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::config::ScanConfig;
use crate::directories::ReadMode;
use crate::index::{Dictionary, ForwardIndex, InvertedIndex};
use crate::source::ColumnDataSource;
use crate::{Error, Result};

/// The three readers of one column plus its metadata.
#[derive(Debug, Clone)]
pub struct ColumnReaders {
    pub metadata: Arc<ColumnMetadata>,
    pub dictionary: Arc<Dictionary>,
    pub forward: Arc<ForwardIndex>,
    pub inverted: Arc<InvertedIndex>,
}

impl ColumnReaders {
    pub fn new(
        metadata: ColumnMetadata,
        dictionary: Dictionary,
        forward: ForwardIndex,
        inverted: InvertedIndex,
    ) -> Self {
        Self {
            metadata: Arc::new(metadata),
            dictionary: Arc::new(dictionary),
            forward: Arc::new(forward),
            inverted: Arc::new(inverted),
        }
    }

    /// Load `<column>.dict`, `<column>.fwd` and `<column>.inv` from `dir`.
    pub fn load(metadata: ColumnMetadata, dir: &Path, mode: ReadMode) -> Result<Self> {
        let files = ColumnFiles::new(dir, &metadata.column_name);
        let dictionary = load_dictionary(&metadata, &files.dictionary, mode)?;
        let forward = load_forward_index(&metadata, &files.forward, mode)?;
        let inverted = load_inverted_index(&metadata, &files.inverted, mode)?;
        Ok(Self::new(metadata, dictionary, forward, inverted))
    }

    /// Fresh per-query source over these readers.
    pub fn data_source(&self, config: &ScanConfig) -> Result<ColumnDataSource> {
        ColumnDataSource::new(
            Arc::clone(&self.metadata),
            Arc::clone(&self.dictionary),
            Arc::clone(&self.forward),
            Arc::clone(&self.inverted),
            config,
        )
    }
}

/// Immutable segment: a document count and its columns.
#[derive(Debug)]
pub struct Segment {
    name: String,
    total_docs: u32,
    config: ScanConfig,
    columns: FxHashMap<String, ColumnReaders>,
}

impl Segment {
    pub fn new(name: impl Into<String>, total_docs: u32, config: ScanConfig) -> Self {
        Self {
            name: name.into(),
            total_docs,
            config,
            columns: FxHashMap::default(),
        }
    }

    /// Load every column in `columns` from `dir` using `config.read_mode`.
    pub fn load(
        name: impl Into<String>,
        dir: &Path,
        total_docs: u32,
        columns: Vec<ColumnMetadata>,
        config: ScanConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut segment = Self::new(name, total_docs, config);
        for metadata in columns {
            let readers = ColumnReaders::load(metadata, dir, segment.config.read_mode)?;
            segment.add_column(readers)?;
        }
        log::debug!(
            "Segment {} loaded: docs={}, columns={}, mode={:?}",
            segment.name,
            segment.total_docs,
            segment.columns.len(),
            segment.config.read_mode
        );
        Ok(segment)
    }

    /// Register a column. Its doc count must match the segment's.
    pub fn add_column(&mut self, readers: ColumnReaders) -> Result<()> {
        if readers.metadata.total_docs != self.total_docs {
            return Err(Error::corrupt(format!(
                "segment {} has {} docs, column {} has {}",
                self.name, self.total_docs, readers.metadata.column_name, readers.metadata.total_docs
            )));
        }
        if let Some(old) = self
            .columns
            .insert(readers.metadata.column_name.clone(), readers)
        {
            log::warn!(
                "Segment {}: column {} registered twice, replacing",
                self.name,
                old.metadata.column_name
            );
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total_docs(&self) -> u32 {
        self.total_docs
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn column(&self, name: &str) -> Option<&ColumnReaders> {
        self.columns.get(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// New data source on `column` for one query.
    pub fn data_source(&self, column: &str) -> Result<ColumnDataSource> {
        self.column(column)
            .ok_or_else(|| {
                Error::InvalidState(format!("segment {} has no column {}", self.name, column))
            })?
            .data_source(&self.config)
    }
}
