//! Per-column scan facade
//!
//! A [`ColumnDataSource`] binds a column's dictionary, forward index and
//! inverted index for one query. It accepts an optional [`Predicate`],
//! resolves it into a doc-id bitmap the first time a block is requested, and
//! hands out [`Block`]s that share the cached bitmap.
//!
//! Lifecycle:
//! ```text
//! Unopened -> open() -> NoPredicate | PredicateSet -> (first block) -> Evaluated -> close() -> Closed
//! ```

mod block;

pub use block::{Block, BlockId};

use std::sync::Arc;

use crate::config::ScanConfig;
use crate::index::{Dictionary, ForwardIndex, InvertedIndex};
use crate::query::{BitmapCombiner, Predicate, resolve};
use crate::segment::ColumnMetadata;
use crate::structures::RoaringBitmap;
use crate::{DocId, Error, Result};

/// Capability set shared by column sources.
pub trait DataSource {
    /// Prepare for scanning. Idempotent.
    fn open(&mut self);

    /// Install `predicate`, replacing any previous one. A replaced predicate
    /// is evaluated again on the next block request.
    fn set_predicate(&mut self, predicate: Predicate);

    /// One-shot cursor: block 0 on the first call, `None` afterwards.
    fn next_block(&mut self) -> Result<Option<Block>>;

    /// Block `id`, independent of the cursor.
    fn next_block_at(&mut self, id: BlockId) -> Result<Block>;

    /// Finish scanning. The shared readers stay alive.
    fn close(&mut self);
}

/// Externally visible lifecycle state of a [`ColumnDataSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Unopened,
    NoPredicate,
    PredicateSet,
    Evaluated,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unopened,
    Open,
    Closed,
}

#[derive(Debug)]
enum FilterState {
    NoPredicate,
    Pending(Predicate),
    Evaluated {
        predicate: Predicate,
        bitmap: Arc<RoaringBitmap>,
    },
}

/// Column facade owned by a single query.
///
/// Not meant for concurrent use; the readers it holds are shared and may be
/// used by any number of other sources at once.
#[derive(Debug)]
pub struct ColumnDataSource {
    metadata: Arc<ColumnMetadata>,
    dictionary: Arc<Dictionary>,
    forward: Arc<ForwardIndex>,
    inverted: Arc<InvertedIndex>,
    docs_per_block: u32,
    phase: Phase,
    filter: FilterState,
    cursor_exhausted: bool,
    evaluations: u64,
}

impl ColumnDataSource {
    /// Bind the readers of one column.
    ///
    /// Fails with `TypeMismatch` when the forward index shape or dictionary
    /// type disagrees with `metadata`, and with `CorruptLayout` when reader
    /// sizes disagree with it.
    pub fn new(
        metadata: Arc<ColumnMetadata>,
        dictionary: Arc<Dictionary>,
        forward: Arc<ForwardIndex>,
        inverted: Arc<InvertedIndex>,
        config: &ScanConfig,
    ) -> Result<Self> {
        if metadata.single_value != forward.is_single_value() {
            return Err(Error::TypeMismatch(format!(
                "column {} declared {} but forward index is {}",
                metadata.column_name,
                shape_name(metadata.single_value),
                shape_name(forward.is_single_value())
            )));
        }
        if dictionary.data_type() != metadata.data_type {
            return Err(Error::TypeMismatch(format!(
                "column {} declared {} but dictionary holds {}",
                metadata.column_name,
                metadata.data_type,
                dictionary.data_type()
            )));
        }
        if dictionary.cardinality() != metadata.cardinality
            || inverted.cardinality() != metadata.cardinality
        {
            return Err(Error::corrupt(format!(
                "column {}: cardinality {} but dictionary has {} and inverted index {}",
                metadata.column_name,
                metadata.cardinality,
                dictionary.cardinality(),
                inverted.cardinality()
            )));
        }
        if forward.num_docs() != metadata.total_docs {
            return Err(Error::corrupt(format!(
                "column {}: {} docs but forward index has {}",
                metadata.column_name,
                metadata.total_docs,
                forward.num_docs()
            )));
        }

        let docs_per_block = config
            .docs_per_block
            .unwrap_or(metadata.total_docs)
            .max(1);

        Ok(Self {
            metadata,
            dictionary,
            forward,
            inverted,
            docs_per_block,
            phase: Phase::Unopened,
            filter: FilterState::NoPredicate,
            cursor_exhausted: false,
            evaluations: 0,
        })
    }

    pub fn metadata(&self) -> &ColumnMetadata {
        &self.metadata
    }

    pub fn state(&self) -> SourceState {
        match (self.phase, &self.filter) {
            (Phase::Unopened, _) => SourceState::Unopened,
            (Phase::Closed, _) => SourceState::Closed,
            (Phase::Open, FilterState::NoPredicate) => SourceState::NoPredicate,
            (Phase::Open, FilterState::Pending(_)) => SourceState::PredicateSet,
            (Phase::Open, FilterState::Evaluated { .. }) => SourceState::Evaluated,
        }
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        match &self.filter {
            FilterState::NoPredicate => None,
            FilterState::Pending(p) | FilterState::Evaluated { predicate: p, .. } => Some(p),
        }
    }

    /// Number of predicate evaluations run by this source.
    pub fn evaluation_count(&self) -> u64 {
        self.evaluations
    }

    pub fn num_blocks(&self) -> u32 {
        self.metadata.total_docs.div_ceil(self.docs_per_block).max(1)
    }

    fn ensure_open(&self) -> Result<()> {
        match self.phase {
            Phase::Open => Ok(()),
            Phase::Unopened => Err(Error::InvalidState(format!(
                "column {}: block requested before open()",
                self.metadata.column_name
            ))),
            Phase::Closed => Err(Error::InvalidState(format!(
                "column {}: block requested after close()",
                self.metadata.column_name
            ))),
        }
    }

    /// Cached match set, evaluating a pending predicate first.
    fn filtered_bitmap(&mut self) -> Result<Option<Arc<RoaringBitmap>>> {
        let bitmap = match &self.filter {
            FilterState::NoPredicate => return Ok(None),
            FilterState::Evaluated { bitmap, .. } => return Ok(Some(Arc::clone(bitmap))),
            FilterState::Pending(predicate) => Arc::new(evaluate(
                &self.metadata,
                predicate,
                &self.dictionary,
                &self.inverted,
            )?),
        };
        self.evaluations += 1;

        if let FilterState::Pending(predicate) =
            std::mem::replace(&mut self.filter, FilterState::NoPredicate)
        {
            self.filter = FilterState::Evaluated {
                predicate,
                bitmap: Arc::clone(&bitmap),
            };
        }
        Ok(Some(bitmap))
    }

    fn block(&mut self, id: BlockId) -> Result<Block> {
        let num_blocks = self.num_blocks();
        if id >= num_blocks {
            return Err(Error::out_of_range("block id", id as u64, num_blocks as u64));
        }
        let filter = self.filtered_bitmap()?;
        let total_docs = self.metadata.total_docs;
        let start: DocId = (id as u64 * self.docs_per_block as u64).min(total_docs as u64) as DocId;
        let end: DocId = (start as u64 + self.docs_per_block as u64).min(total_docs as u64) as DocId;

        Ok(Block::new(
            id,
            start..end,
            Arc::clone(&self.forward),
            Arc::clone(&self.dictionary),
            Arc::clone(&self.metadata),
            filter,
        ))
    }
}

impl DataSource for ColumnDataSource {
    fn open(&mut self) {
        if self.phase == Phase::Unopened {
            self.phase = Phase::Open;
        }
    }

    fn set_predicate(&mut self, predicate: Predicate) {
        if matches!(self.filter, FilterState::Evaluated { .. }) {
            log::debug!(
                "column {}: predicate replaced, will re-evaluate",
                self.metadata.column_name
            );
        }
        self.filter = FilterState::Pending(predicate);
    }

    fn next_block(&mut self) -> Result<Option<Block>> {
        self.ensure_open()?;
        if self.cursor_exhausted {
            return Ok(None);
        }
        let block = self.block(0)?;
        self.cursor_exhausted = true;
        Ok(Some(block))
    }

    fn next_block_at(&mut self, id: BlockId) -> Result<Block> {
        self.ensure_open()?;
        self.block(id)
    }

    fn close(&mut self) {
        self.phase = Phase::Closed;
    }
}

fn shape_name(single_value: bool) -> &'static str {
    if single_value {
        "single-value"
    } else {
        "multi-value"
    }
}

/// Resolve `predicate` to dictionary ids and union their posting bitmaps.
///
/// An empty id set returns immediately without touching the inverted index.
fn evaluate(
    metadata: &ColumnMetadata,
    predicate: &Predicate,
    dictionary: &Dictionary,
    inverted: &InvertedIndex,
) -> Result<RoaringBitmap> {
    let ids = resolve(predicate, dictionary);
    if ids.is_empty() {
        log::debug!(
            "column {}: predicate {:?} matches no dictionary ids",
            metadata.column_name,
            predicate
        );
        return Ok(RoaringBitmap::new());
    }

    let bitmaps = ids
        .iter()
        .map(|&id| inverted.bitmap_for(id))
        .collect::<Result<Vec<_>>>()?;
    let matched = BitmapCombiner::union(&bitmaps);

    log::debug!(
        "column {}: predicate resolved to {} dictionary ids, {} docs",
        metadata.column_name,
        ids.len(),
        matched.cardinality()
    );
    Ok(matched)
}
