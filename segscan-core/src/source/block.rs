//! Scan output unit bound to one doc range of a column

use std::ops::Range;
use std::sync::Arc;

use crate::index::{Dictionary, ForwardIndex, Value};
use crate::segment::ColumnMetadata;
use crate::structures::RoaringBitmap;
use crate::{DictId, DocId, Error, Result};

/// Block identifier within a column, dense from zero.
pub type BlockId = u32;

/// View over one block of a column: the readers, the filter (if any) and the
/// doc range the block covers.
///
/// Cheap to construct; every field is shared with the producing
/// [`ColumnDataSource`](super::ColumnDataSource).
#[derive(Debug, Clone)]
pub struct Block {
    id: BlockId,
    doc_range: Range<DocId>,
    forward: Arc<ForwardIndex>,
    dictionary: Arc<Dictionary>,
    metadata: Arc<ColumnMetadata>,
    filter: Option<Arc<RoaringBitmap>>,
}

impl Block {
    pub(crate) fn new(
        id: BlockId,
        doc_range: Range<DocId>,
        forward: Arc<ForwardIndex>,
        dictionary: Arc<Dictionary>,
        metadata: Arc<ColumnMetadata>,
        filter: Option<Arc<RoaringBitmap>>,
    ) -> Self {
        Self {
            id,
            doc_range,
            forward,
            dictionary,
            metadata,
            filter,
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn doc_range(&self) -> Range<DocId> {
        self.doc_range.clone()
    }

    pub fn metadata(&self) -> &ColumnMetadata {
        &self.metadata
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn forward_index(&self) -> &ForwardIndex {
        &self.forward
    }

    /// Column-wide match set, `None` when no predicate applies.
    pub fn filtered_bitmap(&self) -> Option<&RoaringBitmap> {
        self.filter.as_deref()
    }

    pub fn is_filtered(&self) -> bool {
        self.filter.is_some()
    }

    /// Matching doc ids inside this block, ascending.
    pub fn doc_ids(&self) -> impl Iterator<Item = DocId> + '_ {
        let range = self.doc_range.clone();
        let end = range.end;
        let (all, filtered) = match &self.filter {
            None => (Some(range), None),
            Some(bitmap) => (
                None,
                Some(bitmap.iter_from(range.start).take_while(move |&doc| doc < end)),
            ),
        };
        all.into_iter().flatten().chain(filtered.into_iter().flatten())
    }

    pub fn num_matching_docs(&self) -> u32 {
        match &self.filter {
            None => self.doc_range.len() as u32,
            Some(_) => self.doc_ids().count() as u32,
        }
    }

    /// Whether `doc` lies in this block and passes the filter.
    pub fn matches(&self, doc: DocId) -> bool {
        self.doc_range.contains(&doc)
            && self.filter.as_ref().is_none_or(|bitmap| bitmap.contains(doc))
    }

    /// Dictionary id of `doc` in a single-value column.
    pub fn dict_id(&self, doc: DocId) -> Result<DictId> {
        self.check_doc(doc)?;
        match self.forward.as_ref() {
            ForwardIndex::Single(fwd) => fwd.get(doc),
            ForwardIndex::Multi(_) => Err(Error::TypeMismatch(format!(
                "column {} is multi-value, use dict_ids",
                self.metadata.column_name
            ))),
        }
    }

    /// Dictionary ids of `doc`; a single-value column yields exactly one.
    pub fn dict_ids(&self, doc: DocId) -> Result<Vec<DictId>> {
        self.check_doc(doc)?;
        match self.forward.as_ref() {
            ForwardIndex::Single(fwd) => Ok(vec![fwd.get(doc)?]),
            ForwardIndex::Multi(fwd) => fwd.get(doc),
        }
    }

    pub fn value(&self, doc: DocId) -> Result<Value> {
        self.dictionary.value_at(self.dict_id(doc)?)
    }

    pub fn values(&self, doc: DocId) -> Result<Vec<Value>> {
        self.dict_ids(doc)?
            .into_iter()
            .map(|id| self.dictionary.value_at(id))
            .collect()
    }

    fn check_doc(&self, doc: DocId) -> Result<()> {
        if !self.doc_range.contains(&doc) {
            return Err(Error::out_of_range(
                "doc id",
                doc as u64,
                self.doc_range.end as u64,
            ));
        }
        Ok(())
    }
}
