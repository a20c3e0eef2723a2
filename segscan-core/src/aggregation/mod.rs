//! Batched dispatch of doc ids to aggregation functions
//!
//! [`AggregationService`] collects doc ids into a fixed-capacity buffer and,
//! each time the buffer fills, hands the batch to every registered
//! [`AggregationFunction`] in registration order. Each function's per-batch
//! results are kept in arrival order for a later reduce phase.
//!
//! Two ingestion protocols feed the buffer, at most one per service:
//! - push: [`map_doc`](AggregationService::map_doc) per doc, then
//!   [`finalize_map`](AggregationService::finalize_map)
//! - pull: [`aggregate_on_segment`](AggregationService::aggregate_on_segment)
//!   over an iterator of doc ids

use crate::config::{DEFAULT_AGGREGATION_BATCH_SIZE, ScanConfig};
use crate::segment::Segment;
use crate::{DocId, Error, Result};

/// One aggregation over doc-id batches of a segment.
///
/// `doc_ids` is only valid for the duration of the call; the buffer behind it
/// is reused for the next batch.
pub trait AggregationFunction {
    type Output;

    fn name(&self) -> &str;

    /// Aggregate one batch. `doc_ids` may be empty.
    fn aggregate(&self, doc_ids: &[DocId], segment: &Segment) -> Result<Self::Output>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ingestion {
    Push,
    Pull,
}

impl Ingestion {
    fn name(self) -> &'static str {
        match self {
            Ingestion::Push => "push (map_doc/finalize_map)",
            Ingestion::Pull => "pull (aggregate_on_segment)",
        }
    }
}

/// Per-segment batching driver for a fixed list of aggregation functions.
pub struct AggregationService<R> {
    functions: Vec<Box<dyn AggregationFunction<Output = R>>>,
    buffer: Box<[DocId]>,
    len: usize,
    results: Vec<Vec<R>>,
    ingestion: Option<Ingestion>,
    flushes: usize,
}

impl<R> AggregationService<R> {
    /// Service with the default batch size of 5000 doc ids.
    pub fn new(functions: Vec<Box<dyn AggregationFunction<Output = R>>>) -> Self {
        Self::build(functions, DEFAULT_AGGREGATION_BATCH_SIZE)
    }

    pub fn with_batch_size(
        functions: Vec<Box<dyn AggregationFunction<Output = R>>>,
        batch_size: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidState(
                "aggregation batch size must be greater than zero".into(),
            ));
        }
        Ok(Self::build(functions, batch_size))
    }

    pub fn from_config(
        functions: Vec<Box<dyn AggregationFunction<Output = R>>>,
        config: &ScanConfig,
    ) -> Result<Self> {
        config.validate()?;
        Self::with_batch_size(functions, config.aggregation_batch_size)
    }

    fn build(functions: Vec<Box<dyn AggregationFunction<Output = R>>>, batch_size: usize) -> Self {
        let results = functions.iter().map(|_| Vec::new()).collect();
        Self {
            functions,
            buffer: vec![0; batch_size].into_boxed_slice(),
            len: 0,
            results,
            ingestion: None,
            flushes: 0,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.buffer.len()
    }

    /// Doc ids waiting for the next flush.
    pub fn buffered(&self) -> usize {
        self.len
    }

    /// Batches dispatched so far.
    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(|f| f.name())
    }

    /// Per-function batch results, positionally matching the function list.
    pub fn aggregation_results(&self) -> &[Vec<R>] {
        &self.results
    }

    pub fn into_results(self) -> Vec<Vec<R>> {
        self.results
    }

    /// Push one doc id, flushing when the buffer becomes full.
    pub fn map_doc(&mut self, doc: DocId, segment: &Segment) -> Result<()> {
        self.enter(Ingestion::Push)?;
        self.push(doc, segment)
    }

    /// Flush the remainder of a push ingestion.
    ///
    /// Docs still buffered are flushed. If nothing was ever dispatched, one
    /// zero-count batch is flushed so every function reports a result.
    pub fn finalize_map(&mut self, segment: &Segment) -> Result<()> {
        self.enter(Ingestion::Push)?;
        self.flush_remainder(segment)
    }

    /// Drain `docs` through the buffer and flush the remainder.
    pub fn aggregate_on_segment<I>(&mut self, docs: I, segment: &Segment) -> Result<&[Vec<R>]>
    where
        I: IntoIterator<Item = DocId>,
    {
        self.enter(Ingestion::Pull)?;
        for doc in docs {
            self.push(doc, segment)?;
        }
        self.flush_remainder(segment)?;
        Ok(&self.results)
    }

    fn enter(&mut self, ingestion: Ingestion) -> Result<()> {
        match self.ingestion {
            None => {
                self.ingestion = Some(ingestion);
                Ok(())
            }
            Some(current) if current == ingestion => Ok(()),
            Some(current) => {
                log::warn!(
                    "aggregation service already driven by {}, refusing {}",
                    current.name(),
                    ingestion.name()
                );
                Err(Error::InvalidState(format!(
                    "cannot mix {} with {} ingestion",
                    ingestion.name(),
                    current.name()
                )))
            }
        }
    }

    fn push(&mut self, doc: DocId, segment: &Segment) -> Result<()> {
        self.buffer[self.len] = doc;
        self.len += 1;
        if self.len == self.buffer.len() {
            self.flush(segment)?;
        }
        Ok(())
    }

    fn flush_remainder(&mut self, segment: &Segment) -> Result<()> {
        if self.len > 0 || self.flushes == 0 {
            self.flush(segment)?;
        }
        Ok(())
    }

    /// Dispatch the buffered docs to every function, in registration order.
    ///
    /// All or nothing: if any function fails, no result of this batch is
    /// recorded. The buffer is emptied either way, so a failed batch is dropped.
    fn flush(&mut self, segment: &Segment) -> Result<()> {
        let batch = &self.buffer[..self.len];
        log::trace!(
            "segment {}: flushing batch {} with {} docs to {} functions",
            segment.name(),
            self.flushes,
            batch.len(),
            self.functions.len()
        );
        let outcome: Result<Vec<R>> = self
            .functions
            .iter()
            .map(|function| function.aggregate(batch, segment))
            .collect();
        self.len = 0;
        let batch_results = outcome.inspect_err(|e| {
            log::warn!(
                "segment {}: dropping batch {} after aggregation error: {}",
                segment.name(),
                self.flushes,
                e
            )
        })?;
        for (results, result) in self.results.iter_mut().zip(batch_results) {
            results.push(result);
        }
        self.flushes += 1;
        Ok(())
    }
}

impl<R> std::fmt::Debug for AggregationService<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationService")
            .field("functions", &self.function_names().collect::<Vec<_>>())
            .field("batch_size", &self.batch_size())
            .field("buffered", &self.len)
            .field("flushes", &self.flushes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::directories::OwnedBytes;
    use crate::index::{
        Dictionary, ForwardIndex, InvertedIndex, SingleValueForwardIndex, Value,
        write_single_value,
    };
    use crate::segment::{ColumnMetadata, ColumnReaders, DataType};
    use crate::structures::RoaringBitmap;

    struct Count;

    impl AggregationFunction for Count {
        type Output = u64;

        fn name(&self) -> &str {
            "count"
        }

        fn aggregate(&self, doc_ids: &[DocId], _segment: &Segment) -> Result<u64> {
            Ok(doc_ids.len() as u64)
        }
    }

    /// Sums a single-value LONG column through its dictionary.
    struct Sum(&'static str);

    impl AggregationFunction for Sum {
        type Output = u64;

        fn name(&self) -> &str {
            "sum"
        }

        fn aggregate(&self, doc_ids: &[DocId], segment: &Segment) -> Result<u64> {
            let column = segment
                .column(self.0)
                .ok_or_else(|| Error::InvalidState(format!("no column {}", self.0)))?;
            let forward = column.forward.as_single().ok_or_else(|| {
                Error::TypeMismatch(format!("{} is multi-value", self.0))
            })?;
            let mut sum = 0u64;
            for &doc in doc_ids {
                let value = column.dictionary.value_at(forward.get(doc)?)?;
                sum += value.as_i64().unwrap_or(0) as u64;
            }
            Ok(sum)
        }
    }

    /// Records the order in which functions are invoked.
    struct Tracer {
        label: &'static str,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl AggregationFunction for Tracer {
        type Output = u64;

        fn name(&self) -> &str {
            self.label
        }

        fn aggregate(&self, doc_ids: &[DocId], _segment: &Segment) -> Result<u64> {
            self.log.borrow_mut().push(self.label);
            Ok(doc_ids.first().copied().unwrap_or(u32::MAX) as u64)
        }
    }

    fn segment(total_docs: u32) -> Segment {
        // qty = doc % 4, dictionary [0, 1, 2, 3]
        let values: Vec<Value> = (0..4i64).map(Value::Long).collect();
        let dictionary = Dictionary::from_values(DataType::Long, &values).unwrap();
        let meta = ColumnMetadata::new("qty", DataType::Long, true, total_docs, 4);
        let ids: Vec<u32> = (0..total_docs).map(|d| d % 4).collect();
        let mut buf = Vec::new();
        write_single_value(&ids, meta.bits_per_element, &mut buf);
        let forward =
            SingleValueForwardIndex::open(OwnedBytes::new(buf), total_docs, meta.bits_per_element)
                .unwrap();
        let mut bitmaps = vec![RoaringBitmap::new(); 4];
        for (doc, &id) in ids.iter().enumerate() {
            bitmaps[id as usize].insert(doc as DocId);
        }
        let inverted = InvertedIndex::from_bitmaps(bitmaps);
        let mut segment = Segment::new("seg", total_docs, ScanConfig::default());
        segment
            .add_column(ColumnReaders::new(
                meta,
                dictionary,
                ForwardIndex::Single(forward),
                inverted,
            ))
            .unwrap();
        segment
    }

    fn count_and_sum() -> Vec<Box<dyn AggregationFunction<Output = u64>>> {
        vec![Box::new(Count), Box::new(Sum("qty"))]
    }

    #[test]
    fn test_pull_flushes_full_batches_then_remainder() {
        let segment = segment(12_000);
        let mut service = AggregationService::new(count_and_sum());
        assert_eq!(service.batch_size(), 5000);

        let results = service
            .aggregate_on_segment(0..12_000, &segment)
            .unwrap();
        assert_eq!(results[0], vec![5000, 5000, 2000]);
        // Each full batch of 5000 consecutive docs holds 1250 of each qty
        assert_eq!(results[1], vec![7500, 7500, 3000]);
        assert_eq!(service.flush_count(), 3);
        assert_eq!(service.buffered(), 0);
    }

    #[test]
    fn test_push_protocol() {
        let segment = segment(12_000);
        let mut service = AggregationService::new(count_and_sum());
        for doc in 0..12_000 {
            service.map_doc(doc, &segment).unwrap();
        }
        assert_eq!(service.flush_count(), 2);
        assert_eq!(service.buffered(), 2000);

        service.finalize_map(&segment).unwrap();
        assert_eq!(service.flush_count(), 3);
        assert_eq!(service.aggregation_results()[0], vec![5000, 5000, 2000]);
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_empty_batch() {
        let segment = segment(10_000);
        let mut service = AggregationService::new(count_and_sum());
        service.aggregate_on_segment(0..10_000, &segment).unwrap();
        assert_eq!(service.flush_count(), 2);
        assert_eq!(service.into_results()[0], vec![5000, 5000]);

        let mut service = AggregationService::new(count_and_sum());
        for doc in 0..10_000 {
            service.map_doc(doc, &segment).unwrap();
        }
        service.finalize_map(&segment).unwrap();
        service.finalize_map(&segment).unwrap();
        assert_eq!(service.flush_count(), 2);
    }

    #[test]
    fn test_empty_input_dispatches_once() {
        let segment = segment(8);
        let mut service = AggregationService::new(count_and_sum());
        let results = service
            .aggregate_on_segment(std::iter::empty(), &segment)
            .unwrap();
        assert_eq!(results, &[vec![0], vec![0]]);
        assert_eq!(service.flush_count(), 1);

        let mut service = AggregationService::new(count_and_sum());
        service.finalize_map(&segment).unwrap();
        assert_eq!(service.aggregation_results(), &[vec![0], vec![0]]);
    }

    #[test]
    fn test_registration_order_preserved() {
        let segment = segment(10);
        let log = Rc::new(RefCell::new(Vec::new()));
        let functions: Vec<Box<dyn AggregationFunction<Output = u64>>> = ["a", "b", "c"]
            .into_iter()
            .map(|label| {
                Box::new(Tracer {
                    label,
                    log: Rc::clone(&log),
                }) as Box<dyn AggregationFunction<Output = u64>>
            })
            .collect();
        let mut service = AggregationService::with_batch_size(functions, 4).unwrap();
        service.aggregate_on_segment(0..10, &segment).unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["a", "b", "c", "a", "b", "c", "a", "b", "c"]
        );
        assert_eq!(service.function_names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        // First doc of each batch: 0, 4, 8
        assert_eq!(service.aggregation_results()[2], vec![0, 4, 8]);
    }

    #[test]
    fn test_mixing_protocols_is_rejected() {
        let segment = segment(10);
        let mut service = AggregationService::new(count_and_sum());
        service.map_doc(1, &segment).unwrap();
        assert!(matches!(
            service.aggregate_on_segment(0..3, &segment),
            Err(Error::InvalidState(_))
        ));

        let mut service = AggregationService::new(count_and_sum());
        service.aggregate_on_segment(0..3, &segment).unwrap();
        assert!(matches!(
            service.finalize_map(&segment),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_batch_size_validation() {
        assert!(matches!(
            AggregationService::with_batch_size(count_and_sum(), 0),
            Err(Error::InvalidState(_))
        ));

        let config = ScanConfig {
            aggregation_batch_size: 3,
            ..ScanConfig::default()
        };
        let service = AggregationService::from_config(count_and_sum(), &config).unwrap();
        assert_eq!(service.batch_size(), 3);
    }

    #[test]
    fn test_function_error_propagates() {
        let segment = segment(10);
        let functions: Vec<Box<dyn AggregationFunction<Output = u64>>> =
            vec![Box::new(Sum("missing"))];
        let mut service = AggregationService::new(functions);
        assert!(matches!(
            service.aggregate_on_segment(0..3, &segment),
            Err(Error::InvalidState(_))
        ));
    }

    /// Fails its first batch only.
    struct FailOnce(std::cell::Cell<bool>);

    impl AggregationFunction for FailOnce {
        type Output = u64;

        fn name(&self) -> &str {
            "fail_once"
        }

        fn aggregate(&self, doc_ids: &[DocId], _segment: &Segment) -> Result<u64> {
            if self.0.replace(false) {
                return Err(Error::InvalidState("first batch rejected".into()));
            }
            Ok(doc_ids.len() as u64)
        }
    }

    #[test]
    fn test_failed_batch_is_dropped_for_every_function() {
        let segment = segment(10);
        let functions: Vec<Box<dyn AggregationFunction<Output = u64>>> =
            vec![Box::new(Count), Box::new(FailOnce(std::cell::Cell::new(true)))];
        let mut service = AggregationService::with_batch_size(functions, 2).unwrap();

        service.map_doc(0, &segment).unwrap();
        assert!(matches!(
            service.map_doc(1, &segment),
            Err(Error::InvalidState(_))
        ));
        assert_eq!(service.buffered(), 0);
        assert_eq!(service.flush_count(), 0);
        assert_eq!(service.aggregation_results(), &[Vec::<u64>::new(), Vec::new()]);

        // The service keeps working and results stay aligned
        for doc in 2..5 {
            service.map_doc(doc, &segment).unwrap();
        }
        service.finalize_map(&segment).unwrap();
        assert_eq!(service.flush_count(), 2);
        assert_eq!(service.aggregation_results(), &[vec![2, 1], vec![2, 1]]);
    }

    #[test]
    fn test_pull_over_block_doc_ids() {
        use crate::query::Predicate;
        use crate::source::DataSource;

        let segment = segment(100);
        let mut source = segment.data_source("qty").unwrap();
        source.open();
        source.set_predicate(Predicate::equals(3i64));
        let block = source.next_block().unwrap().unwrap();

        let mut service = AggregationService::with_batch_size(count_and_sum(), 10).unwrap();
        service.aggregate_on_segment(block.doc_ids(), &segment).unwrap();
        assert_eq!(service.flush_count(), 3);
        assert_eq!(service.aggregation_results()[0], vec![10, 10, 5]);
        assert_eq!(service.aggregation_results()[1].iter().sum::<u64>(), 75);
    }
}
