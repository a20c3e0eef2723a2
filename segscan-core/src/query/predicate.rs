//! Value predicates and their resolution against a dictionary

use std::ops::Bound;

use crate::DictId;
use crate::index::{Dictionary, Value};

/// Filter condition over raw column values, independent of dictionary encoding.
///
/// Values of a type that cannot be compared with the column (e.g. a string
/// against an INT column) match nothing. Integer values widen to the
/// column's numeric type.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Value),
    NotEq(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Range { lower: Bound<Value>, upper: Bound<Value> },
}

impl Predicate {
    pub fn equals(value: impl Into<Value>) -> Self {
        Predicate::Eq(value.into())
    }

    pub fn not_equals(value: impl Into<Value>) -> Self {
        Predicate::NotEq(value.into())
    }

    pub fn in_set<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Predicate::In(values.into_iter().map(Into::into).collect())
    }

    pub fn not_in<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Predicate::NotIn(values.into_iter().map(Into::into).collect())
    }

    pub fn range(lower: Bound<Value>, upper: Bound<Value>) -> Self {
        Predicate::Range { lower, upper }
    }

    /// Inclusive range `[lower, upper]`.
    pub fn between(lower: impl Into<Value>, upper: impl Into<Value>) -> Self {
        Predicate::Range {
            lower: Bound::Included(lower.into()),
            upper: Bound::Included(upper.into()),
        }
    }

    pub fn greater_than(value: impl Into<Value>) -> Self {
        Predicate::Range {
            lower: Bound::Excluded(value.into()),
            upper: Bound::Unbounded,
        }
    }

    pub fn at_least(value: impl Into<Value>) -> Self {
        Predicate::Range {
            lower: Bound::Included(value.into()),
            upper: Bound::Unbounded,
        }
    }

    pub fn less_than(value: impl Into<Value>) -> Self {
        Predicate::Range {
            lower: Bound::Unbounded,
            upper: Bound::Excluded(value.into()),
        }
    }

    pub fn at_most(value: impl Into<Value>) -> Self {
        Predicate::Range {
            lower: Bound::Unbounded,
            upper: Bound::Included(value.into()),
        }
    }
}

/// Dictionary ids whose values satisfy `predicate`, unique and ascending.
///
/// An empty result means the predicate matches no document.
pub fn resolve(predicate: &Predicate, dictionary: &Dictionary) -> Vec<DictId> {
    match predicate {
        Predicate::Eq(value) => dictionary.id_of(value).into_iter().collect(),
        Predicate::NotEq(value) => complement(dictionary, dictionary.id_of(value).into_iter()),
        Predicate::In(values) => members(dictionary, values),
        Predicate::NotIn(values) => complement(dictionary, members(dictionary, values).into_iter()),
        Predicate::Range { lower, upper } => dictionary
            .ids_in_range(lower.as_ref(), upper.as_ref())
            .map(|range| range.collect())
            .unwrap_or_default(),
    }
}

fn members(dictionary: &Dictionary, values: &[Value]) -> Vec<DictId> {
    let mut ids: Vec<DictId> = values.iter().filter_map(|v| dictionary.id_of(v)).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// All ids of `dictionary` not in `excluded` (ascending).
fn complement(dictionary: &Dictionary, excluded: impl Iterator<Item = DictId>) -> Vec<DictId> {
    let mut excluded = excluded.peekable();
    let mut ids = Vec::with_capacity(dictionary.cardinality() as usize);
    for id in 0..dictionary.cardinality() {
        if excluded.peek() == Some(&id) {
            excluded.next();
        } else {
            ids.push(id);
        }
    }
    ids
}
