//! Predicate resolution and bitmap combination

mod combiner;
mod predicate;

pub use combiner::BitmapCombiner;
pub use predicate::{Predicate, resolve};
