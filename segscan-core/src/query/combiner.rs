//! Union of per-dictionary-id bitmaps

use std::sync::Arc;

use crate::structures::RoaringBitmap;

/// Combines inverted index bitmaps into one match set.
pub struct BitmapCombiner;

impl BitmapCombiner {
    /// Bitwise OR of all `bitmaps`.
    ///
    /// Reduces pairwise (a balanced tree) so no single accumulator is
    /// rescanned once per input. Zero inputs yield an empty bitmap and one
    /// input yields an owned copy.
    pub fn union(bitmaps: &[Arc<RoaringBitmap>]) -> RoaringBitmap {
        match bitmaps {
            [] => RoaringBitmap::new(),
            [single] => RoaringBitmap::clone(single),
            [a, b] => a.or(b),
            _ => {
                let mut level: Vec<RoaringBitmap> = bitmaps
                    .chunks(2)
                    .map(|pair| match pair {
                        [a, b] => a.or(b),
                        [a] => RoaringBitmap::clone(a),
                        _ => RoaringBitmap::new(),
                    })
                    .collect();

                while level.len() > 1 {
                    let mut next = Vec::with_capacity(level.len().div_ceil(2));
                    let mut iter = level.into_iter();
                    while let Some(a) = iter.next() {
                        match iter.next() {
                            Some(b) => next.push(a.or(&b)),
                            None => next.push(a),
                        }
                    }
                    level = next;
                }
                level.pop().unwrap_or_default()
            }
        }
    }
}
