//! Per-column index readers
//!
//! - [`Dictionary`]: sorted value <-> dictionary id mapping
//! - [`ForwardIndex`]: doc id -> dictionary id(s), bit-packed
//! - [`InvertedIndex`]: dictionary id -> doc id bitmap
//!
//! All readers are immutable after open and decode from [`OwnedBytes`]
//! regardless of whether the file was read onto the heap or memory-mapped.
//!
//! [`OwnedBytes`]: crate::directories::OwnedBytes

mod dictionary;
mod forward;
mod inverted;
mod value;

pub use dictionary::{Dictionary, write_dictionary};
pub use forward::{
    ForwardIndex, MultiValueForwardIndex, SingleValueForwardIndex, write_multi_value,
    write_single_value,
};
pub use inverted::{InvertedIndex, write_inverted_index};
pub use value::Value;
