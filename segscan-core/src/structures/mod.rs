mod bitpacking;
mod roaring;

pub use bitpacking::{
    MAX_BITS_PER_VALUE, PackedBits, bitpack_read, bitpack_write, bits_for_cardinality,
    bits_needed, packed_len,
};
pub use roaring::{RoaringBitmap, RoaringIter};
