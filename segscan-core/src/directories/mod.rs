mod directory;
mod mmap;

pub use directory::*;
pub use mmap::*;
