//! Error types for segscan

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{what} {index} out of range (bound {bound})")]
    OutOfRange {
        what: &'static str,
        index: u64,
        bound: u64,
    },

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedType(String),

    #[error("Corrupt layout: {0}")]
    CorruptLayout(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn out_of_range(what: &'static str, index: u64, bound: u64) -> Self {
        Error::OutOfRange { what, index, bound }
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Error::CorruptLayout(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
