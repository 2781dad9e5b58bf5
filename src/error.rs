//! Error taxonomy shared by the whole crate.
//!
//! `Io` is a failed byte sink/source, `Parse` is malformed textual input
//! (FASTA, SAM, queries), `Format` is a corrupt or inconsistent compressed
//! container. Violated internal invariants are defects and panic instead.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("format error: {0}")]
    Format(String),
}

impl Error {
    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }
}
