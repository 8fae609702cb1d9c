//! Streaming CSV reader with typed field binding.
//!
//! - Blocking path: [`CsvReader`] over any `std::io::Read`.
//! - Async path: [`AsyncCsvReader`] over any `tokio::io::AsyncRead`, optionally
//!   decompressed/transcoded through [`decode_source`].
//!
//! Data shape:
//! - Headers: [`HeaderSet`], taken from the first line or synthesized as `column N`.
//! - Raw rows: [`Row`] (access with `row[idx]`, `row["name"]`, or the fallible `get`/`field`).
//! - Typed rows: any `T: CsvRecord`, bound field by field through [`Bindings`].
//!
//! Tokenization is a plain split on a single ASCII separator; quoting is not interpreted.
#![cfg_attr(docsrs, feature(doc_cfg))]
//
mod async_reader;
mod codec;
mod config;
mod header;
mod io;
mod mapping;
mod reader;
mod row;
mod state;
mod stream;
mod tokenizer;

pub use crate::async_reader::AsyncCsvReader;
pub use crate::config::CsvConfig;
pub use crate::header::{HeaderKind, HeaderSet};
pub use crate::io::{decode_source, open_source, Compression, SourceMeta};
pub use crate::mapping::{Bindings, Column, CsvRecord, FieldError, FromField, MappingCache};
pub use crate::reader::{CsvReader, Records, Rows};
pub use crate::row::Row;
pub use crate::stream::{NonClosingStream, StreamClosed};
pub use crate::tokenizer::{split_fields, Fields};

pub use tokio_util::sync::CancellationToken;

use thiserror::Error;

/// Error type returned by this crate.
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("Argument cannot be null or empty: {0}")]
    InvalidArgument(&'static str),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Headers unavailable: first line is data and default headers are disabled")]
    HeadersUnavailable,
    #[error("Duplicate header '{name}' at columns {first} and {second}")]
    DuplicateHeader {
        name: String,
        first: usize,
        second: usize,
    },
    #[error("No such column: '{0}'")]
    NoSuchColumn(String),
    #[error("Column index {index} out of bounds (row has {len} fields)")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("Column not specified for field '{field}': {column}")]
    ColumnNotSpecified { field: &'static str, column: String },
    #[error("Field conversion error on '{field}': cannot parse '{value}' as {target}: {reason}")]
    FieldConversion {
        field: &'static str,
        value: String,
        target: &'static str,
        reason: String,
    },
    #[error("Row {line} width mismatch: got {found}, expected {expected}")]
    RowWidth {
        line: u64,
        expected: usize,
        found: usize,
    },
    #[error("Line {line} is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 { line: u64, valid_up_to: usize },
    #[error("No more rows")]
    NoMoreRows,
    #[error("Operation invalid on closed resource")]
    Closed,
    #[error("Read cancelled")]
    Cancelled,
    #[error(transparent)]
    Io(std::io::Error),
}

impl CsvError {
    /// Errors confined to a single row. A row sequence yields these and keeps going;
    /// anything else ends the sequence.
    pub fn is_row_error(&self) -> bool {
        matches!(
            self,
            CsvError::FieldConversion { .. }
                | CsvError::RowWidth { .. }
                | CsvError::IndexOutOfBounds { .. }
                | CsvError::NoSuchColumn(_)
                | CsvError::InvalidUtf8 { .. }
        )
    }
}

impl From<std::io::Error> for CsvError {
    fn from(err: std::io::Error) -> Self {
        if stream::is_closed_error(&err) {
            CsvError::Closed
        } else {
            CsvError::Io(err)
        }
    }
}

pub type CsvResult<T> = std::result::Result<T, CsvError>;
