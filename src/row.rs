use crate::header::HeaderSet;
use crate::{CsvError, CsvResult};
use std::ops::Index;
use std::sync::Arc;

/// One line's fields plus a shared handle to the reader's headers.
/// Owns its values, so it can outlive the read that produced it.
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<String>,
    headers: Arc<HeaderSet>,
    line: u64,
}

impl Row {
    pub(crate) fn new(values: Vec<String>, headers: Arc<HeaderSet>, line: u64) -> Self {
        Self {
            values,
            headers,
            line,
        }
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn into_values(self) -> Vec<String> {
        self.values
    }

    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    /// 1-based physical line number in the source.
    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }

    /// Field at `index`.
    pub fn get(&self, index: usize) -> CsvResult<&str> {
        self.values
            .get(index)
            .map(String::as_str)
            .ok_or(CsvError::IndexOutOfBounds {
                index,
                len: self.values.len(),
            })
    }

    /// Field under the first header called `name`.
    pub fn field(&self, name: &str) -> CsvResult<&str> {
        let index = self
            .headers
            .position(name)
            .ok_or_else(|| CsvError::NoSuchColumn(name.to_string()))?;
        self.get(index)
    }
}

impl Index<usize> for Row {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        match self.get(index) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }
}

impl Index<&str> for Row {
    type Output = str;

    fn index(&self, name: &str) -> &str {
        match self.field(name) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }
}
