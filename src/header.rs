//! Header set construction and lookup.

use crate::{CsvError, CsvResult};
use crc32fast::Hasher as Crc32;
use std::collections::HashMap;

/// Where a [`HeaderSet`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderKind {
    /// Taken verbatim from the first line.
    Named,
    /// Synthesized as `column 1..N` from the width of the first data line.
    Generated,
    /// First line is data and default headers are disabled; rows are index-only.
    Absent,
}

/// Ordered column names with name-to-index lookup. Repeated names resolve to
/// their first occurrence.
#[derive(Debug, Clone)]
pub struct HeaderSet {
    kind: HeaderKind,
    names: Vec<String>,
    index: HashMap<String, usize>,
    fingerprint: u32,
}

impl HeaderSet {
    pub(crate) fn named(names: Vec<String>, reject_duplicates: bool) -> CsvResult<Self> {
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if let Some(&first) = index.get(name) {
                if reject_duplicates {
                    return Err(CsvError::DuplicateHeader {
                        name: name.clone(),
                        first,
                        second: i,
                    });
                }
                continue;
            }
            index.insert(name.clone(), i);
        }
        Ok(Self::build(HeaderKind::Named, names, index))
    }

    pub(crate) fn generated(width: usize) -> Self {
        let names: Vec<String> = (1..=width).map(|i| format!("column {i}")).collect();
        let index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        Self::build(HeaderKind::Generated, names, index)
    }

    pub(crate) fn absent() -> Self {
        Self::build(HeaderKind::Absent, Vec::new(), HashMap::new())
    }

    fn build(kind: HeaderKind, names: Vec<String>, index: HashMap<String, usize>) -> Self {
        // crc32 over kind + names separated by '\x1f' (unit separator)
        let mut crc = Crc32::new();
        crc.update(&[kind as u8]);
        for name in &names {
            crc.update(&[0x1f]);
            crc.update(name.as_bytes());
        }
        Self {
            kind,
            names,
            index,
            fingerprint: crc.finalize(),
        }
    }

    pub fn kind(&self) -> HeaderKind {
        self.kind
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Index of the first column called `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub(crate) fn fingerprint(&self) -> u32 {
        self.fingerprint
    }
}

impl PartialEq for HeaderSet {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.names == other.names
    }
}

impl Eq for HeaderSet {}

impl PartialEq<[&str]> for HeaderSet {
    fn eq(&self, other: &[&str]) -> bool {
        self.names.len() == other.len() && self.names.iter().zip(other).all(|(a, b)| a == b)
    }
}

impl<const N: usize> PartialEq<[&str; N]> for HeaderSet {
    fn eq(&self, other: &[&str; N]) -> bool {
        *self == other[..]
    }
}
