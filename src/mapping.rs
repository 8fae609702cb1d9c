//! Column-to-field binding for typed records.
//!
//! A record type lists its bindings once through [`CsvRecord::bindings`]. The first read
//! of that type against a given header set resolves every binding to a column index and
//! stores the result in a [`MappingCache`]; later rows only parse and assign.

use crate::header::{HeaderKind, HeaderSet};
use crate::{CsvError, CsvResult};
use std::any::{type_name, Any, TypeId};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, trace};

/// Source column of a binding: a header name, or a 0-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    Name(Cow<'static, str>),
    Index(usize),
}

impl From<&'static str> for Column {
    fn from(name: &'static str) -> Self {
        Column::Name(Cow::Borrowed(name))
    }
}

impl From<String> for Column {
    fn from(name: String) -> Self {
        Column::Name(Cow::Owned(name))
    }
}

impl From<usize> for Column {
    fn from(index: usize) -> Self {
        Column::Index(index)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Column::Name(name) => write!(f, "column '{name}'"),
            Column::Index(index) => write!(f, "column #{index}"),
        }
    }
}

/// Reason a raw field could not be converted.
pub type FieldError = Box<dyn std::error::Error + Send + Sync>;

/// Conversion from one raw field. Strings and chars take the text verbatim; other
/// scalars parse the trimmed text with `FromStr`, which does not depend on locale.
pub trait FromField: Sized {
    fn from_field(raw: &str) -> Result<Self, FieldError>;
}

impl FromField for String {
    fn from_field(raw: &str) -> Result<Self, FieldError> {
        Ok(raw.to_string())
    }
}

impl FromField for char {
    fn from_field(raw: &str) -> Result<Self, FieldError> {
        Ok(raw.parse::<char>()?)
    }
}

impl FromField for bool {
    fn from_field(raw: &str) -> Result<Self, FieldError> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if raw.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            Err(format!("expected true or false, got '{raw}'").into())
        }
    }
}

impl<V: FromField> FromField for Option<V> {
    fn from_field(raw: &str) -> Result<Self, FieldError> {
        if raw.trim().is_empty() {
            Ok(None)
        } else {
            V::from_field(raw).map(Some)
        }
    }
}

macro_rules! from_str_field {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromField for $ty {
                fn from_field(raw: &str) -> Result<Self, FieldError> {
                    Ok(raw.trim().parse::<$ty>()?)
                }
            }
        )*
    };
}

from_str_field!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

type Assign<T> = Box<dyn Fn(&mut T, &str) -> CsvResult<()> + Send + Sync>;

struct FieldBinding<T> {
    field: &'static str,
    column: Column,
    assign: Assign<T>,
}

/// Declared bindings of a record type, built once per cache miss.
pub struct Bindings<T> {
    fields: Vec<FieldBinding<T>>,
}

impl<T> Default for Bindings<T> {
    fn default() -> Self {
        Self { fields: Vec::new() }
    }
}

impl<T> Bindings<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `field` to the first column called `name`.
    pub fn bind<V>(
        self,
        field: &'static str,
        name: impl Into<Cow<'static, str>>,
        set: fn(&mut T, V),
    ) -> Self
    where
        T: 'static,
        V: FromField + 'static,
    {
        self.push(field, Column::Name(name.into()), set)
    }

    /// Binds `field` to the column at `index` (0-based).
    pub fn bind_index<V>(self, field: &'static str, index: usize, set: fn(&mut T, V)) -> Self
    where
        T: 'static,
        V: FromField + 'static,
    {
        self.push(field, Column::Index(index), set)
    }

    fn push<V>(mut self, field: &'static str, column: Column, set: fn(&mut T, V)) -> Self
    where
        T: 'static,
        V: FromField + 'static,
    {
        let assign = move |target: &mut T, raw: &str| {
            let value = V::from_field(raw).map_err(|err| CsvError::FieldConversion {
                field,
                value: raw.to_string(),
                target: type_name::<V>(),
                reason: err.to_string(),
            })?;
            set(target, value);
            Ok(())
        };
        self.fields.push(FieldBinding {
            field,
            column,
            assign: Box::new(assign),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A type that can be built from a row. Fields without a binding keep their
/// `Default` value.
///
/// ```
/// use csv_bind::{Bindings, CsvRecord};
///
/// #[derive(Default)]
/// struct Person {
///     name: String,
///     age: u32,
/// }
///
/// impl CsvRecord for Person {
///     fn bindings() -> Bindings<Self> {
///         Bindings::new()
///             .bind("name", "name", |p: &mut Person, v| p.name = v)
///             .bind_index("age", 1, |p: &mut Person, v| p.age = v)
///     }
/// }
/// ```
pub trait CsvRecord: Default + 'static {
    fn bindings() -> Bindings<Self>;
}

/// Bindings of `T` resolved against one header set.
pub(crate) struct ResolvedMapping<T> {
    fields: Vec<(FieldBinding<T>, usize)>,
}

impl<T: CsvRecord> ResolvedMapping<T> {
    fn resolve(headers: &HeaderSet) -> CsvResult<Self> {
        let bindings = T::bindings();
        let mut fields = Vec::with_capacity(bindings.fields.len());
        for binding in bindings.fields {
            let index = match &binding.column {
                Column::Name(name) => headers.position(name),
                // without headers there is nothing to check an index against
                Column::Index(index) if headers.kind() == HeaderKind::Absent => Some(*index),
                Column::Index(index) => (*index < headers.len()).then_some(*index),
            };
            let Some(index) = index else {
                return Err(CsvError::ColumnNotSpecified {
                    field: binding.field,
                    column: binding.column.to_string(),
                });
            };
            fields.push((binding, index));
        }
        Ok(Self { fields })
    }

    /// Builds a fresh `T` from `tokens`. No partial value escapes on error.
    pub(crate) fn materialize(&self, tokens: &[&str]) -> CsvResult<T> {
        let mut record = T::default();
        for (binding, index) in &self.fields {
            let raw = *tokens.get(*index).ok_or(CsvError::IndexOutOfBounds {
                index: *index,
                len: tokens.len(),
            })?;
            (binding.assign)(&mut record, raw)?;
        }
        Ok(record)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    type_id: TypeId,
    fingerprint: u32,
}

struct CacheEntry {
    headers: HeaderSet,
    mapping: Arc<dyn Any + Send + Sync>,
}

/// Memoized binding resolutions, keyed by record type and header set.
///
/// Share one behind an `Arc` across readers and threads; population is guarded by a
/// lock and happens at most once per key.
#[derive(Default)]
pub struct MappingCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl MappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn resolve<T: CsvRecord>(
        &self,
        headers: &HeaderSet,
    ) -> CsvResult<Arc<ResolvedMapping<T>>> {
        let key = CacheKey {
            type_id: TypeId::of::<T>(),
            fingerprint: headers.fingerprint(),
        };

        if let Some(hit) = self.lookup::<T>(&key, headers) {
            return Ok(hit);
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // another thread may have populated it while we waited
        if let Some(entry) = entries.get(&key) {
            if entry.headers == *headers {
                if let Ok(mapping) = entry.mapping.clone().downcast::<ResolvedMapping<T>>() {
                    return Ok(mapping);
                }
            }
        }

        let mapping = Arc::new(ResolvedMapping::<T>::resolve(headers)?);
        debug!(
            record = type_name::<T>(),
            fields = mapping.fields.len(),
            columns = headers.len(),
            "populated mapping cache"
        );
        entries.insert(
            key,
            CacheEntry {
                headers: headers.clone(),
                mapping: mapping.clone(),
            },
        );
        Ok(mapping)
    }

    fn lookup<T: CsvRecord>(
        &self,
        key: &CacheKey,
        headers: &HeaderSet,
    ) -> Option<Arc<ResolvedMapping<T>>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(key)?;
        if entry.headers != *headers {
            trace!(record = type_name::<T>(), "mapping cache fingerprint collision");
            return None;
        }
        entry.mapping.clone().downcast::<ResolvedMapping<T>>().ok()
    }

    /// Drops every cached resolution.
    pub fn release(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if !entries.is_empty() {
            debug!(entries = entries.len(), "released mapping cache");
        }
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for MappingCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingCache")
            .field("entries", &self.len())
            .finish()
    }
}
