//! Reader state shared by the blocking and async front ends. Everything here is
//! I/O-free: the front ends fetch lines and hand them in.

use crate::config::CsvConfig;
use crate::header::{HeaderKind, HeaderSet};
use crate::mapping::{CsvRecord, MappingCache};
use crate::row::Row;
use crate::tokenizer::{split_fields, trim_line_ending};
use crate::{CsvError, CsvResult};
use std::io;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

enum Headers {
    Pending,
    Resolved(Arc<HeaderSet>),
    /// Resolution consumed input and failed; reported again until reset.
    Failed(CsvError),
}

/// Copy of a stored header failure, handed out on every later access.
fn reissue(err: &CsvError) -> CsvError {
    match err {
        CsvError::DuplicateHeader {
            name,
            first,
            second,
        } => CsvError::DuplicateHeader {
            name: name.clone(),
            first: *first,
            second: *second,
        },
        CsvError::InvalidUtf8 { line, valid_up_to } => CsvError::InvalidUtf8 {
            line: *line,
            valid_up_to: *valid_up_to,
        },
        CsvError::Io(err) => CsvError::Io(io::Error::new(err.kind(), err.to_string())),
        CsvError::Closed => CsvError::Closed,
        _ => CsvError::HeadersUnavailable,
    }
}

/// Releases the mapping cache when the owning reader goes away, if configured to.
pub(crate) struct CacheLease {
    cache: Arc<MappingCache>,
    release_on_drop: bool,
}

impl Drop for CacheLease {
    fn drop(&mut self) {
        if self.release_on_drop {
            self.cache.release();
        }
    }
}

pub(crate) struct ReaderState {
    config: CsvConfig,
    separator: u8,
    headers: Headers,
    /// First line read during header synthesis, handed out again as the first row.
    replay: Option<(u64, String)>,
    lines_read: u64,
    cache: CacheLease,
    cancel: Option<CancellationToken>,
}

impl ReaderState {
    pub(crate) fn new(config: CsvConfig) -> CsvResult<Self> {
        config.validate()?;
        Ok(Self {
            separator: config.separator_byte(),
            cache: CacheLease {
                cache: Arc::new(MappingCache::new()),
                release_on_drop: config.release_cache_on_dispose,
            },
            config,
            headers: Headers::Pending,
            replay: None,
            lines_read: 0,
            cancel: None,
        })
    }

    pub(crate) fn config(&self) -> &CsvConfig {
        &self.config
    }

    pub(crate) fn set_cache(&mut self, cache: Arc<MappingCache>) {
        self.cache.cache = cache;
    }

    pub(crate) fn cache(&self) -> &Arc<MappingCache> {
        &self.cache.cache
    }

    pub(crate) fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancel = Some(token);
    }

    /// Whether headers still need resolving. A failed resolution is returned again.
    pub(crate) fn needs_resolution(&self) -> CsvResult<bool> {
        match &self.headers {
            Headers::Pending => Ok(true),
            Headers::Resolved(_) => Ok(false),
            Headers::Failed(err) => Err(reissue(err)),
        }
    }

    /// Whether resolving headers needs the first line at all.
    pub(crate) fn wants_first_line(&self) -> bool {
        self.config.first_line_is_header || self.config.generate_default_headers_if_missing
    }

    /// Records a physically read line and returns its 1-based number.
    fn count_line(&mut self) -> u64 {
        self.lines_read += 1;
        self.lines_read
    }

    /// Turns one physically read line into text, counting it. The bytes are gone
    /// from the source either way, so a bad line only fails itself.
    pub(crate) fn take_line(&mut self, bytes: Vec<u8>) -> CsvResult<(u64, String)> {
        let line_no = self.count_line();
        let mut line = String::from_utf8(bytes).map_err(|err| CsvError::InvalidUtf8 {
            line: line_no,
            valid_up_to: err.utf8_error().valid_up_to(),
        })?;
        trim_line_ending(&mut line);
        Ok((line_no, line))
    }

    /// Completes header resolution from the outcome of reading the first line. That
    /// line is `None` at end of input, or when [`wants_first_line`](Self::wants_first_line)
    /// is false. Any failure sticks until [`reset`](Self::reset).
    pub(crate) fn resolve(&mut self, first: CsvResult<Option<(u64, String)>>) -> CsvResult<()> {
        match first.and_then(|first| self.header_set_from(first)) {
            Ok(set) => {
                debug!(
                    kind = ?set.kind(),
                    columns = set.len(),
                    "resolved headers"
                );
                self.headers = Headers::Resolved(Arc::new(set));
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "header resolution failed");
                self.headers = Headers::Failed(reissue(&err));
                Err(err)
            }
        }
    }

    fn header_set_from(&mut self, first: Option<(u64, String)>) -> CsvResult<HeaderSet> {
        let set = if self.config.first_line_is_header {
            let names = match &first {
                Some((_, line)) => split_fields(line, self.separator)
                    .map(str::to_string)
                    .collect(),
                None => Vec::new(),
            };
            HeaderSet::named(names, self.config.reject_duplicate_headers)?
        } else if self.config.generate_default_headers_if_missing {
            let width = first
                .as_ref()
                .map_or(0, |(_, line)| split_fields(line, self.separator).count());
            self.replay = first;
            HeaderSet::generated(width)
        } else {
            HeaderSet::absent()
        };
        Ok(set)
    }

    /// Resolved headers. Errors if resolution is still pending or headers are absent.
    pub(crate) fn headers(&self) -> CsvResult<&Arc<HeaderSet>> {
        match &self.headers {
            Headers::Resolved(set) if set.kind() == HeaderKind::Absent => {
                Err(CsvError::HeadersUnavailable)
            }
            Headers::Resolved(set) => Ok(set),
            Headers::Pending => Err(CsvError::HeadersUnavailable),
            Headers::Failed(err) => Err(reissue(err)),
        }
    }

    fn header_set(&self) -> Arc<HeaderSet> {
        match &self.headers {
            Headers::Resolved(set) => set.clone(),
            // callers resolve before materializing; index-only access is still sound
            Headers::Pending | Headers::Failed(_) => Arc::new(HeaderSet::absent()),
        }
    }

    pub(crate) fn has_replay(&self) -> bool {
        self.replay.is_some()
    }

    pub(crate) fn take_replay(&mut self) -> Option<(u64, String)> {
        self.replay.take()
    }

    pub(crate) fn check_cancelled(&self) -> CsvResult<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => {
                warn!(line = self.lines_read, "read cancelled");
                Err(CsvError::Cancelled)
            }
            _ => Ok(()),
        }
    }

    fn check_width(&self, line: u64, found: usize, headers: &HeaderSet) -> CsvResult<()> {
        if self.config.strict_row_width
            && headers.kind() != HeaderKind::Absent
            && found != headers.len()
        {
            return Err(CsvError::RowWidth {
                line,
                expected: headers.len(),
                found,
            });
        }
        Ok(())
    }

    pub(crate) fn row(&self, line_no: u64, line: &str) -> CsvResult<Row> {
        let headers = self.header_set();
        let values: Vec<String> = split_fields(line, self.separator)
            .map(str::to_string)
            .collect();
        self.check_width(line_no, values.len(), &headers)?;
        trace!(line = line_no, fields = values.len(), "row");
        Ok(Row::new(values, headers, line_no))
    }

    pub(crate) fn record<T: CsvRecord>(&self, line_no: u64, line: &str) -> CsvResult<T> {
        let headers = self.header_set();
        let mapping = self.cache.cache.resolve::<T>(&headers)?;
        let tokens: Vec<&str> = split_fields(line, self.separator).collect();
        self.check_width(line_no, tokens.len(), &headers)?;
        trace!(line = line_no, fields = tokens.len(), "record");
        mapping.materialize(&tokens)
    }

    /// Back to the pending state. The caller rewinds the source.
    pub(crate) fn reset(&mut self) {
        debug!(lines_read = self.lines_read, "reset reader");
        self.headers = Headers::Pending;
        self.replay = None;
        self.lines_read = 0;
    }
}
