use crate::config::CsvConfig;
use crate::header::HeaderSet;
use crate::mapping::{CsvRecord, MappingCache};
use crate::row::Row;
use crate::state::ReaderState;
use crate::stream::NonClosingStream;
use crate::{CsvError, CsvResult};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Use a larger buffer for fewer syscalls (1 MiB)
const BUFFER_CAPACITY: usize = 1 << 20;

/// Blocking CSV reader. One instance serves one consumer at a time.
pub struct CsvReader<R> {
    inner: BufReader<NonClosingStream<R>>,
    state: ReaderState,
}

impl CsvReader<File> {
    /// Opens `path` read-only. The reader owns the file regardless of
    /// `reader_owns_stream`.
    pub fn from_path(path: impl AsRef<Path>, config: CsvConfig) -> CsvResult<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(CsvError::InvalidArgument("path"));
        }
        let file = File::open(path)?;
        debug!(path = %path.display(), "opened csv file");
        Self::new(
            file,
            CsvConfig {
                reader_owns_stream: true,
                ..config
            },
        )
    }
}

impl<R: Read> CsvReader<R> {
    pub fn new(source: R, config: CsvConfig) -> CsvResult<Self> {
        Ok(Self {
            inner: BufReader::with_capacity(BUFFER_CAPACITY, NonClosingStream::new(source)),
            state: ReaderState::new(config)?,
        })
    }

    /// Shares `cache` with other readers instead of the private one.
    pub fn with_cache(mut self, cache: Arc<MappingCache>) -> Self {
        self.state.set_cache(cache);
        self
    }

    /// Checked before every row read; a cancelled token fails the read.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.state.set_cancellation(token);
        self
    }

    pub fn config(&self) -> &CsvConfig {
        self.state.config()
    }

    pub fn mapping_cache(&self) -> &Arc<MappingCache> {
        self.state.cache()
    }

    /// Column names, resolving them from the first line on first use.
    pub fn headers(&mut self) -> CsvResult<&HeaderSet> {
        self.ensure_headers()?;
        self.state.headers().map(|set| &**set)
    }

    /// Whether at least one more line is available. Does not consume input.
    pub fn has_more_rows(&mut self) -> CsvResult<bool> {
        self.ensure_headers()?;
        if self.state.has_replay() {
            return Ok(true);
        }
        Ok(!self.inner.fill_buf()?.is_empty())
    }

    pub fn read_row(&mut self) -> CsvResult<Row> {
        let (line_no, line) = self.next_line()?.ok_or(CsvError::NoMoreRows)?;
        self.state.row(line_no, &line)
    }

    pub fn read_row_as<T: CsvRecord>(&mut self) -> CsvResult<T> {
        let (line_no, line) = self.next_line()?.ok_or(CsvError::NoMoreRows)?;
        self.state.record(line_no, &line)
    }

    /// Remaining rows, from the current position. Single pass; [`reset`](Self::reset)
    /// is the only way to start over.
    pub fn read_rows(&mut self) -> Rows<'_, R> {
        Rows {
            reader: self,
            done: false,
        }
    }

    pub fn read_rows_as<T: CsvRecord>(&mut self) -> Records<'_, R, T> {
        Records {
            reader: self,
            done: false,
            _record: PhantomData,
        }
    }

    /// Consumes the reader. Returns the source when the reader does not own it;
    /// otherwise the source is dropped and `None` is returned.
    pub fn close(self) -> Option<R> {
        let Self { inner, state } = self;
        let mut stream = inner.into_inner();
        stream.close();
        let owns = state.config().reader_owns_stream;
        debug!(owns_stream = owns, "closed csv reader");
        // dropping the state releases the mapping cache if configured
        drop(state);
        (!owns).then(|| stream.into_inner())
    }

    fn ensure_headers(&mut self) -> CsvResult<()> {
        if !self.state.needs_resolution()? {
            return Ok(());
        }
        let first = if self.state.wants_first_line() {
            self.read_line()
        } else {
            Ok(None)
        };
        self.state.resolve(first)
    }

    fn next_line(&mut self) -> CsvResult<Option<(u64, String)>> {
        self.ensure_headers()?;
        self.state.check_cancelled()?;
        if let Some(replayed) = self.state.take_replay() {
            return Ok(Some(replayed));
        }
        self.read_line()
    }

    fn read_line(&mut self) -> CsvResult<Option<(u64, String)>> {
        let mut bytes = Vec::new();
        if self.inner.read_until(b'\n', &mut bytes)? == 0 {
            return Ok(None);
        }
        self.state.take_line(bytes).map(Some)
    }
}

impl<R: Read + Seek> CsvReader<R> {
    /// Rewinds the source and returns headers to the pending state.
    pub fn reset(&mut self) -> CsvResult<()> {
        self.inner.seek(SeekFrom::Start(0))?;
        self.state.reset();
        Ok(())
    }
}

/// Raw rows from [`CsvReader::read_rows`]. Per-row errors are yielded and iteration
/// continues; any other error ends it.
pub struct Rows<'a, R> {
    reader: &'a mut CsvReader<R>,
    done: bool,
}

impl<R: Read> Iterator for Rows<'_, R> {
    type Item = CsvResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        pull(&mut self.done, || match self.reader.has_more_rows() {
            Ok(true) => Some(self.reader.read_row()),
            Ok(false) => None,
            Err(err) => Some(Err(err)),
        })
    }
}

/// Typed rows from [`CsvReader::read_rows_as`].
pub struct Records<'a, R, T> {
    reader: &'a mut CsvReader<R>,
    done: bool,
    _record: PhantomData<fn() -> T>,
}

impl<R: Read, T: CsvRecord> Iterator for Records<'_, R, T> {
    type Item = CsvResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        pull(&mut self.done, || match self.reader.has_more_rows() {
            Ok(true) => Some(self.reader.read_row_as::<T>()),
            Ok(false) => None,
            Err(err) => Some(Err(err)),
        })
    }
}

fn pull<T>(
    done: &mut bool,
    step: impl FnOnce() -> Option<CsvResult<T>>,
) -> Option<CsvResult<T>> {
    if *done {
        return None;
    }
    let item = step();
    match &item {
        None => *done = true,
        Some(Err(err)) if !err.is_row_error() => *done = true,
        _ => {}
    }
    item
}
