use crate::config::CsvConfig;
use crate::header::HeaderSet;
use crate::mapping::{CsvRecord, MappingCache};
use crate::row::Row;
use crate::state::ReaderState;
use crate::stream::NonClosingStream;
use crate::{CsvError, CsvResult};
use futures::stream::{self, Stream};
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncSeek, AsyncSeekExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Async counterpart of [`CsvReader`](crate::CsvReader) with the same semantics and
/// errors. Reads suspend only while waiting for a line.
pub struct AsyncCsvReader<R> {
    inner: BufReader<NonClosingStream<R>>,
    state: ReaderState,
}

impl AsyncCsvReader<File> {
    /// Opens `path` read-only. The reader owns the file regardless of
    /// `reader_owns_stream`.
    pub async fn from_path(path: impl AsRef<Path>, config: CsvConfig) -> CsvResult<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(CsvError::InvalidArgument("path"));
        }
        let file = File::open(path).await?;
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

impl<R: AsyncRead + Unpin> AsyncCsvReader<R> {
    pub fn new(source: R, config: CsvConfig) -> CsvResult<Self> {
        Ok(Self {
            // Larger buffer for fewer syscalls (1 MiB)
            inner: BufReader::with_capacity(1 << 20, NonClosingStream::new(source)),
            state: ReaderState::new(config)?,
        })
    }

    pub fn with_cache(mut self, cache: Arc<MappingCache>) -> Self {
        self.state.set_cache(cache);
        self
    }

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

    pub async fn headers(&mut self) -> CsvResult<&HeaderSet> {
        self.ensure_headers().await?;
        self.state.headers().map(|set| &**set)
    }

    pub async fn has_more_rows(&mut self) -> CsvResult<bool> {
        self.ensure_headers().await?;
        if self.state.has_replay() {
            return Ok(true);
        }
        Ok(!self.inner.fill_buf().await?.is_empty())
    }

    pub async fn read_row(&mut self) -> CsvResult<Row> {
        let (line_no, line) = self.next_line().await?.ok_or(CsvError::NoMoreRows)?;
        self.state.row(line_no, &line)
    }

    pub async fn read_row_as<T: CsvRecord>(&mut self) -> CsvResult<T> {
        let (line_no, line) = self.next_line().await?.ok_or(CsvError::NoMoreRows)?;
        self.state.record(line_no, &line)
    }

    /// Remaining rows as a single-pass stream; per-row errors are yielded and the
    /// stream continues, any other error ends it.
    pub fn read_rows(&mut self) -> impl Stream<Item = CsvResult<Row>> + '_ {
        stream::unfold((self, false), |(reader, done)| async move {
            if done {
                return None;
            }
            let item = match reader.has_more_rows().await {
                Ok(true) => reader.read_row().await,
                Ok(false) => return None,
                Err(err) => Err(err),
            };
            let done = item.as_ref().is_err_and(|err| !err.is_row_error());
            Some((item, (reader, done)))
        })
    }

    pub fn read_rows_as<T: CsvRecord>(&mut self) -> impl Stream<Item = CsvResult<T>> + '_ {
        stream::unfold((self, false), |(reader, done)| async move {
            if done {
                return None;
            }
            let item = match reader.has_more_rows().await {
                Ok(true) => reader.read_row_as::<T>().await,
                Ok(false) => return None,
                Err(err) => Err(err),
            };
            let done = item.as_ref().is_err_and(|err| !err.is_row_error());
            Some((item, (reader, done)))
        })
    }

    /// Consumes the reader; see [`CsvReader::close`](crate::CsvReader::close).
    pub fn close(self) -> Option<R> {
        let Self { inner, state } = self;
        let mut stream = inner.into_inner();
        stream.close();
        let owns = state.config().reader_owns_stream;
        debug!(owns_stream = owns, "closed csv reader");
        drop(state);
        (!owns).then(|| stream.into_inner())
    }

    async fn ensure_headers(&mut self) -> CsvResult<()> {
        if !self.state.needs_resolution()? {
            return Ok(());
        }
        let first = if self.state.wants_first_line() {
            self.read_line().await
        } else {
            Ok(None)
        };
        self.state.resolve(first)
    }

    async fn next_line(&mut self) -> CsvResult<Option<(u64, String)>> {
        self.ensure_headers().await?;
        self.state.check_cancelled()?;
        if let Some(replayed) = self.state.take_replay() {
            return Ok(Some(replayed));
        }
        self.read_line().await
    }

    async fn read_line(&mut self) -> CsvResult<Option<(u64, String)>> {
        let mut bytes = Vec::new();
        if self.inner.read_until(b'\n', &mut bytes).await? == 0 {
            return Ok(None);
        }
        self.state.take_line(bytes).map(Some)
    }
}

impl<R: AsyncRead + AsyncSeek + Unpin> AsyncCsvReader<R> {
    pub async fn reset(&mut self) -> CsvResult<()> {
        self.inner.seek(SeekFrom::Start(0)).await?;
        self.state.reset();
        Ok(())
    }
}
