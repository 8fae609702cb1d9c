//! Stream decorator that can be closed without closing what it wraps.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite, ReadBuf};

/// Marker carried inside the `io::Error` returned by a closed [`NonClosingStream`].
#[derive(Debug, Error)]
#[error("Stream has been closed or disposed")]
pub struct StreamClosed;

pub(crate) fn is_closed_error(err: &io::Error) -> bool {
    err.get_ref().is_some_and(|inner| inner.is::<StreamClosed>())
}

fn closed() -> io::Error {
    io::Error::other(StreamClosed)
}

/// Delegates every operation to `S` until closed; afterwards every operation fails
/// with [`StreamClosed`]. Closing never closes `S`, which stays usable through
/// [`into_inner`](Self::into_inner) or, for a borrowed `&mut S`, directly.
#[derive(Debug)]
pub struct NonClosingStream<S> {
    inner: S,
    closed: bool,
}

impl<S> NonClosingStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Marks the wrapper closed without touching the wrapped stream.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn get_ref(&self) -> io::Result<&S> {
        self.check()?;
        Ok(&self.inner)
    }

    pub fn get_mut(&mut self) -> io::Result<&mut S> {
        self.check()?;
        Ok(&mut self.inner)
    }

    /// Returns the wrapped stream, open or closed.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn check(&self) -> io::Result<()> {
        if self.closed {
            Err(closed())
        } else {
            Ok(())
        }
    }
}

impl<S: Write> NonClosingStream<S> {
    /// Flushes the wrapped stream once, then closes the wrapper.
    pub fn flush_and_close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.flush()
    }
}

impl<S: Read> Read for NonClosingStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check()?;
        self.inner.read(buf)
    }
}

impl<S: Write> Write for NonClosingStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check()?;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check()?;
        self.inner.flush()
    }
}

impl<S: Seek> Seek for NonClosingStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.check()?;
        self.inner.seek(pos)
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for NonClosingStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(Err(closed()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for NonClosingStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(Err(closed()));
        }
        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(Err(closed()));
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    /// Flushes the wrapped stream and closes the wrapper; the wrapped stream is not shut down.
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(Ok(()));
        }
        let res = Pin::new(&mut this.inner).poll_flush(cx);
        if res.is_ready() {
            this.closed = true;
        }
        res
    }
}

impl<S: AsyncSeek + Unpin> AsyncSeek for NonClosingStream<S> {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let this = self.get_mut();
        this.check()?;
        Pin::new(&mut this.inner).start_seek(position)
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(Err(closed()));
        }
        Pin::new(&mut this.inner).poll_complete(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Cursor};

    #[test]
    fn does_not_close_underlying_stream() {
        let mut original = Cursor::new(Vec::new());
        writeln!(original, "Test").unwrap();
        original.set_position(0);

        {
            let mut wrapper = NonClosingStream::new(&mut original);
            wrapper.flush_and_close().unwrap();
        }

        let mut line = String::new();
        BufReader::new(&mut original).read_line(&mut line).unwrap();
        assert_eq!(line.trim_end(), "Test");
    }

    #[test]
    fn closing_makes_the_wrapper_unusable() {
        let mut wrapper = NonClosingStream::new(Cursor::new(Vec::new()));
        wrapper.flush_and_close().unwrap();

        let err = wrapper.write(&[1]).unwrap_err();
        assert!(is_closed_error(&err));
        assert!(is_closed_error(&wrapper.read(&mut [0; 4]).unwrap_err()));
        assert!(is_closed_error(&wrapper.stream_position().unwrap_err()));
        assert!(is_closed_error(&wrapper.flush().unwrap_err()));
        assert!(wrapper.get_ref().is_err());

        // the wrapped stream is still reachable by value
        let inner = wrapper.into_inner();
        assert_eq!(inner.position(), 0);
    }

    #[test]
    fn delegates_while_open() {
        let mut wrapper = NonClosingStream::new(Cursor::new(b"abcdef".to_vec()));
        let mut buf = [0u8; 3];
        wrapper.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");
        assert_eq!(wrapper.stream_position().unwrap(), 3);
        wrapper.seek(SeekFrom::Start(0)).unwrap();
        wrapper.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");
    }
}
