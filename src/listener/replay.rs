use std::{
    io::{self, Read, Write},
    pin::Pin,
    task::{Context, Poll},
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// A stream that hands back one already-consumed byte before reading from `S`
///
/// The byte is delivered exactly once and never split; a read into a buffer
/// with no room leaves it in place. Writes go straight to the inner stream.
#[derive(Debug)]
pub struct ReplayStream<S> {
    inner: S,
    first: Option<u8>,
}

impl<S> ReplayStream<S> {
    #[must_use]
    pub const fn new(inner: S, first: u8) -> Self {
        Self {
            inner,
            first: Some(first),
        }
    }

    /// The byte still waiting to be read, if any
    #[must_use]
    pub const fn pending(&self) -> Option<u8> {
        self.first
    }

    #[must_use]
    pub const fn get_ref(&self) -> &S {
        &self.inner
    }

    pub const fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Split into the inner stream and the byte not yet read
    #[must_use]
    pub fn into_parts(self) -> (S, Option<u8>) {
        (self.inner, self.first)
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for ReplayStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some(byte) = self.first {
            if buf.remaining() > 0 {
                buf.put_slice(&[byte]);
                self.first = None;
            }
            return Poll::Ready(Ok(()));
        }

        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for ReplayStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl<S: Read> Read for ReplayStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(byte) = self.first {
            let Some(slot) = buf.first_mut() else {
                return Ok(0);
            };
            *slot = byte;
            self.first = None;
            return Ok(1);
        }

        self.inner.read(buf)
    }
}

impl<S: Write> Write for ReplayStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
