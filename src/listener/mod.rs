//! Single-port listener that serves TLS and plaintext peers side by side
//!
//! Every accepted connection is classified by its first byte: a TLS
//! handshake record (`0x16`) goes through the TLS acceptor, anything else is
//! handed over as plaintext. The consumed byte is replayed to the reader.
//!
//! # Module Organization
//!
//! - `sniff` - First byte classification
//! - `replay` - Stream that replays the sniffed byte
//! - `lazy` - TLS stream with a deferred handshake
//! - `serve` - `axum::serve::Listener` integration

pub mod lazy;
pub mod replay;
pub mod serve;
pub mod sniff;

pub use lazy::LazyTlsStream;
pub use replay::ReplayStream;
pub use sniff::{DEFAULT_SNIFF_TIMEOUT, Sniff, TLS_HANDSHAKE_RECORD, Transport, sniff};

use crate::metrics::ACCEPT_ERRORS;
use rustls::ServerConfig;
use std::{
    fmt,
    future::Future,
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::TcpListener,
};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

/// A source of incoming byte streams
pub trait Listener: Send + 'static {
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;
    type Addr: Send + fmt::Debug;

    /// Accept the next connection; an error means the listener itself failed
    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Io, Self::Addr)>> + Send;

    /// # Errors
    ///
    /// Returns an error if the address cannot be queried
    fn local_addr(&self) -> io::Result<Self::Addr>;
}

impl Listener for TcpListener {
    type Io = tokio::net::TcpStream;
    type Addr = std::net::SocketAddr;

    async fn accept(&mut self) -> io::Result<(Self::Io, Self::Addr)> {
        Self::accept(self).await
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Self::local_addr(self)
    }
}

#[cfg(unix)]
impl Listener for tokio::net::UnixListener {
    type Io = tokio::net::UnixStream;
    type Addr = tokio::net::unix::SocketAddr;

    async fn accept(&mut self) -> io::Result<(Self::Io, Self::Addr)> {
        Self::accept(self).await
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Self::local_addr(self)
    }
}

/// An accepted connection, ready to use
#[derive(Debug)]
pub enum Connection<S> {
    /// TLS server stream, the handshake runs on first read or write
    Tls(Box<LazyTlsStream<ReplayStream<S>>>),
    Plain(ReplayStream<S>),
    /// The peer sent nothing within the sniff timeout. Passed through as
    /// plaintext so that server-speaks-first protocols keep working.
    Unidentified(S),
}

impl<S> Connection<S> {
    #[must_use]
    pub const fn transport(&self) -> Transport {
        match self {
            Self::Tls(_) => Transport::Tls,
            Self::Plain(_) => Transport::Plaintext,
            Self::Unidentified(_) => Transport::Unidentified,
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for Connection<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Unidentified(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for Connection<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Unidentified(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Unidentified(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Unidentified(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Wraps a [`Listener`] and splits its connections into TLS and plaintext
pub struct DowngradingListener<L> {
    inner: L,
    acceptor: TlsAcceptor,
    sniff_timeout: Duration,
}

impl<L: fmt::Debug> fmt::Debug for DowngradingListener<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DowngradingListener")
            .field("inner", &self.inner)
            .field("sniff_timeout", &self.sniff_timeout)
            .finish_non_exhaustive()
    }
}

impl<L: Listener> DowngradingListener<L> {
    #[must_use]
    pub fn new(inner: L, config: Arc<ServerConfig>) -> Self {
        Self {
            inner,
            acceptor: TlsAcceptor::from(config),
            sniff_timeout: DEFAULT_SNIFF_TIMEOUT,
        }
    }

    /// Change how long to wait for a connection's first byte
    #[must_use]
    pub const fn with_sniff_timeout(mut self, sniff_timeout: Duration) -> Self {
        self.sniff_timeout = sniff_timeout;
        self
    }

    #[must_use]
    pub const fn sniff_timeout(&self) -> Duration {
        self.sniff_timeout
    }

    /// # Errors
    ///
    /// Returns an error if the inner listener cannot report its address
    pub fn local_addr(&self) -> io::Result<L::Addr> {
        self.inner.local_addr()
    }

    #[must_use]
    pub fn into_inner(self) -> L {
        self.inner
    }

    /// Accept a connection and classify it without starting TLS
    ///
    /// A peer that sends nothing, fails, or hangs up before its first byte
    /// comes back as [`Sniff::Unidentified`], not as an error.
    ///
    /// # Errors
    ///
    /// Returns an error only when the inner listener fails to accept
    pub async fn accept_no_wrap_tls(&mut self) -> io::Result<(Sniff<L::Io>, L::Addr)> {
        let (io, addr) = self.inner.accept().await.inspect_err(|e| {
            ACCEPT_ERRORS.inc();
            warn!("accept failed: {e}");
        })?;

        let sniffed = sniff(io, self.sniff_timeout).await;
        debug!(peer = ?addr, transport = %sniffed.transport(), "accepted connection");

        Ok((sniffed, addr))
    }

    /// Accept a connection and wrap it according to its first byte
    ///
    /// TLS connections are returned before the handshake; it runs on the
    /// first read or write. Unidentified connections are passed through.
    ///
    /// # Errors
    ///
    /// Returns an error only when the inner listener fails to accept
    pub async fn accept(&mut self) -> io::Result<(Connection<L::Io>, L::Addr)> {
        let (sniffed, addr) = self.accept_no_wrap_tls().await?;

        let connection = match sniffed {
            Sniff::Tls(replay) => {
                Connection::Tls(Box::new(LazyTlsStream::new(self.acceptor.accept(replay))))
            }
            Sniff::Plaintext(replay) => Connection::Plain(replay),
            Sniff::Unidentified(raw) => {
                warn!(peer = ?addr, "could not identify protocol, passing through as plaintext");
                Connection::Unidentified(raw)
            }
        };

        Ok((connection, addr))
    }
}
