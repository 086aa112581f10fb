use crate::metrics::TLS_HANDSHAKE_ERRORS;
use rustls::ServerConnection;
use std::{
    fmt,
    future::{Future, poll_fn},
    io,
    pin::Pin,
    task::{Context, Poll, ready},
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_rustls::{Accept, server::TlsStream};
use tracing::{debug, warn};

enum State<S> {
    Handshaking(Accept<S>),
    Streaming(TlsStream<S>),
    Failed,
}

/// Server side TLS stream whose handshake runs on first use
///
/// The handshake is driven by the first read, write or flush (or an explicit
/// [`LazyTlsStream::handshake`]), so accepting a connection never blocks on a
/// slow or hostile peer. Once a handshake has failed every later operation
/// fails as well.
pub struct LazyTlsStream<S> {
    state: State<S>,
}

impl<S> fmt::Debug for LazyTlsStream<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Handshaking(_) => "handshaking",
            State::Streaming(_) => "streaming",
            State::Failed => "failed",
        };
        f.debug_struct("LazyTlsStream")
            .field("state", &state)
            .finish()
    }
}

impl<S> LazyTlsStream<S> {
    pub(crate) const fn new(accept: Accept<S>) -> Self {
        Self {
            state: State::Handshaking(accept),
        }
    }

    #[must_use]
    pub const fn is_handshaking(&self) -> bool {
        matches!(self.state, State::Handshaking(_))
    }

    /// Negotiated session, available once the handshake has completed
    #[must_use]
    pub fn server_connection(&self) -> Option<&ServerConnection> {
        match &self.state {
            State::Streaming(stream) => Some(stream.get_ref().1),
            _ => None,
        }
    }

    /// The underlying transport, available once the handshake has completed
    #[must_use]
    pub fn get_ref(&self) -> Option<&S> {
        match &self.state {
            State::Streaming(stream) => Some(stream.get_ref().0),
            _ => None,
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> LazyTlsStream<S> {
    /// Drive the handshake to completion
    ///
    /// # Errors
    ///
    /// Returns the handshake error, or `NotConnected` if an earlier handshake
    /// already failed
    pub async fn handshake(&mut self) -> io::Result<()> {
        poll_fn(|cx| self.poll_handshake(cx)).await
    }

    fn poll_handshake(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let result = match &mut self.state {
            State::Streaming(_) => return Poll::Ready(Ok(())),
            State::Failed => return Poll::Ready(Err(handshake_failed())),
            State::Handshaking(accept) => ready!(Pin::new(accept).poll(cx)),
        };

        match result {
            Ok(stream) => {
                let (_, session) = stream.get_ref();
                debug!(
                    version = ?session.protocol_version(),
                    cipher = ?session.negotiated_cipher_suite().map(|suite| suite.suite()),
                    "TLS handshake complete"
                );
                self.state = State::Streaming(stream);
                Poll::Ready(Ok(()))
            }
            Err(e) => {
                TLS_HANDSHAKE_ERRORS.inc();
                warn!("TLS handshake failed: {e}");
                self.state = State::Failed;
                Poll::Ready(Err(e))
            }
        }
    }

    fn poll_stream(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<Pin<&mut TlsStream<S>>>> {
        ready!(self.poll_handshake(cx))?;
        match &mut self.state {
            State::Streaming(stream) => Poll::Ready(Ok(Pin::new(stream))),
            _ => Poll::Ready(Err(handshake_failed())),
        }
    }
}

fn handshake_failed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "TLS handshake failed")
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for LazyTlsStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let stream = ready!(self.get_mut().poll_stream(cx))?;
        stream.poll_read(cx, buf)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for LazyTlsStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let stream = ready!(self.get_mut().poll_stream(cx))?;
        stream.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let stream = ready!(self.get_mut().poll_stream(cx))?;
        stream.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match &mut this.state {
            // nothing left to close cleanly
            State::Failed => Poll::Ready(Ok(())),
            State::Streaming(stream) => Pin::new(stream).poll_shutdown(cx),
            State::Handshaking(_) => {
                let stream = ready!(this.poll_stream(cx))?;
                stream.poll_shutdown(cx)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::tls::{TlsPolicy, issue_certificate};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
    use tokio_rustls::TlsAcceptor;

    fn acceptor() -> (TempDir, TlsAcceptor) {
        let dir = TempDir::new().unwrap();
        let identity = issue_certificate(
            &dir.path().join("cert.pem"),
            &dir.path().join("key.pem"),
            "node1",
            1,
        )
        .unwrap();
        let config = TlsPolicy::minimal_tls13().server_config(&identity).unwrap();
        (dir, TlsAcceptor::from(Arc::new(config)))
    }

    #[tokio::test]
    async fn test_accept_does_not_handshake() {
        let (_dir, acceptor) = acceptor();
        let (_client, server) = duplex(1024);

        let stream = LazyTlsStream::new(acceptor.accept(server));
        assert!(stream.is_handshaking());
        assert!(stream.server_connection().is_none());
        assert!(stream.get_ref().is_none());
    }

    #[tokio::test]
    async fn test_garbage_fails_handshake_and_stays_failed() {
        let (_dir, acceptor) = acceptor();
        let (mut client, server) = duplex(1024);
        client
            .write_all(b"\x16\x03\x01\x00\x05hello, this is not a client hello")
            .await
            .unwrap();

        let before = TLS_HANDSHAKE_ERRORS.get();
        let mut stream = LazyTlsStream::new(acceptor.accept(server));
        let mut buf = [0u8; 8];
        assert!(stream.read(&mut buf).await.is_err());
        assert!(!stream.is_handshaking());
        assert!(TLS_HANDSHAKE_ERRORS.get() > before);

        let err = stream.write_all(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert!(stream.handshake().await.is_err());
        stream.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_debug_reports_state() {
        let (_dir, acceptor) = acceptor();
        let (_client, server) = duplex(1024);
        let stream = LazyTlsStream::new(acceptor.accept(server));
        assert!(format!("{stream:?}").contains("handshaking"));
    }
}
