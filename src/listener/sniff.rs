use super::ReplayStream;
use crate::metrics::{CONNECTIONS, SNIFF_DURATION};
use std::{fmt, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    time::timeout,
};
use tracing::{debug, warn};

/// First byte of a TLS record carrying a handshake message
pub const TLS_HANDSHAKE_RECORD: u8 = 0x16;

/// How long to wait for the first byte of a new connection
pub const DEFAULT_SNIFF_TIMEOUT: Duration = Duration::from_secs(1);

/// Protocol class of a connection, as decided by its first byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Tls,
    Plaintext,
    /// No byte arrived in time, or the read failed
    Unidentified,
}

impl Transport {
    #[must_use]
    pub const fn classify(first: u8) -> Self {
        if first == TLS_HANDSHAKE_RECORD {
            Self::Tls
        } else {
            Self::Plaintext
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tls => "tls",
            Self::Plaintext => "plaintext",
            Self::Unidentified => "unidentified",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of reading the first byte of a connection
#[derive(Debug)]
pub enum Sniff<S> {
    /// Starts with a TLS handshake record; the stream replays that byte
    Tls(ReplayStream<S>),
    /// Starts with anything else; the stream replays that byte
    Plaintext(ReplayStream<S>),
    /// Timed out, failed or closed before the first byte. The raw stream is
    /// returned untouched so the caller can still decide what to do with it.
    Unidentified(S),
}

impl<S> Sniff<S> {
    #[must_use]
    pub const fn transport(&self) -> Transport {
        match self {
            Self::Tls(_) => Transport::Tls,
            Self::Plaintext(_) => Transport::Plaintext,
            Self::Unidentified(_) => Transport::Unidentified,
        }
    }
}

/// Read one byte from `io`, waiting at most `limit`, and classify the stream
pub async fn sniff<S: AsyncRead + Unpin>(mut io: S, limit: Duration) -> Sniff<S> {
    let timer = SNIFF_DURATION.start_timer();
    let mut first = [0u8; 1];
    let outcome = timeout(limit, io.read(&mut first)).await;
    timer.observe_duration();

    let sniffed = match outcome {
        Ok(Ok(1)) => {
            let [byte] = first;
            let replay = ReplayStream::new(io, byte);
            debug!("first byte {byte:#04x}");
            match Transport::classify(byte) {
                Transport::Tls => Sniff::Tls(replay),
                _ => Sniff::Plaintext(replay),
            }
        }
        Ok(Ok(_)) => {
            warn!("connection closed before sending any data");
            Sniff::Unidentified(io)
        }
        Ok(Err(e)) => {
            warn!("failed to read first byte: {e}");
            Sniff::Unidentified(io)
        }
        Err(_) => {
            warn!("no data within {} ms", limit.as_millis());
            Sniff::Unidentified(io)
        }
    };

    CONNECTIONS
        .with_label_values(&[sniffed.transport().as_str()])
        .inc();
    sniffed
}
