use super::{Connection, DowngradingListener, Listener};
use std::{io, time::Duration};
use tracing::error;

impl<L: Listener> axum::serve::Listener for DowngradingListener<L> {
    type Io = Connection<L::Io>;
    type Addr = L::Addr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match Self::accept(self).await {
                Ok(accepted) => return accepted,
                Err(e) => handle_accept_error(&e).await,
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Self::local_addr(self)
    }
}

/// Per-connection errors are skipped right away, anything else (e.g. too many
/// open files) backs off for a second before accepting again.
async fn handle_accept_error(e: &io::Error) {
    if is_connection_error(e) {
        return;
    }

    error!("accept error: {e}");
    tokio::time::sleep(Duration::from_secs(1)).await;
}

fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}
