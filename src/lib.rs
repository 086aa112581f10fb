//! Self-signed node identity and a single-port listener that tells TLS peers
//! from plaintext peers by their first byte.

pub mod cli;
pub mod listener;
pub mod metrics;
pub mod server;
pub mod tls;
