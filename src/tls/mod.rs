//! Node TLS identity and policy
//!
//! # Module Organization
//!
//! - `identity` - Issue, persist and reload the self-signed node certificate
//! - `key` - Private key kinds and their PEM encodings
//! - `metadata` - Certificate inspection and the renewal decision
//! - `policy` - Accepted TLS versions and cipher suites
//!
//! # Example
//!
//! ```rust,ignore
//! use tlsgate::tls::{TlsPolicy, ensure_identity};
//!
//! let identity = ensure_identity(&cert, &key, "node1", 365, 30)?;
//! let config = TlsPolicy::compatible_tls12().server_config(&identity)?;
//! ```

pub mod identity;
pub mod key;
pub mod metadata;
pub mod policy;

// Re-export commonly used types
pub use identity::{Identity, IssueError, ensure_identity, issue_certificate, load_identity};
pub use key::{EcCurve, KeyEncodingError, PemBlock, PrivateKeyKind};
pub use metadata::{CertificateMetadata, ExtendedKeyUsageFlags, KeyUsageFlags};
pub use policy::{MinVersion, TlsPolicy, ensure_crypto_provider};
