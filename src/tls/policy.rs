use super::Identity;
use rustls::{
    CipherSuite, ServerConfig, SupportedCipherSuite, SupportedProtocolVersion,
    crypto::{CryptoProvider, ring},
    version::TLS13,
};
use std::{
    str::FromStr,
    sync::{Arc, OnceLock},
};

static CRYPTO_PROVIDER_INIT: OnceLock<()> = OnceLock::new();

static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&TLS13];

/// The list of cipher suites we accept for TLS 1.2 connections.
///
/// AES-GCM with 256 bit keys goes before 128 bit keys. rustls ships no CBC
/// suites, so `ChaCha20-Poly1305` closes the list. DES and RC4 never appear.
const TLS12_CIPHER_SUITES: &[CipherSuite] = &[
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
];

/// Ensure the rustls crypto provider is initialized
///
/// Server configs built by [`TlsPolicy::server_config`] carry their own
/// provider, but clients built with `ClientConfig::builder()` need a process
/// default. Safe to call multiple times.
pub fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INIT.get_or_init(|| {
        // Err means another provider is already installed, which is fine
        let _ = ring::default_provider().install_default();
    });
}

/// Lowest TLS version a policy accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MinVersion {
    /// TLS 1.2 and 1.3
    Tls12,
    /// TLS 1.3 only
    #[default]
    Tls13,
}

impl FromStr for MinVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tls12" | "tls1.2" => Ok(Self::Tls12),
            "tls13" | "tls1.3" => Ok(Self::Tls13),
            _ => Err(format!("Invalid TLS policy: {s}")),
        }
    }
}

impl MinVersion {
    fn protocol_versions(self) -> &'static [&'static SupportedProtocolVersion] {
        match self {
            Self::Tls12 => rustls::ALL_VERSIONS,
            Self::Tls13 => TLS13_ONLY,
        }
    }
}

/// TLS settings for the node: minimum version plus the TLS 1.2 suite order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPolicy {
    pub min_version: MinVersion,
    /// Ordered TLS 1.2 cipher suites, ignored when TLS 1.3 is negotiated
    pub cipher_suites: Vec<CipherSuite>,
    /// Prefer our suite order over the client's
    pub prefer_server_cipher_suites: bool,
}

impl Default for TlsPolicy {
    fn default() -> Self {
        Self::minimal_tls13()
    }
}

impl TlsPolicy {
    /// Policy that only accepts TLS 1.3
    #[must_use]
    pub const fn minimal_tls13() -> Self {
        Self {
            min_version: MinVersion::Tls13,
            cipher_suites: Vec::new(),
            prefer_server_cipher_suites: false,
        }
    }

    /// Policy that accepts TLS 1.2 with the curated suite list
    ///
    /// Every call returns its own copy of the suite list.
    #[must_use]
    pub fn compatible_tls12() -> Self {
        Self {
            min_version: MinVersion::Tls12,
            cipher_suites: TLS12_CIPHER_SUITES.to_vec(),
            prefer_server_cipher_suites: true,
        }
    }

    /// Policy for a given minimum version
    #[must_use]
    pub fn for_min_version(min_version: MinVersion) -> Self {
        match min_version {
            MinVersion::Tls12 => Self::compatible_tls12(),
            MinVersion::Tls13 => Self::minimal_tls13(),
        }
    }

    /// Build a rustls server configuration presenting `identity`
    ///
    /// # Errors
    ///
    /// Returns an error if the policy leaves no usable suite for a version or
    /// the identity's key does not fit its certificate
    pub fn server_config(&self, identity: &Identity) -> Result<ServerConfig, rustls::Error> {
        let mut provider = ring::default_provider();
        provider.cipher_suites = self.provider_suites(&provider);

        let mut config = ServerConfig::builder_with_provider(Arc::new(provider))
            .with_protocol_versions(self.min_version.protocol_versions())?
            .with_no_client_auth()
            .with_single_cert(identity.cert_chain().to_vec(), identity.private_key())?;
        config.ignore_client_order = self.prefer_server_cipher_suites;

        Ok(config)
    }

    /// TLS 1.3 suites in provider order, then the TLS 1.2 suites we allow
    fn provider_suites(&self, provider: &CryptoProvider) -> Vec<SupportedCipherSuite> {
        let mut suites: Vec<SupportedCipherSuite> = provider
            .cipher_suites
            .iter()
            .filter(|suite| suite.tls13().is_some())
            .copied()
            .collect();

        if self.min_version == MinVersion::Tls12 {
            suites.extend(self.cipher_suites.iter().filter_map(|wanted| {
                provider
                    .cipher_suites
                    .iter()
                    .find(|suite| suite.tls13().is_none() && suite.suite() == *wanted)
                    .copied()
            }));
        }

        suites
    }
}
