use anyhow::{Result, anyhow};
use chrono::{DateTime, TimeDelta, Utc};
use std::{fs, path::Path};
use x509_parser::{
    certificate::X509Certificate,
    extensions::GeneralName,
    pem::parse_x509_pem,
    prelude::FromDer,
    time::ASN1Time,
};

/// Key usage bits we set on issued certificates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyUsageFlags {
    pub digital_signature: bool,
    pub key_encipherment: bool,
}

/// Extended key usage purposes we set on issued certificates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtendedKeyUsageFlags {
    pub server_auth: bool,
    pub client_auth: bool,
}

/// Fields of an X.509 certificate the node cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateMetadata {
    /// First subject CN, if any
    pub common_name: Option<String>,
    /// Subject DN (e.g., "CN=node1, O=tlsgate")
    pub subject: String,
    /// Issuer DN
    pub issuer: String,
    /// DNS names from the subject alternative name extension
    pub dns_names: Vec<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Hex serial, colon separated
    pub serial: String,
    /// Dotted OID of the signature algorithm
    pub signature_algorithm: String,
    /// Basic constraints CA flag, `None` when the extension is absent
    pub is_ca: Option<bool>,
    pub key_usage: KeyUsageFlags,
    pub extended_key_usage: ExtendedKeyUsageFlags,
    self_signed: bool,
}

impl CertificateMetadata {
    /// Parse a DER-encoded certificate
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate or one of its extensions is malformed
    pub fn from_der(cert_der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(cert_der)
            .map_err(|e| anyhow!("failed to parse certificate: {e}"))?;
        Self::from_certificate(&cert)
    }

    /// Parse the first certificate of a PEM file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or holds no valid certificate
    pub fn from_pem_file(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|e| anyhow!("{}: {e}", path.display()))?;
        let (_, pem) =
            parse_x509_pem(&data).map_err(|e| anyhow!("{}: invalid PEM: {e}", path.display()))?;
        Self::from_der(&pem.contents)
    }

    fn from_certificate(cert: &X509Certificate<'_>) -> Result<Self> {
        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(ToString::to_string);

        let dns_names = cert
            .subject_alternative_name()
            .map_err(|e| anyhow!("invalid subject alternative name: {e}"))?
            .map_or_else(Vec::new, |san| {
                san.value
                    .general_names
                    .iter()
                    .filter_map(|name| match name {
                        GeneralName::DNSName(dns) => Some((*dns).to_string()),
                        _ => None,
                    })
                    .collect()
            });

        let key_usage = cert
            .key_usage()
            .map_err(|e| anyhow!("invalid key usage: {e}"))?
            .map(|ku| KeyUsageFlags {
                digital_signature: ku.value.digital_signature(),
                key_encipherment: ku.value.key_encipherment(),
            })
            .unwrap_or_default();

        let extended_key_usage = cert
            .extended_key_usage()
            .map_err(|e| anyhow!("invalid extended key usage: {e}"))?
            .map(|eku| ExtendedKeyUsageFlags {
                server_auth: eku.value.server_auth,
                client_auth: eku.value.client_auth,
            })
            .unwrap_or_default();

        let is_ca = cert
            .basic_constraints()
            .map_err(|e| anyhow!("invalid basic constraints: {e}"))?
            .map(|bc| bc.value.ca);

        let validity = cert.validity();

        Ok(Self {
            common_name,
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            dns_names,
            not_before: to_utc(validity.not_before)?,
            not_after: to_utc(validity.not_after)?,
            serial: cert.raw_serial_as_string(),
            signature_algorithm: cert.signature_algorithm.algorithm.to_id_string(),
            is_ca,
            key_usage,
            extended_key_usage,
            self_signed: cert.subject().as_raw() == cert.issuer().as_raw(),
        })
    }

    /// Length of the validity period
    #[must_use]
    pub fn lifetime(&self) -> TimeDelta {
        self.not_after - self.not_before
    }

    /// Days until expiration (negative if expired)
    #[must_use]
    pub fn expiry_days(&self) -> i64 {
        (self.not_after - Utc::now()).num_days()
    }

    #[must_use]
    pub const fn is_self_signed(&self) -> bool {
        self.self_signed
    }

    /// Whether a node named `common_name` should issue itself a new certificate
    ///
    /// True when the name no longer matches or the certificate expires within
    /// `renew_within_days`.
    #[must_use]
    pub fn should_regenerate(&self, common_name: &str, renew_within_days: u32) -> bool {
        if self.common_name.as_deref() != Some(common_name) {
            return true;
        }

        if self.dns_names.len() != 1 || self.dns_names.iter().any(|dns| dns != common_name) {
            return true;
        }

        self.not_after - Utc::now() <= TimeDelta::days(i64::from(renew_within_days))
    }
}

fn to_utc(time: ASN1Time) -> Result<DateTime<Utc>> {
    let raw = time.to_datetime();
    DateTime::<Utc>::from_timestamp(raw.unix_timestamp(), raw.nanosecond())
        .ok_or_else(|| anyhow!("invalid certificate timestamp"))
}
