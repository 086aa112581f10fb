//! Private key kinds and their persisted PEM encoding.
//!
//! Keys come out of the generator as PKCS#8 documents. On disk each kind uses
//! its traditional encoding instead: SEC1 (`EC PRIVATE KEY`) for elliptic
//! curve keys and PKCS#1 (`RSA PRIVATE KEY`) for RSA keys.

use der::{
    Decode, Encode, Tag, Tagged,
    asn1::{AnyRef, ObjectIdentifier},
    pem::LineEnding,
};
use pkcs8::PrivateKeyInfo;
use sec1::{EcParameters, EcPrivateKey};
use thiserror::Error;

const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const SECP384R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");
const PRIME256V1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");

#[derive(Debug, Error)]
pub enum KeyEncodingError {
    #[error("invalid PKCS#8 document: {0}")]
    Pkcs8(#[from] pkcs8::Error),
    #[error("invalid SEC1 key: {0}")]
    Sec1(#[from] sec1::Error),
    #[error("invalid DER: {0}")]
    Der(#[from] der::Error),
    #[error("PEM encoding failed: {0}")]
    Pem(der::pem::Error),
    #[error("PKCS#1 key is not a DER sequence")]
    InvalidRsaKey,
    #[error("unsupported key algorithm {0}")]
    UnsupportedAlgorithm(ObjectIdentifier),
    #[error("unsupported elliptic curve")]
    UnsupportedCurve,
}

/// Named curves we know how to persist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
}

impl EcCurve {
    #[must_use]
    pub const fn oid(self) -> ObjectIdentifier {
        match self {
            Self::P256 => PRIME256V1,
            Self::P384 => SECP384R1,
        }
    }

    fn from_oid(oid: ObjectIdentifier) -> Option<Self> {
        [Self::P256, Self::P384]
            .into_iter()
            .find(|curve| curve.oid() == oid)
    }
}

/// A private key in the encoding we persist for its algorithm
#[derive(Clone, PartialEq, Eq)]
pub enum PrivateKeyKind {
    /// SEC1 `ECPrivateKey`, always carrying the named curve parameters
    Ecdsa { curve: EcCurve, sec1: Vec<u8> },
    /// PKCS#1 `RSAPrivateKey`
    Rsa { pkcs1: Vec<u8> },
}

impl std::fmt::Debug for PrivateKeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ecdsa { curve, .. } => f
                .debug_struct("Ecdsa")
                .field("curve", curve)
                .finish_non_exhaustive(),
            Self::Rsa { .. } => f.debug_struct("Rsa").finish_non_exhaustive(),
        }
    }
}

impl PrivateKeyKind {
    /// Unwrap a PKCS#8 `PrivateKeyInfo` into the key kind it holds
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not DER PKCS#8 or holds a key
    /// algorithm or curve we do not persist
    pub fn from_pkcs8_der(pkcs8: &[u8]) -> Result<Self, KeyEncodingError> {
        let info = PrivateKeyInfo::try_from(pkcs8)?;
        let algorithm = info.algorithm.oid;

        if algorithm == EC_PUBLIC_KEY {
            let curve = info
                .algorithm
                .parameters_oid()
                .ok()
                .and_then(EcCurve::from_oid)
                .ok_or(KeyEncodingError::UnsupportedCurve)?;
            Ok(Self::Ecdsa {
                curve,
                sec1: sec1_with_parameters(info.private_key, curve)?,
            })
        } else if algorithm == RSA_ENCRYPTION {
            // the OCTET STRING already is the PKCS#1 RSAPrivateKey
            if AnyRef::from_der(info.private_key)?.tag() != Tag::Sequence {
                return Err(KeyEncodingError::InvalidRsaKey);
            }
            Ok(Self::Rsa {
                pkcs1: info.private_key.to_vec(),
            })
        } else {
            Err(KeyEncodingError::UnsupportedAlgorithm(algorithm))
        }
    }

    /// The PEM block this key is persisted as
    #[must_use]
    pub fn to_pem_block(&self) -> PemBlock {
        match self {
            Self::Ecdsa { sec1, .. } => PemBlock::new("EC PRIVATE KEY", sec1.clone()),
            Self::Rsa { pkcs1 } => PemBlock::new("RSA PRIVATE KEY", pkcs1.clone()),
        }
    }
}

/// A labelled DER document ready to be written as PEM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemBlock {
    pub label: &'static str,
    pub contents: Vec<u8>,
}

impl PemBlock {
    #[must_use]
    pub const fn new(label: &'static str, contents: Vec<u8>) -> Self {
        Self { label, contents }
    }

    /// Encode as RFC 7468 PEM text
    ///
    /// # Errors
    ///
    /// Returns an error if the label is not a valid PEM label
    pub fn encode(&self) -> Result<String, KeyEncodingError> {
        der::pem::encode_string(self.label, LineEnding::LF, &self.contents)
            .map_err(KeyEncodingError::Pem)
    }
}

/// Re-encode a SEC1 `ECPrivateKey` so it names its curve
///
/// PKCS#8 keeps the curve in the algorithm identifier, so the embedded SEC1
/// structure usually omits `[0] parameters`. A standalone SEC1 file needs it.
fn sec1_with_parameters(sec1: &[u8], curve: EcCurve) -> Result<Vec<u8>, KeyEncodingError> {
    let mut key = EcPrivateKey::try_from(sec1)?;

    if let Some(EcParameters::NamedCurve(embedded)) = key.parameters
        && embedded != curve.oid()
    {
        return Err(KeyEncodingError::UnsupportedCurve);
    }
    key.parameters = Some(EcParameters::NamedCurve(curve.oid()));

    Ok(key.to_der()?)
}
