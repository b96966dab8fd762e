//! RSA-PSS request signing for Kalshi API authentication.
//!
//! Every REST call and the WebSocket upgrade are signed with RSA-PSS
//! (SHA-256) over `timestamp_ms + method + path` and carried in the
//! `KALSHI-ACCESS-*` headers.

use std::fmt;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::BlindedSigningKey;
use rsa::RsaPrivateKey;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use signature::{RandomizedSigner, SignatureEncoding};

use crate::error::{KalshiError, Result};

/// Header carrying the API key id.
pub const ACCESS_KEY_HEADER: &str = "KALSHI-ACCESS-KEY";
/// Header carrying the base64 RSA-PSS signature.
pub const ACCESS_SIGNATURE_HEADER: &str = "KALSHI-ACCESS-SIGNATURE";
/// Header carrying the millisecond timestamp that was signed.
pub const ACCESS_TIMESTAMP_HEADER: &str = "KALSHI-ACCESS-TIMESTAMP";

/// Signs requests with the account's RSA private key.
pub struct KalshiSigner {
    key_id: SecretString,
    signing_key: BlindedSigningKey<Sha256>,
}

impl KalshiSigner {
    /// Builds a signer from a PEM-encoded private key (PKCS#8 or PKCS#1).
    ///
    /// # Errors
    ///
    /// Returns [`KalshiError::Authentication`] if the PEM cannot be parsed.
    pub fn from_pem(key_id: impl Into<String>, pem: &str) -> Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| KalshiError::Authentication(format!("invalid private key PEM: {e}")))?;

        Ok(Self {
            key_id: SecretString::from(key_id.into()),
            signing_key: BlindedSigningKey::<Sha256>::new(private_key),
        })
    }

    /// Builds a signer from a PEM file on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_pem_file(key_id: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let pem = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            KalshiError::Authentication(format!(
                "cannot read private key {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_pem(key_id, &pem)
    }

    /// Produces the three signing headers for a `method` + `path` pair.
    ///
    /// `path` must be the request path as sent on the wire, including the
    /// API prefix (e.g. `/trade-api/v2/portfolio/orders`).
    ///
    /// # Errors
    ///
    /// Returns [`KalshiError::Signing`] if signing fails.
    pub fn headers(&self, method: &str, path: &str) -> Result<Vec<(&'static str, String)>> {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let message = format!("{timestamp}{method}{path}");

        let signature = self
            .signing_key
            .try_sign_with_rng(&mut rand::thread_rng(), message.as_bytes())
            .map_err(|e| KalshiError::Signing(e.to_string()))?;

        Ok(vec![
            (ACCESS_KEY_HEADER, self.key_id.expose_secret().to_string()),
            (ACCESS_SIGNATURE_HEADER, BASE64.encode(signature.to_bytes())),
            (ACCESS_TIMESTAMP_HEADER, timestamp),
        ])
    }
}

impl fmt::Debug for KalshiSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KalshiSigner")
            .field("key_id", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::EncodePrivateKey;

    fn test_signer() -> KalshiSigner {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let pem = key.to_pkcs8_pem(rsa::pkcs8::LineEnding::LF).unwrap();
        KalshiSigner::from_pem("test-key-id", &pem).unwrap()
    }

    #[test]
    fn test_headers_present_and_decodable() {
        let signer = test_signer();
        let headers = signer.headers("POST", "/trade-api/v2/portfolio/orders").unwrap();

        assert_eq!(headers.len(), 3);
        assert_eq!(headers[0].0, ACCESS_KEY_HEADER);
        assert_eq!(headers[0].1, "test-key-id");
        assert!(BASE64.decode(&headers[1].1).is_ok());
        assert!(headers[2].1.parse::<i64>().is_ok());
    }

    #[test]
    fn test_signatures_differ_per_call() {
        // PSS is randomized; two signatures over the same message differ.
        let signer = test_signer();
        let a = signer.headers("GET", "/trade-api/ws/v2").unwrap();
        let b = signer.headers("GET", "/trade-api/ws/v2").unwrap();
        assert_ne!(a[1].1, b[1].1);
    }

    #[test]
    fn test_invalid_pem_rejected() {
        let err = KalshiSigner::from_pem("id", "not a pem").unwrap_err();
        assert!(matches!(err, KalshiError::Authentication(_)));
    }

    #[test]
    fn test_debug_redacts_key_id() {
        let signer = test_signer();
        let debug = format!("{signer:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("test-key-id"));
    }
}
