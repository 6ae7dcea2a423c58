//! Request signing for the queue service HTTP API.
//!
//! Every request carries a set of common parameters (`Action`, `Nonce`,
//! `Timestamp`, `SecretId`, `SignatureMethod`, `RequestClient`) and a
//! `Signature` computed as:
//!
//! 1. Sort all parameters by key and join them as `key=value` with `&`
//! 2. Build the source string `POST` + host + path + `?` + joined parameters
//! 3. `Signature = base64(HMAC(secret_key, source))`
//!
//! Parameter values are signed unencoded; the transport form-encodes them
//! afterwards.

use crate::config::{SecretKey, SignatureMethod};
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use std::collections::BTreeMap;

/// Value sent in the `RequestClient` parameter
pub const REQUEST_CLIENT: &str = concat!("SDK_Rust_", env!("CARGO_PKG_VERSION"));

/// HTTP method used for every signed request
pub const SIGNED_METHOD: &str = "POST";

/// Signer holding the access key pair
#[derive(Clone)]
pub struct RequestSigner {
    secret_id: String,
    secret_key: SecretKey,
    method: SignatureMethod,
}

impl RequestSigner {
    pub fn new(secret_id: String, secret_key: SecretKey, method: SignatureMethod) -> Self {
        Self {
            secret_id,
            secret_key,
            method,
        }
    }

    /// Add common parameters and the signature to `params`
    ///
    /// # Arguments
    ///
    /// * `host` - Endpoint host (with port when non-default)
    /// * `path` - Request path, e.g. `/v2/index.php`
    /// * `params` - Operation parameters, including `Action`
    /// * `nonce` - Random value that makes the request unique
    /// * `timestamp` - Unix time in seconds
    pub fn sign(
        &self,
        host: &str,
        path: &str,
        params: &mut BTreeMap<String, String>,
        nonce: u32,
        timestamp: i64,
    ) {
        params.insert("Nonce".to_string(), nonce.to_string());
        params.insert("Timestamp".to_string(), timestamp.to_string());
        params.insert("SecretId".to_string(), self.secret_id.clone());
        params.insert(
            "SignatureMethod".to_string(),
            self.method.as_str().to_string(),
        );
        params.insert("RequestClient".to_string(), REQUEST_CLIENT.to_string());
        params.remove("Signature");

        let source = Self::source_string(host, path, params);
        let signature = self.calculate_signature(&source);
        params.insert("Signature".to_string(), signature);
    }

    /// Build the string the signature is computed over
    fn source_string(host: &str, path: &str, params: &BTreeMap<String, String>) -> String {
        // BTreeMap iterates in key order, which is the canonical order
        let joined = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}{}{}?{}", SIGNED_METHOD, host, path, joined)
    }

    fn calculate_signature(&self, source: &str) -> String {
        let key = self.secret_key.expose_secret().as_bytes();
        let digest = match self.method {
            SignatureMethod::HmacSHA256 => {
                let mut mac =
                    Hmac::<Sha256>::new_from_slice(key).expect("HMAC can take key of any size");
                mac.update(source.as_bytes());
                mac.finalize().into_bytes().to_vec()
            }
            SignatureMethod::HmacSHA1 => {
                let mut mac =
                    Hmac::<Sha1>::new_from_slice(key).expect("HMAC can take key of any size");
                mac.update(source.as_bytes());
                mac.finalize().into_bytes().to_vec()
            }
        };

        STANDARD.encode(digest)
    }
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"<REDACTED>")
            .field("method", &self.method)
            .finish()
    }
}

#[cfg(test)]
#[path = "signing_tests.rs"]
mod tests;
