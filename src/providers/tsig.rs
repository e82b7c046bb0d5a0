// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! TSIG key handling for BIND dynamic updates.

use crate::constants::TSIG_FUDGE_TIME_SECS;
use crate::dns_errors::ProviderError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hickory_client::rr::rdata::tsig::TsigAlgorithm;
use hickory_client::rr::Name;
use hickory_proto::rr::dnssec::tsig::TSigner;
use std::str::FromStr;

/// TSIG key used to sign dynamic updates.
#[derive(Clone)]
pub struct TsigKey {
    /// Key name as configured on the BIND server
    pub name: String,
    /// HMAC algorithm name (e.g. `hmac-sha512`)
    pub algorithm: String,
    /// Base64-encoded shared secret
    pub secret: String,
}

impl std::fmt::Debug for TsigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TsigKey")
            .field("name", &self.name)
            .field("algorithm", &self.algorithm)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Map a BIND algorithm name to the hickory algorithm.
///
/// Returns `None` for algorithms hickory cannot sign with.
#[must_use]
pub fn parse_algorithm(name: &str) -> Option<TsigAlgorithm> {
    match name.trim().trim_end_matches('.').to_ascii_lowercase().as_str() {
        "hmac-md5" | "hmac-md5.sig-alg.reg.int" => Some(TsigAlgorithm::HmacMd5),
        "hmac-sha1" => Some(TsigAlgorithm::HmacSha1),
        "hmac-sha224" => Some(TsigAlgorithm::HmacSha224),
        "hmac-sha256" => Some(TsigAlgorithm::HmacSha256),
        "hmac-sha384" => Some(TsigAlgorithm::HmacSha384),
        "hmac-sha512" => Some(TsigAlgorithm::HmacSha512),
        _ => None,
    }
}

/// Create a TSIG signer from key data.
///
/// # Errors
///
/// Returns an error if the algorithm is unsupported or key data is invalid.
pub fn create_tsig_signer(key: &TsigKey) -> Result<TSigner, ProviderError> {
    let tsig_error = |reason: String| ProviderError::Tsig {
        key_name: key.name.clone(),
        reason,
    };

    let algorithm = parse_algorithm(&key.algorithm)
        .ok_or_else(|| tsig_error(format!("unsupported algorithm '{}'", key.algorithm)))?;

    let key_bytes = BASE64
        .decode(key.secret.trim())
        .map_err(|e| tsig_error(format!("secret is not valid base64: {e}")))?;

    let signer_name =
        Name::from_str(&key.name).map_err(|e| tsig_error(format!("invalid key name: {e}")))?;

    TSigner::new(
        key_bytes,
        algorithm,
        signer_name,
        u16::try_from(TSIG_FUDGE_TIME_SECS).unwrap_or(300),
    )
    .map_err(|e| tsig_error(format!("failed to create TSIG signer: {e}")))
}

#[cfg(test)]
#[path = "tsig_tests.rs"]
mod tsig_tests;
