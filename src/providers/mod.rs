// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS provider backends.
//!
//! The reconciler talks to DNS only through the [`DnsProvider`] capability set:
//! lookup by name and type, create, update and delete. Two backends implement it:
//!
//! - [`cloudflare::CloudflareProvider`] - Cloudflare v4 REST API
//! - [`bind::BindProvider`] - RFC 2136 dynamic updates signed with TSIG
//!
//! The backend is chosen per Ingress by the `dns.configuration/type`
//! annotation and built from the configuration source named by
//! `dns.configuration/source` through a [`ProviderFactory`].
//!
//! No atomicity is offered across records. Every write is preceded by a
//! lookup, which keeps each record operation idempotent on its own.

pub mod bind;
pub mod cloudflare;
pub mod tsig;

use crate::dns_errors::{ConfigError, ProviderError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Record types managed by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordType {
    /// IPv4 address record pointing at the load balancer
    A,
    /// Ownership marker record
    Txt,
}

impl RecordType {
    /// Wire name of the record type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Txt => "TXT",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record as it currently exists at the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    /// Provider-specific record identifier
    pub id: String,
    /// Fully qualified record name, without trailing dot
    pub name: String,
    /// Record type
    pub record_type: RecordType,
    /// Current record content (address or text)
    pub content: String,
}

/// Capability set every DNS backend provides.
///
/// A lookup for a record that does not exist returns `Ok(None)`. Any other
/// failure is surfaced as a [`ProviderError`]; the reconciler treats all of
/// them as "this domain failed this pass".
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Name of the backend, used in logs and metrics.
    fn provider_name(&self) -> &'static str;

    /// Find the record of `record_type` named `name`.
    ///
    /// With `content` set, only a record holding exactly that content matches,
    /// so records sharing the name but owned by someone else are never returned.
    async fn lookup(
        &self,
        name: &str,
        record_type: RecordType,
        content: Option<&str>,
    ) -> Result<Option<DnsRecord>, ProviderError>;

    /// Create a new record.
    async fn create(
        &self,
        name: &str,
        record_type: RecordType,
        content: &str,
    ) -> Result<(), ProviderError>;

    /// Replace the content of an existing record.
    async fn update(&self, existing: &DnsRecord, content: &str) -> Result<(), ProviderError>;

    /// Delete an existing record.
    async fn delete(&self, existing: &DnsRecord) -> Result<(), ProviderError>;
}

/// Backend selected by the `dns.configuration/type` annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Cloudflare REST API
    Cloudflare,
    /// BIND dynamic update
    Bind,
}

impl ProviderKind {
    /// Parse the annotation value. Unknown values yield `None`.
    #[must_use]
    pub fn from_annotation(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cloudflare" => Some(Self::Cloudflare),
            "bind" => Some(Self::Bind),
            _ => None,
        }
    }

    /// Annotation value naming this backend.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cloudflare => "cloudflare",
            Self::Bind => "bind",
        }
    }
}

/// Builds a provider for one reconciliation pass from a resolved configuration source.
pub trait ProviderFactory: Send + Sync {
    /// Build the backend of `kind` from the flat settings of `source_name`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if required keys are missing or malformed.
    fn build(
        &self,
        kind: ProviderKind,
        source_name: &str,
        settings: &BTreeMap<String, String>,
    ) -> Result<Arc<dyn DnsProvider>, ConfigError>;
}

/// Factory for the real Cloudflare and BIND backends.
#[derive(Clone)]
pub struct BackendFactory {
    http_client: reqwest::Client,
    cloudflare_api_url: String,
}

impl BackendFactory {
    /// Create a factory sharing one HTTP client across Cloudflare providers.
    #[must_use]
    pub fn new(http_client: reqwest::Client, cloudflare_api_url: impl Into<String>) -> Self {
        Self {
            http_client,
            cloudflare_api_url: cloudflare_api_url.into(),
        }
    }
}

impl ProviderFactory for BackendFactory {
    fn build(
        &self,
        kind: ProviderKind,
        source_name: &str,
        settings: &BTreeMap<String, String>,
    ) -> Result<Arc<dyn DnsProvider>, ConfigError> {
        match kind {
            ProviderKind::Cloudflare => {
                let config = cloudflare::CloudflareConfig::from_source(source_name, settings)?;
                Ok(Arc::new(cloudflare::CloudflareProvider::new(
                    self.http_client.clone(),
                    &self.cloudflare_api_url,
                    config,
                )))
            }
            ProviderKind::Bind => {
                let config = bind::BindConfig::from_source(source_name, settings)?;
                Ok(Arc::new(bind::BindProvider::new(config)))
            }
        }
    }
}

/// Whether a record's content satisfies a lookup's content filter.
///
/// TXT data may come back wrapped in double quotes; they are ignored.
pub(crate) fn content_matches(record_content: &str, wanted: Option<&str>) -> bool {
    wanted.is_none_or(|wanted| record_content.trim_matches('"') == wanted)
}

/// Fetch a required, non-empty key from a configuration source.
pub(crate) fn required_key<'a>(
    source_name: &str,
    settings: &'a BTreeMap<String, String>,
    key: &str,
) -> Result<&'a str, ConfigError> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConfigError::MissingKey {
            source_name: source_name.to_string(),
            key: key.to_string(),
        })
}

/// Parse an optional key, falling back to `default` when absent or empty.
pub(crate) fn optional_key<T: std::str::FromStr>(
    source_name: &str,
    settings: &BTreeMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    match settings.get(key).map(|value| value.trim()) {
        None | Some("") => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            source_name: source_name.to_string(),
            key: key.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
