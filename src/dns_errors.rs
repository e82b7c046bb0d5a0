// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS provider and DNS configuration error types.
//!
//! This module provides specialized error types for:
//! - Cloudflare REST API operations (lookup, create, update, delete)
//! - BIND dynamic updates (RFC 2136) and TSIG signing
//! - Resolving the controller settings, DNS configuration sources and the
//!   load-balancer address
//!
//! The reconciler treats every [`ProviderError`] as "this one domain failed this
//! pass", while a [`ConfigError`] aborts the pass before any DNS mutation.

use crate::reconcilers::retry::is_retryable_http_status;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors surfaced by a DNS backend.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Cloudflare answered with a non-success HTTP status or `success: false`
    #[error("Cloudflare {operation} for '{name}' failed (HTTP {status}): {message}")]
    CloudflareApi {
        /// Operation being performed (`lookup`, `create`, `update`, `delete`)
        operation: String,
        /// Record name or record id the operation targeted
        name: String,
        /// HTTP status code returned by the API
        status: u16,
        /// Error messages reported by the API
        message: String,
    },

    /// The HTTP request never produced a response (DNS, TLS, connection, timeout)
    #[error("HTTP {operation} request to {url} failed: {reason}")]
    HttpTransport {
        /// Operation being performed
        operation: String,
        /// Request URL
        url: String,
        /// Transport error description
        reason: String,
    },

    /// The provider answered with a body that could not be understood
    #[error("Unexpected response for {operation} of '{name}': {reason}")]
    InvalidResponse {
        /// Operation being performed
        operation: String,
        /// Record name or record id the operation targeted
        name: String,
        /// Parse failure description
        reason: String,
    },

    /// The BIND server rejected a dynamic update
    #[error("DNS UPDATE for '{name}' in zone '{zone}' rejected by {server}: {code}")]
    UpdateRejected {
        /// Fully qualified record name
        name: String,
        /// Zone the update was sent for
        zone: String,
        /// Server that rejected the update
        server: String,
        /// DNS response code
        code: String,
    },

    /// A DNS query or update could not be exchanged with the BIND server
    #[error("DNS exchange with {server} for '{name}' failed: {reason}")]
    DnsExchange {
        /// Fully qualified record name
        name: String,
        /// Server address
        server: String,
        /// Failure description
        reason: String,
    },

    /// Record data is invalid for the record type (e.g. a hostname for an A record)
    #[error("Invalid record data for '{name}': {reason}")]
    InvalidRecordData {
        /// Record name
        name: String,
        /// Explanation of what is invalid
        reason: String,
    },

    /// TSIG key material could not be turned into a signer
    #[error("Invalid TSIG key '{key_name}': {reason}")]
    Tsig {
        /// TSIG key name
        key_name: String,
        /// Failure description
        reason: String,
    },
}

impl ProviderError {
    /// Returns true if the operation may succeed when simply repeated.
    ///
    /// Rate limiting (429), gateway and server errors (500, 502, 503, 504),
    /// transport failures and DNS exchange failures are transient. Everything
    /// else needs a configuration or data change first.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::CloudflareApi { status, .. } => {
                StatusCode::from_u16(*status).is_ok_and(is_retryable_http_status)
            }
            Self::HttpTransport { .. } | Self::DnsExchange { .. } => true,
            Self::InvalidResponse { .. }
            | Self::UpdateRejected { .. }
            | Self::InvalidRecordData { .. }
            | Self::Tsig { .. } => false,
        }
    }

    /// Short machine-readable reason, used as a metrics label.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::CloudflareApi { .. } => "CloudflareApiError",
            Self::HttpTransport { .. } => "HttpTransportError",
            Self::InvalidResponse { .. } => "InvalidResponse",
            Self::UpdateRejected { .. } => "UpdateRejected",
            Self::DnsExchange { .. } => "DnsExchangeFailed",
            Self::InvalidRecordData { .. } => "InvalidRecordData",
            Self::Tsig { .. } => "InvalidTsigKey",
        }
    }
}

/// Errors raised while resolving configuration for a reconciliation pass.
///
/// All of these are retryable by re-triggering the pass; none of them is
/// raised after a DNS mutation has been issued.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    /// The controller settings ConfigMap exists but could not be read
    #[error("Failed to load settings ConfigMap {namespace}/{name}: {reason}")]
    SettingsUnavailable {
        /// Settings namespace
        namespace: String,
        /// Settings ConfigMap name
        name: String,
        /// Failure description
        reason: String,
    },

    /// The `excludedomains` settings entry is not a YAML list of strings
    #[error("Failed to parse excludedomains: {reason}")]
    InvalidExcludeDomains {
        /// Parse failure description
        reason: String,
    },

    /// Neither a ConfigMap nor a Secret with the source name exists
    #[error("Configuration source {source_name} not found as ConfigMap or Secret in namespace {namespace}")]
    SourceNotFound {
        /// Name of the configuration source
        source_name: String,
        /// Namespace that was searched
        namespace: String,
    },

    /// The load-balancer service could not be read
    #[error("Failed to get service {namespace}/{service}: {reason}")]
    ServiceUnavailable {
        /// Service namespace
        namespace: String,
        /// Service name
        service: String,
        /// Failure description
        reason: String,
    },

    /// The load-balancer service has neither an IP nor a hostname in its status
    #[error("No LoadBalancer IP or hostname found for service {namespace}/{service}")]
    NoLoadBalancerAddress {
        /// Service namespace
        namespace: String,
        /// Service name
        service: String,
    },

    /// A required key is missing from the configuration source
    #[error("Configuration source {source_name} is missing required key '{key}'")]
    MissingKey {
        /// Name of the configuration source
        source_name: String,
        /// Missing key
        key: String,
    },

    /// A key in the configuration source holds an unusable value
    #[error("Configuration source {source_name} has invalid value for '{key}': {reason}")]
    InvalidValue {
        /// Name of the configuration source
        source_name: String,
        /// Offending key
        key: String,
        /// Explanation of what is invalid
        reason: String,
    },
}

impl ConfigError {
    /// Short machine-readable reason, used as a metrics label.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::SettingsUnavailable { .. } => "SettingsUnavailable",
            Self::InvalidExcludeDomains { .. } => "InvalidExcludeDomains",
            Self::SourceNotFound { .. } => "SourceNotFound",
            Self::ServiceUnavailable { .. } => "ServiceUnavailable",
            Self::NoLoadBalancerAddress { .. } => "NoLoadBalancerAddress",
            Self::MissingKey { .. } => "MissingKey",
            Self::InvalidValue { .. } => "InvalidValue",
        }
    }
}

#[cfg(test)]
#[path = "dns_errors_tests.rs"]
mod dns_errors_tests;
