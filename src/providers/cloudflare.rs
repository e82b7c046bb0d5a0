// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cloudflare DNS backend (v4 REST API).
//!
//! Records are addressed through `zones/{zone_id}/dns_records`:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | lookup    | `GET dns_records?type=<type>&name=<name>` |
//! | create    | `POST dns_records` |
//! | update    | `PUT dns_records/{id}` |
//! | delete    | `DELETE dns_records/{id}` |
//!
//! Requests are authenticated with a bearer API token. Rate limiting (429),
//! server errors (5xx) and transport failures get a few quick retries within
//! the call; after that, and for any other failure, the error is returned and
//! the record is retried on the next reconciliation pass.

use super::{content_matches, optional_key, required_key, DnsProvider, DnsRecord, RecordType};
use crate::constants::{CLOUDFLARE_AUTO_TTL, HTTP_RETRY_ATTEMPTS};
use crate::dns_errors::{ConfigError, ProviderError};
use crate::reconcilers::retry::http_backoff;
use async_trait::async_trait;
use reqwest::{Client as HttpClient, Method};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

/// Credentials and record options read from a configuration source.
#[derive(Clone)]
pub struct CloudflareConfig {
    /// Cloudflare zone identifier
    pub zone_id: String,
    /// API token with DNS edit permission
    pub token: String,
    /// Whether A records are proxied through Cloudflare
    pub proxied: bool,
    /// Record TTL (1 = automatic)
    pub ttl: u32,
}

impl std::fmt::Debug for CloudflareConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareConfig")
            .field("zone_id", &self.zone_id)
            .field("token", &"<redacted>")
            .field("proxied", &self.proxied)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl CloudflareConfig {
    /// Read `zoneid`, `token` and the optional `proxied` and `ttl` keys.
    ///
    /// # Errors
    ///
    /// Returns an error if a required key is missing or an optional key is malformed.
    pub fn from_source(
        source_name: &str,
        settings: &BTreeMap<String, String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            zone_id: required_key(source_name, settings, "zoneid")?.to_string(),
            token: required_key(source_name, settings, "token")?.to_string(),
            proxied: optional_key(source_name, settings, "proxied", false)?,
            ttl: optional_key(source_name, settings, "ttl", CLOUDFLARE_AUTO_TTL)?,
        })
    }
}

/// Envelope wrapping every Cloudflare v4 response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

/// A DNS record as returned by the API.
#[derive(Debug, Deserialize)]
struct CloudflareRecord {
    id: String,
    name: String,
    #[serde(default)]
    content: String,
}

/// Body of create and update requests.
#[derive(Debug, Serialize)]
struct RecordBody<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
    proxied: bool,
}

/// Cloudflare implementation of [`DnsProvider`].
#[derive(Debug, Clone)]
pub struct CloudflareProvider {
    http: HttpClient,
    api_url: String,
    config: CloudflareConfig,
}

impl CloudflareProvider {
    /// Create a provider for one zone.
    ///
    /// `api_url` is the v4 API base, e.g. `https://api.cloudflare.com/client/v4`.
    #[must_use]
    pub fn new(http: HttpClient, api_url: &str, config: CloudflareConfig) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            config,
        }
    }

    fn records_url(&self, record_id: Option<&str>) -> String {
        let base = format!("{}/zones/{}/dns_records", self.api_url, self.config.zone_id);
        match record_id {
            Some(id) => format!("{base}/{id}"),
            None => base,
        }
    }

    fn parse_url(&self, operation: &str, raw: &str) -> Result<Url, ProviderError> {
        Url::parse(raw).map_err(|e| ProviderError::HttpTransport {
            operation: operation.to_string(),
            url: raw.to_string(),
            reason: format!("invalid URL: {e}"),
        })
    }

    fn body<'a>(&self, name: &'a str, record_type: RecordType, content: &'a str) -> RecordBody<'a> {
        RecordBody {
            record_type: record_type.as_str(),
            name,
            content,
            ttl: self.config.ttl,
            // Only address records can be proxied
            proxied: self.config.proxied && record_type == RecordType::A,
        }
    }

    /// Execute a request, retrying transient failures at most
    /// [`HTTP_RETRY_ATTEMPTS`] times in total.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts or backoff are exhausted, or the
    /// first non-transient error.
    async fn request<T: for<'de> Deserialize<'de>>(
        &self,
        operation: &str,
        target: &str,
        method: Method,
        url: Url,
        body: Option<&RecordBody<'_>>,
    ) -> Result<Option<T>, ProviderError> {
        let mut backoff = http_backoff();
        let start_time = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self
                .request_once(operation, target, method.clone(), url.clone(), body)
                .await
            {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(
                            operation = operation,
                            target = target,
                            attempt = attempt,
                            elapsed = ?start_time.elapsed(),
                            "Cloudflare API call succeeded after retries"
                        );
                    }
                    return Ok(result);
                }
                Err(e) if e.is_transient() => {
                    let next = if attempt < HTTP_RETRY_ATTEMPTS {
                        backoff.next_backoff()
                    } else {
                        None
                    };
                    if let Some(duration) = next {
                        warn!(
                            operation = operation,
                            target = target,
                            attempt = attempt,
                            retry_after = ?duration,
                            error = %e,
                            "Retryable Cloudflare API error, will retry"
                        );
                        tokio::time::sleep(duration).await;
                    } else {
                        error!(
                            operation = operation,
                            target = target,
                            attempt = attempt,
                            elapsed = ?start_time.elapsed(),
                            error = %e,
                            "Retries exhausted, leaving it to the next pass"
                        );
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_once<T: for<'de> Deserialize<'de>>(
        &self,
        operation: &str,
        target: &str,
        method: Method,
        url: Url,
        body: Option<&RecordBody<'_>>,
    ) -> Result<Option<T>, ProviderError> {
        let mut request = self
            .http
            .request(method, url.clone())
            .bearer_auth(&self.config.token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::HttpTransport {
                operation: operation.to_string(),
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::HttpTransport {
                operation: operation.to_string(),
                url: url.to_string(),
                reason: format!("failed to read response body: {e}"),
            })?;

        let parsed: Option<ApiResponse<T>> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            let message = parsed
                .as_ref()
                .map(|envelope| format_messages(&envelope.errors))
                .filter(|message| !message.is_empty())
                .unwrap_or(text);
            return Err(ProviderError::CloudflareApi {
                operation: operation.to_string(),
                name: target.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let envelope = parsed.ok_or_else(|| ProviderError::InvalidResponse {
            operation: operation.to_string(),
            name: target.to_string(),
            reason: "response body is not a Cloudflare API envelope".to_string(),
        })?;

        if !envelope.success {
            return Err(ProviderError::CloudflareApi {
                operation: operation.to_string(),
                name: target.to_string(),
                status: status.as_u16(),
                message: format_messages(&envelope.errors),
            });
        }

        Ok(envelope.result)
    }
}

fn format_messages(messages: &[ApiMessage]) -> String {
    messages
        .iter()
        .map(|m| match m.code {
            Some(code) => format!("{code}: {}", m.message),
            None => m.message.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }

    async fn lookup(
        &self,
        name: &str,
        record_type: RecordType,
        content: Option<&str>,
    ) -> Result<Option<DnsRecord>, ProviderError> {
        let mut url = self.parse_url("lookup", &self.records_url(None))?;
        url.query_pairs_mut()
            .append_pair("type", record_type.as_str())
            .append_pair("name", name);

        let records: Vec<CloudflareRecord> = self
            .request("lookup", name, Method::GET, url, None)
            .await?
            .unwrap_or_default();

        Ok(records
            .into_iter()
            .find(|record| content_matches(&record.content, content))
            .map(|record| DnsRecord {
                id: record.id,
                name: record.name,
                record_type,
                content: match record_type {
                    RecordType::Txt => record.content.trim_matches('"').to_string(),
                    RecordType::A => record.content,
                },
            }))
    }

    async fn create(
        &self,
        name: &str,
        record_type: RecordType,
        content: &str,
    ) -> Result<(), ProviderError> {
        let url = self.parse_url("create", &self.records_url(None))?;
        let body = self.body(name, record_type, content);

        self.request::<serde_json::Value>("create", name, Method::POST, url, Some(&body))
            .await?;

        info!(
            domain = name,
            record_type = %record_type,
            content = content,
            "Created Cloudflare DNS record"
        );
        Ok(())
    }

    async fn update(&self, existing: &DnsRecord, content: &str) -> Result<(), ProviderError> {
        let url = self.parse_url("update", &self.records_url(Some(&existing.id)))?;
        let body = self.body(&existing.name, existing.record_type, content);

        self.request::<serde_json::Value>("update", &existing.name, Method::PUT, url, Some(&body))
            .await?;

        info!(
            domain = %existing.name,
            record_type = %existing.record_type,
            record_id = %existing.id,
            content = content,
            "Updated Cloudflare DNS record"
        );
        Ok(())
    }

    async fn delete(&self, existing: &DnsRecord) -> Result<(), ProviderError> {
        let url = self.parse_url("delete", &self.records_url(Some(&existing.id)))?;

        self.request::<serde_json::Value>("delete", &existing.name, Method::DELETE, url, None)
            .await?;

        info!(
            domain = %existing.name,
            record_type = %existing.record_type,
            record_id = %existing.id,
            "Deleted Cloudflare DNS record"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "cloudflare_tests.rs"]
mod cloudflare_tests;
