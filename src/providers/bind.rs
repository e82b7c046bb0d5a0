// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! BIND DNS backend using dynamic DNS updates (RFC 2136).
//!
//! Lookups are plain UDP queries against the configured server. Writes are
//! TSIG-signed UPDATE messages:
//!
//! - create: `append` without prerequisites
//! - update: `compare_and_swap` from the observed record to the new one
//! - delete: `delete_by_rdata` of the observed record
//!
//! BIND has no record ids, so a record's id is its current content.
//! hickory's client is synchronous; every exchange runs on the blocking pool.

use super::tsig::{create_tsig_signer, TsigKey};
use super::{content_matches, optional_key, required_key, DnsProvider, DnsRecord, RecordType};
use crate::constants::{DEFAULT_BIND_RECORD_TTL_SECS, DEFAULT_TSIG_ALGORITHM, DNS_PORT};
use crate::dns_errors::{ConfigError, ProviderError};
use async_trait::async_trait;
use hickory_client::client::{Client, SyncClient};
use hickory_client::op::ResponseCode;
use hickory_client::rr::{rdata, DNSClass, Name, RData, Record};
use hickory_client::udp::UdpClientConnection;
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use tracing::{debug, info};

/// Server, zone and key read from a configuration source.
#[derive(Debug, Clone)]
pub struct BindConfig {
    /// Server address, `host` or `host:port`
    pub server: String,
    /// Zone the records live in
    pub zone: String,
    /// TSIG key used to sign updates
    pub key: TsigKey,
    /// TTL of created records
    pub ttl: u32,
}

impl BindConfig {
    /// Read `server`, `zone`, `keyname`, `hmackey` and the optional
    /// `algorithm` and `ttl` keys.
    ///
    /// # Errors
    ///
    /// Returns an error if a required key is missing or an optional key is malformed.
    pub fn from_source(
        source_name: &str,
        settings: &BTreeMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let server = required_key(source_name, settings, "server")?.to_string();
        let zone = required_key(source_name, settings, "zone")?.to_string();
        let key = TsigKey {
            name: required_key(source_name, settings, "keyname")?.to_string(),
            secret: required_key(source_name, settings, "hmackey")?.to_string(),
            algorithm: optional_key(
                source_name,
                settings,
                "algorithm",
                DEFAULT_TSIG_ALGORITHM.to_string(),
            )?,
        };
        let ttl = optional_key(source_name, settings, "ttl", DEFAULT_BIND_RECORD_TTL_SECS)?;

        Ok(Self {
            server,
            zone,
            key,
            ttl,
        })
    }
}

/// BIND implementation of [`DnsProvider`].
#[derive(Debug, Clone)]
pub struct BindProvider {
    config: BindConfig,
}

impl BindProvider {
    /// Create a provider for one zone on one server.
    #[must_use]
    pub fn new(config: BindConfig) -> Self {
        Self { config }
    }

    fn exchange_error(&self, name: &str, reason: impl Into<String>) -> ProviderError {
        ProviderError::DnsExchange {
            name: name.to_string(),
            server: self.config.server.clone(),
            reason: reason.into(),
        }
    }

    /// Build the record that carries `content` for `name`.
    ///
    /// Content is validated here, before any network exchange.
    fn build_record(
        &self,
        name: &str,
        record_type: RecordType,
        content: &str,
    ) -> Result<Record, ProviderError> {
        let fqdn = fqdn(name).map_err(|reason| ProviderError::InvalidRecordData {
            name: name.to_string(),
            reason,
        })?;

        let data = match record_type {
            RecordType::A => {
                let address = Ipv4Addr::from_str(content).map_err(|_| {
                    ProviderError::InvalidRecordData {
                        name: name.to_string(),
                        reason: format!("'{content}' is not an IPv4 address"),
                    }
                })?;
                RData::A(address.into())
            }
            RecordType::Txt => RData::TXT(rdata::TXT::new(vec![content.to_string()])),
        };

        let mut record = Record::from_rdata(fqdn, self.config.ttl, data);
        record.set_dns_class(DNSClass::IN);
        Ok(record)
    }

    /// Send a signed UPDATE built by `update` and check the response code.
    async fn send_update<F>(
        &self,
        operation: &'static str,
        name: &str,
        update: F,
    ) -> Result<(), ProviderError>
    where
        F: FnOnce(&SyncClient<UdpClientConnection>, Name) -> Result<ResponseCode, String>
            + Send
            + 'static,
    {
        let server = self.config.server.clone();
        let zone_name = self.config.zone.clone();
        let key = self.config.key.clone();
        let record_name = name.to_string();

        tokio::task::spawn_blocking(move || {
            let server_addr = resolve_server(&server).map_err(|reason| {
                ProviderError::DnsExchange {
                    name: record_name.clone(),
                    server: server.clone(),
                    reason,
                }
            })?;

            let zone = fqdn(&zone_name).map_err(|reason| ProviderError::InvalidRecordData {
                name: zone_name.clone(),
                reason,
            })?;

            let signer = create_tsig_signer(&key)?;

            let conn = UdpClientConnection::new(server_addr).map_err(|e| {
                ProviderError::DnsExchange {
                    name: record_name.clone(),
                    server: server.clone(),
                    reason: format!("failed to create UDP connection: {e}"),
                }
            })?;
            let client = SyncClient::with_tsigner(conn, signer);

            debug!(
                operation = operation,
                domain = %record_name,
                zone = %zone_name,
                server = %server,
                "Sending DNS UPDATE"
            );

            let code = update(&client, zone).map_err(|reason| ProviderError::DnsExchange {
                name: record_name.clone(),
                server: server.clone(),
                reason,
            })?;

            match code {
                ResponseCode::NoError => Ok(()),
                code => Err(ProviderError::UpdateRejected {
                    name: record_name,
                    zone: zone_name,
                    server,
                    code: format!("{code:?}"),
                }),
            }
        })
        .await
        .map_err(|e| self.exchange_error(name, format!("DNS update task failed: {e}")))?
    }
}

#[async_trait]
impl DnsProvider for BindProvider {
    fn provider_name(&self) -> &'static str {
        "bind"
    }

    async fn lookup(
        &self,
        name: &str,
        record_type: RecordType,
        content: Option<&str>,
    ) -> Result<Option<DnsRecord>, ProviderError> {
        let fqdn = fqdn(name).map_err(|reason| ProviderError::InvalidRecordData {
            name: name.to_string(),
            reason,
        })?;
        let server = self.config.server.clone();
        let wire_type = wire_type(record_type);
        let record_name = name.to_string();
        let wanted = content.map(str::to_string);

        let answer = tokio::task::spawn_blocking(move || {
            let server_addr = resolve_server(&server)?;
            let conn = UdpClientConnection::new(server_addr)
                .map_err(|e| format!("failed to create UDP connection: {e}"))?;
            let client = SyncClient::new(conn);

            let response = client
                .query(&fqdn, DNSClass::IN, wire_type)
                .map_err(|e| format!("query for {wire_type} record failed: {e}"))?;

            Ok::<_, String>(
                response
                    .answers()
                    .iter()
                    .filter(|r| r.record_type() == wire_type)
                    .filter_map(|r| r.data().and_then(record_content))
                    .find(|content| content_matches(content, wanted.as_deref())),
            )
        })
        .await
        .map_err(|e| self.exchange_error(name, format!("DNS query task failed: {e}")))?
        .map_err(|reason| self.exchange_error(name, reason))?;

        Ok(answer.map(|content| DnsRecord {
            id: content.clone(),
            name: record_name,
            record_type,
            content,
        }))
    }

    async fn create(
        &self,
        name: &str,
        record_type: RecordType,
        content: &str,
    ) -> Result<(), ProviderError> {
        let record = self.build_record(name, record_type, content)?;

        self.send_update("create", name, move |client, zone| {
            client
                .append(record, zone, false)
                .map(|response| response.response_code())
                .map_err(|e| e.to_string())
        })
        .await?;

        info!(
            domain = name,
            record_type = %record_type,
            content = content,
            zone = %self.config.zone,
            "Created BIND DNS record"
        );
        Ok(())
    }

    async fn update(&self, existing: &DnsRecord, content: &str) -> Result<(), ProviderError> {
        let current = self.build_record(&existing.name, existing.record_type, &existing.id)?;
        let new = self.build_record(&existing.name, existing.record_type, content)?;

        self.send_update("update", &existing.name, move |client, zone| {
            client
                .compare_and_swap(current, new, zone)
                .map(|response| response.response_code())
                .map_err(|e| e.to_string())
        })
        .await?;

        info!(
            domain = %existing.name,
            record_type = %existing.record_type,
            previous = %existing.content,
            content = content,
            zone = %self.config.zone,
            "Updated BIND DNS record"
        );
        Ok(())
    }

    async fn delete(&self, existing: &DnsRecord) -> Result<(), ProviderError> {
        let record = self.build_record(&existing.name, existing.record_type, &existing.id)?;

        self.send_update("delete", &existing.name, move |client, zone| {
            client
                .delete_by_rdata(record, zone)
                .map(|response| response.response_code())
                .map_err(|e| e.to_string())
        })
        .await?;

        info!(
            domain = %existing.name,
            record_type = %existing.record_type,
            zone = %self.config.zone,
            "Deleted BIND DNS record"
        );
        Ok(())
    }
}

/// Parse a domain as a fully qualified name.
pub(crate) fn fqdn(name: &str) -> Result<Name, String> {
    let trimmed = name.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err("empty domain name".to_string());
    }
    Name::from_str(&format!("{trimmed}.")).map_err(|e| format!("invalid domain name: {e}"))
}

/// Resolve `host` or `host:port` to a socket address, defaulting to port 53.
pub(crate) fn resolve_server(server: &str) -> Result<SocketAddr, String> {
    if let Ok(addr) = server.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = server.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DNS_PORT));
    }

    let resolved = if server.contains(':') {
        server.to_socket_addrs()
    } else {
        (server, DNS_PORT).to_socket_addrs()
    };

    resolved
        .map_err(|e| format!("invalid server address '{server}': {e}"))?
        .next()
        .ok_or_else(|| format!("server address '{server}' did not resolve"))
}

fn wire_type(record_type: RecordType) -> hickory_client::rr::RecordType {
    match record_type {
        RecordType::A => hickory_client::rr::RecordType::A,
        RecordType::Txt => hickory_client::rr::RecordType::TXT,
    }
}

/// Content of an answer as the provider-neutral string form.
fn record_content(data: &RData) -> Option<String> {
    match data {
        RData::A(address) => Some(address.to_string()),
        RData::TXT(txt) => Some(
            txt.txt_data()
                .iter()
                .map(|bytes| String::from_utf8_lossy(bytes).to_string())
                .collect::<String>(),
        ),
        _ => None,
    }
}

#[cfg(test)]
#[path = "bind_tests.rs"]
mod bind_tests;
