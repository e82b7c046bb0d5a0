// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Configuration resolution.
//!
//! Three things are resolved fresh on every reconciliation pass, so edits take
//! effect on the next event without a restart:
//!
//! - the controller settings ConfigMap: which load-balancer service to point
//!   records at and which domains never to manage
//! - the DNS configuration source named by an Ingress: a ConfigMap, or a
//!   Secret when no ConfigMap of that name exists
//! - the external address of the load-balancer service
//!
//! # Settings ConfigMap
//!
//! ```yaml
//! apiVersion: v1
//! kind: ConfigMap
//! metadata:
//!   name: kube-dns-manager
//!   namespace: kube-dns-manager
//! data:
//!   traefikServiceName: traefik
//!   traefikNamespace: kube-system
//!   excludedomains: |
//!     - internal.example.com
//! ```

use crate::constants::{
    DEFAULT_LB_SERVICE_NAME, DEFAULT_LB_SERVICE_NAMESPACE, SETTINGS_EXCLUDE_DOMAINS_KEY,
    SETTINGS_SERVICE_NAMESPACE_KEY, SETTINGS_SERVICE_NAME_KEY,
};
use crate::dns_errors::ConfigError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use kube::{Api, Client};
use std::collections::BTreeMap;
use tracing::debug;

/// Where DNS records should point, and which domains to leave alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    /// Name of the load-balancer service
    pub service_name: String,
    /// Namespace of the load-balancer service
    pub service_namespace: String,
    /// Domains never managed by the controller
    pub exclude_domains: Vec<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_LB_SERVICE_NAME.to_string(),
            service_namespace: DEFAULT_LB_SERVICE_NAMESPACE.to_string(),
            exclude_domains: Vec::new(),
        }
    }
}

impl TargetConfig {
    /// Build the target configuration from settings ConfigMap data.
    ///
    /// Empty or missing service keys fall back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidExcludeDomains`] if `excludedomains` is
    /// present but not a YAML list of strings.
    pub fn from_settings(data: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str, default: &str| {
            data.get(key)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .unwrap_or(default)
                .to_string()
        };

        let exclude_domains = match data.get(SETTINGS_EXCLUDE_DOMAINS_KEY) {
            Some(raw) => parse_exclude_domains(raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            service_name: non_empty(SETTINGS_SERVICE_NAME_KEY, DEFAULT_LB_SERVICE_NAME),
            service_namespace: non_empty(
                SETTINGS_SERVICE_NAMESPACE_KEY,
                DEFAULT_LB_SERVICE_NAMESPACE,
            ),
            exclude_domains,
        })
    }
}

/// Parse the `excludedomains` YAML list. Blank or `null` means no exclusions.
///
/// # Errors
///
/// Returns an error if the value is not a list of strings.
pub fn parse_exclude_domains(raw: &str) -> Result<Vec<String>, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let parsed: Option<Vec<String>> =
        serde_yaml::from_str(raw).map_err(|e| ConfigError::InvalidExcludeDomains {
            reason: e.to_string(),
        })?;

    Ok(parsed
        .unwrap_or_default()
        .into_iter()
        .map(|domain| domain.trim().to_string())
        .filter(|domain| !domain.is_empty())
        .collect())
}

/// Flatten a Secret into string settings. `stringData` wins over `data`.
#[must_use]
pub fn secret_settings(secret: &Secret) -> BTreeMap<String, String> {
    let mut settings: BTreeMap<String, String> = secret
        .data
        .iter()
        .flatten()
        .map(|(key, value)| (key.clone(), String::from_utf8_lossy(&value.0).to_string()))
        .collect();

    if let Some(string_data) = &secret.string_data {
        settings.extend(string_data.clone());
    }

    settings
}

/// Address of the first load-balancer ingress entry: its IP, else its hostname.
///
/// # Errors
///
/// Returns [`ConfigError::NoLoadBalancerAddress`] if the service has no
/// populated load-balancer status.
pub fn service_address(
    service: &Service,
    namespace: &str,
    service_name: &str,
) -> Result<String, ConfigError> {
    service
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .and_then(|ingress| ingress.first())
        .and_then(|first| {
            first
                .ip
                .as_deref()
                .filter(|ip| !ip.is_empty())
                .or_else(|| first.hostname.as_deref().filter(|h| !h.is_empty()))
        })
        .map(ToString::to_string)
        .ok_or_else(|| ConfigError::NoLoadBalancerAddress {
            namespace: namespace.to_string(),
            service: service_name.to_string(),
        })
}

/// Resolves configuration for a reconciliation pass.
#[async_trait]
pub trait ConfigResolver: Send + Sync {
    /// Load the controller settings. A missing settings ConfigMap yields the defaults.
    async fn target_config(&self) -> Result<TargetConfig, ConfigError>;

    /// Load the flat settings of the DNS configuration source `source_name`.
    async fn resolve_source(&self, source_name: &str)
        -> Result<BTreeMap<String, String>, ConfigError>;

    /// External address (IP literal or hostname) of a load-balancer service.
    async fn load_balancer_address(
        &self,
        namespace: &str,
        service_name: &str,
    ) -> Result<String, ConfigError>;
}

/// [`ConfigResolver`] reading ConfigMaps, Secrets and Services from the cluster.
#[derive(Clone)]
pub struct KubeConfigResolver {
    client: Client,
    namespace: String,
    config_map_name: String,
}

impl KubeConfigResolver {
    /// Create a resolver reading settings and sources from `namespace`.
    #[must_use]
    pub fn new(
        client: Client,
        namespace: impl Into<String>,
        config_map_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            config_map_name: config_map_name.into(),
        }
    }
}

#[async_trait]
impl ConfigResolver for KubeConfigResolver {
    async fn target_config(&self) -> Result<TargetConfig, ConfigError> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);

        let config_map = api.get_opt(&self.config_map_name).await.map_err(|e| {
            ConfigError::SettingsUnavailable {
                namespace: self.namespace.clone(),
                name: self.config_map_name.clone(),
                reason: e.to_string(),
            }
        })?;

        match config_map {
            Some(config_map) => TargetConfig::from_settings(&config_map.data.unwrap_or_default()),
            None => {
                debug!(
                    namespace = %self.namespace,
                    name = %self.config_map_name,
                    "Settings ConfigMap not found, using defaults"
                );
                Ok(TargetConfig::default())
            }
        }
    }

    async fn resolve_source(
        &self,
        source_name: &str,
    ) -> Result<BTreeMap<String, String>, ConfigError> {
        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        match config_maps.get_opt(source_name).await {
            Ok(Some(config_map)) => return Ok(config_map.data.unwrap_or_default()),
            Ok(None) => {}
            Err(e) => debug!(
                source = source_name,
                error = %e,
                "Failed to read configuration source as ConfigMap, trying Secret"
            ),
        }

        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &self.namespace);
        match secrets.get_opt(source_name).await {
            Ok(Some(secret)) => return Ok(secret_settings(&secret)),
            Ok(None) => {}
            Err(e) => debug!(
                source = source_name,
                error = %e,
                "Failed to read configuration source as Secret"
            ),
        }

        Err(ConfigError::SourceNotFound {
            source_name: source_name.to_string(),
            namespace: self.namespace.clone(),
        })
    }

    async fn load_balancer_address(
        &self,
        namespace: &str,
        service_name: &str,
    ) -> Result<String, ConfigError> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let service = api
            .get(service_name)
            .await
            .map_err(|e| ConfigError::ServiceUnavailable {
                namespace: namespace.to_string(),
                service: service_name.to_string(),
                reason: e.to_string(),
            })?;

        service_address(&service, namespace, service_name)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
