// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the kube-dns-manager controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Ingress Annotation Constants
// ============================================================================

/// Annotation selecting the DNS backend (`cloudflare` or `bind`)
pub const DNS_TYPE_ANNOTATION: &str = "dns.configuration/type";

/// Annotation naming the ConfigMap or Secret holding provider credentials
pub const DNS_SOURCE_ANNOTATION: &str = "dns.configuration/source";

/// Annotation recording the comma-separated domains synced by the last pass
pub const PREVIOUS_DOMAINS_ANNOTATION: &str = "dns.configuration/previous-domains";

/// Separator used inside the previous-domains annotation
pub const PREVIOUS_DOMAINS_SEPARATOR: char = ',';

/// Finalizer guarding DNS cleanup for a deleted Ingress
pub const INGRESS_FINALIZER: &str = "kube-dns-manager.io/dns-cleanup";

/// Kind label used in logs and metrics
pub const KIND_INGRESS: &str = "Ingress";

// ============================================================================
// DNS Record Constants
// ============================================================================

/// Content of the TXT record marking a hostname as managed by this controller
pub const OWNERSHIP_TXT_VALUE: &str = "kube-dns-manager";

/// Cloudflare TTL value meaning "automatic"
pub const CLOUDFLARE_AUTO_TTL: u32 = 1;

/// Default TTL for records written to BIND (1 hour)
pub const DEFAULT_BIND_RECORD_TTL_SECS: u32 = 3600;

/// Standard DNS port for queries and dynamic updates
pub const DNS_PORT: u16 = 53;

/// TSIG fudge time in seconds (allows for clock skew)
pub const TSIG_FUDGE_TIME_SECS: u64 = 300;

/// Default TSIG algorithm when the configuration source does not name one
pub const DEFAULT_TSIG_ALGORITHM: &str = "hmac-sha512";

/// Default Cloudflare v4 API base URL
pub const DEFAULT_CLOUDFLARE_API_URL: &str = "https://api.cloudflare.com/client/v4";

// ============================================================================
// Controller Settings Constants
// ============================================================================

/// Default name of the controller settings ConfigMap
pub const DEFAULT_CONFIG_MAP_NAME: &str = "kube-dns-manager";

/// Default namespace of the controller settings ConfigMap and DNS sources
pub const DEFAULT_CONFIG_MAP_NAMESPACE: &str = "kube-dns-manager";

/// Settings key naming the load-balancer service
pub const SETTINGS_SERVICE_NAME_KEY: &str = "traefikServiceName";

/// Settings key naming the load-balancer service namespace
pub const SETTINGS_SERVICE_NAMESPACE_KEY: &str = "traefikNamespace";

/// Settings key holding the YAML list of excluded domains
pub const SETTINGS_EXCLUDE_DOMAINS_KEY: &str = "excludedomains";

/// Load-balancer service used when the settings do not name one
pub const DEFAULT_LB_SERVICE_NAME: &str = "traefik";

/// Load-balancer namespace used when the settings do not name one
pub const DEFAULT_LB_SERVICE_NAMESPACE: &str = "kube-system";

// ============================================================================
// Controller Error Handling Constants
// ============================================================================

/// Requeue duration for controller errors (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Requeue duration after a successful pass (5 minutes)
pub const SUCCESS_REQUEUE_DURATION_SECS: u64 = 300;

/// Attempts made by a read-modify-write before giving up on conflicts
pub const CONFLICT_RETRY_ATTEMPTS: u32 = 5;

/// Delay between conflicting read-modify-write attempts (10ms)
pub const CONFLICT_RETRY_INTERVAL_MILLIS: u64 = 10;

/// Attempts made for one Cloudflare API call before the failure is returned
/// and left to the next pass
pub const HTTP_RETRY_ATTEMPTS: u32 = 3;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Bind address for metrics HTTP server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Path for the liveness probe endpoint
pub const HEALTH_SERVER_PATH: &str = "/healthz";
