// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the Ingress controller.
//!
//! Every reconciliation pass receives an `Arc<Context>` holding the three
//! collaborators it talks to:
//! - the Ingress store (reads and conflict-guarded writes)
//! - the configuration resolver (settings, DNS sources, load-balancer address)
//! - the provider factory (builds a DNS backend from a resolved source)
//!
//! Nothing in the context caches configuration; every pass resolves it fresh.

use crate::config::{ConfigResolver, KubeConfigResolver};
use crate::providers::{BackendFactory, ProviderFactory};
use crate::store::{IngressStore, KubeIngressStore};
use kube::Client;
use std::sync::Arc;

/// Shared context passed to every reconciliation.
#[derive(Clone)]
pub struct Context {
    /// Ingress reads and writes
    pub store: Arc<dyn IngressStore>,

    /// Configuration resolution
    pub config: Arc<dyn ConfigResolver>,

    /// DNS backend construction
    pub providers: Arc<dyn ProviderFactory>,
}

impl Context {
    /// Assemble a context from its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn IngressStore>,
        config: Arc<dyn ConfigResolver>,
        providers: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            store,
            config,
            providers,
        }
    }

    /// Build the production context backed by the Kubernetes API.
    ///
    /// # Arguments
    ///
    /// * `client` - Kubernetes client
    /// * `http_client` - HTTP client shared by Cloudflare providers
    /// * `settings` - Where the controller settings and DNS sources live
    #[must_use]
    pub fn from_client(client: Client, http_client: reqwest::Client, settings: &Settings) -> Self {
        Self::new(
            Arc::new(KubeIngressStore::new(client.clone())),
            Arc::new(KubeConfigResolver::new(
                client,
                settings.config_map_namespace.clone(),
                settings.config_map_name.clone(),
            )),
            Arc::new(BackendFactory::new(
                http_client,
                settings.cloudflare_api_url.clone(),
            )),
        )
    }
}

/// Process-wide settings taken from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Name of the controller settings ConfigMap
    pub config_map_name: String,
    /// Namespace of the settings ConfigMap and of every DNS configuration source
    pub config_map_namespace: String,
    /// Base URL of the Cloudflare v4 API
    pub cloudflare_api_url: String,
}
