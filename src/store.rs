// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Access to watched Ingress objects.
//!
//! Every write is a full `replace` carrying the `resourceVersion` of the read
//! it was derived from, so a concurrent writer makes the API server answer
//! 409 Conflict instead of silently losing an update. Callers re-read and
//! retry through [`crate::reconcilers::retry::retry_on_conflict`].

use async_trait::async_trait;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::PostParams;
use kube::{Api, Client, ResourceExt};
use thiserror::Error;

/// Errors from reading or writing an Ingress.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// The object does not exist (any more)
    #[error("Ingress {namespace}/{name} not found")]
    NotFound {
        /// Ingress namespace
        namespace: String,
        /// Ingress name
        name: String,
    },

    /// The write lost an optimistic-concurrency race
    #[error("Conflict writing Ingress {namespace}/{name}: {reason}")]
    Conflict {
        /// Ingress namespace
        namespace: String,
        /// Ingress name
        name: String,
        /// Message returned by the API server
        reason: String,
    },

    /// Any other API failure
    #[error("Kubernetes API error for Ingress {namespace}/{name}: {reason}")]
    Api {
        /// Ingress namespace
        namespace: String,
        /// Ingress name
        name: String,
        /// Error description
        reason: String,
    },
}

impl StoreError {
    /// Returns true for optimistic-concurrency conflicts.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Classify a kube-rs error for the given object.
    #[must_use]
    pub fn from_kube(err: &kube::Error, namespace: &str, name: &str) -> Self {
        let namespace = namespace.to_string();
        let name = name.to_string();
        match err {
            kube::Error::Api(response) if response.code == 409 => Self::Conflict {
                namespace,
                name,
                reason: response.message.clone(),
            },
            kube::Error::Api(response) if response.code == 404 => {
                Self::NotFound { namespace, name }
            }
            other => Self::Api {
                namespace,
                name,
                reason: other.to_string(),
            },
        }
    }
}

/// Read and write access to Ingress objects.
#[async_trait]
pub trait IngressStore: Send + Sync {
    /// Fetch an Ingress. A missing object is `Ok(None)`.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Ingress>, StoreError>;

    /// Replace an Ingress, guarded by its `resourceVersion`.
    async fn replace(&self, ingress: &Ingress) -> Result<Ingress, StoreError>;
}

/// [`IngressStore`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeIngressStore {
    client: Client,
}

impl KubeIngressStore {
    /// Create a store using `client`.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IngressStore for KubeIngressStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Ingress>, StoreError> {
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| StoreError::from_kube(&e, namespace, name))
    }

    async fn replace(&self, ingress: &Ingress) -> Result<Ingress, StoreError> {
        let namespace = ingress.namespace().unwrap_or_default();
        let name = ingress.name_any();
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), &namespace);
        api.replace(&name, &PostParams::default(), ingress)
            .await
            .map_err(|e| StoreError::from_kube(&e, &namespace, &name))
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod store_tests;
