// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Finalizer management for watched Ingress objects.
//!
//! The finalizer marker is present exactly while the controller may own live
//! DNS records for the object. It blocks garbage collection until the deletion
//! sweep has run.
//!
//! Both operations are idempotent read-modify-writes run under
//! [`retry_on_conflict`]: each attempt re-reads the object and touches only
//! this one marker in its finalizer list. Writes from other actors on any
//! field cause a full retry, never a partial merge.
//!
//! # Example
//!
//! ```rust,ignore
//! use kube_dns_manager::constants::INGRESS_FINALIZER;
//! use kube_dns_manager::reconcilers::finalizers::{ensure_finalizer, remove_finalizer};
//!
//! async fn reconcile(store: &dyn IngressStore, ingress: &Ingress) -> anyhow::Result<()> {
//!     let (namespace, name) = (ingress.namespace().unwrap_or_default(), ingress.name_any());
//!
//!     if ingress.metadata.deletion_timestamp.is_some() {
//!         // ... clean up external state ...
//!         remove_finalizer(store, &namespace, &name, INGRESS_FINALIZER).await?;
//!         return Ok(());
//!     }
//!
//!     ensure_finalizer(store, &namespace, &name, INGRESS_FINALIZER).await?;
//!     // Normal reconciliation logic...
//!     Ok(())
//! }
//! ```

use super::retry::retry_on_conflict;
use crate::metrics;
use crate::store::IngressStore;
use anyhow::{Context, Result};
use k8s_openapi::api::networking::v1::Ingress;
use tracing::{debug, info};

/// Number of times `finalizer` occurs on `ingress`.
#[must_use]
pub fn finalizer_count(ingress: &Ingress, finalizer: &str) -> usize {
    ingress
        .metadata
        .finalizers
        .as_ref()
        .map_or(0, |finalizers| finalizers.iter().filter(|f| *f == finalizer).count())
}

/// Returns true if `finalizer` is present on `ingress`.
#[must_use]
pub fn has_finalizer(ingress: &Ingress, finalizer: &str) -> bool {
    finalizer_count(ingress, finalizer) > 0
}

/// Add a finalizer to an Ingress if not already present.
///
/// Duplicate occurrences left by concurrent writers are collapsed to one.
/// An object that no longer exists is left alone.
///
/// # Returns
///
/// `true` if a write was made.
///
/// # Errors
///
/// Returns an error if the write fails for a reason other than a conflict,
/// or if conflicts persist after all retries.
pub async fn ensure_finalizer(
    store: &dyn IngressStore,
    namespace: &str,
    name: &str,
    finalizer: &str,
) -> Result<bool> {
    let operation = format!("add finalizer to {namespace}/{name}");

    let changed = retry_on_conflict(&operation, move || async move {
        let Some(mut ingress) = store.get(namespace, name).await? else {
            debug!(namespace, name, "Ingress gone, not adding finalizer");
            return Ok(false);
        };

        if finalizer_count(&ingress, finalizer) == 1 {
            return Ok(false);
        }

        let finalizers = ingress.metadata.finalizers.get_or_insert_with(Vec::new);
        finalizers.retain(|f| f != finalizer);
        finalizers.push(finalizer.to_string());

        store.replace(&ingress).await?;
        Ok(true)
    })
    .await
    .with_context(|| format!("Failed to add finalizer {finalizer} to Ingress {namespace}/{name}"))?;

    if changed {
        metrics::record_finalizer_operation("add");
        info!(namespace, name, finalizer, "Added finalizer");
    }

    Ok(changed)
}

/// Remove every occurrence of a finalizer from an Ingress.
///
/// A missing object or an absent marker is a no-op.
///
/// # Returns
///
/// `true` if a write was made.
///
/// # Errors
///
/// Returns an error if the write fails for a reason other than a conflict,
/// or if conflicts persist after all retries.
pub async fn remove_finalizer(
    store: &dyn IngressStore,
    namespace: &str,
    name: &str,
    finalizer: &str,
) -> Result<bool> {
    let operation = format!("remove finalizer from {namespace}/{name}");

    let changed = retry_on_conflict(&operation, move || async move {
        let Some(mut ingress) = store.get(namespace, name).await? else {
            debug!(namespace, name, "Ingress gone, finalizer already released");
            return Ok(false);
        };

        if !has_finalizer(&ingress, finalizer) {
            return Ok(false);
        }

        if let Some(finalizers) = ingress.metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != finalizer);
        }

        store.replace(&ingress).await?;
        Ok(true)
    })
    .await
    .with_context(|| {
        format!("Failed to remove finalizer {finalizer} from Ingress {namespace}/{name}")
    })?;

    if changed {
        metrics::record_finalizer_operation("remove");
        info!(namespace, name, finalizer, "Removed finalizer");
    }

    Ok(changed)
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
