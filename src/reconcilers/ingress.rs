// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Ingress reconciliation.
//!
//! One pass takes the identity of an Ingress, reads everything fresh and
//! drives DNS towards the hostnames the Ingress declares:
//!
//! ```text
//! load Ingress ── missing ──────────────────────────────► done
//!      │
//! load settings (load-balancer service, excluded domains)
//!      │
//!      ├─ deleting ── finalizer absent ─────────────────► done
//!      │      └─ delete A + TXT for every owned domain (fail-open)
//!      │         └─ remove finalizer ───────────────────► done
//!      │
//!      └─ live ── ensure finalizer
//!             ├─ not opted in / unknown type / no domains ► done
//!             ├─ delete A + TXT for removed domains (fail-open)
//!             ├─ create or update A + TXT for current domains (fail-open)
//!             └─ persist previous-domains annotation ───► done
//! ```
//!
//! Per-domain DNS failures never fail the pass; they are logged and retried
//! on the next trigger. Configuration failures and exhausted write conflicts
//! fail the pass before (or after, for the final write) any DNS mutation, and
//! the controller re-triggers it.

use super::finalizers::{ensure_finalizer, has_finalizer, remove_finalizer};
use super::retry::retry_on_conflict;
use super::sweep::{sweep, SweepReport};
use crate::config::TargetConfig;
use crate::constants::{
    DNS_SOURCE_ANNOTATION, DNS_TYPE_ANNOTATION, INGRESS_FINALIZER, KIND_INGRESS,
    OWNERSHIP_TXT_VALUE, PREVIOUS_DOMAINS_ANNOTATION,
};
use crate::context::Context;
use crate::dns_errors::{ConfigError, ProviderError};
use crate::domains::{
    difference, extract_domains, format_previous_domains, previous_domains, unique,
};
use crate::metrics;
use crate::providers::{DnsProvider, ProviderKind, RecordType};
use crate::store::{IngressStore, StoreError};
use anyhow::{Context as _, Result};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Record types owned for every managed domain.
const MANAGED_RECORD_TYPES: [RecordType; 2] = [RecordType::A, RecordType::Txt];

/// What a reconciliation pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The Ingress no longer exists
    NotFound,
    /// The Ingress is being deleted and no cleanup is owed
    CleanupNotOwed,
    /// Deletion cleanup ran and the finalizer was released
    Deleted {
        /// Domains whose records were removed
        swept: Vec<String>,
        /// Domains whose removal failed (left behind)
        failed: Vec<String>,
    },
    /// The Ingress lacks the type or source annotation
    NotOptedIn,
    /// The type annotation names no known backend
    UnknownProviderType(String),
    /// Every declared domain is excluded (or none is declared)
    NothingToManage,
    /// DNS was synchronized and the previous-domains annotation persisted
    Synced {
        /// Domains synchronized this pass
        current: Vec<String>,
        /// Domains no longer declared whose records were removed
        removed: Vec<String>,
        /// Domains whose synchronization or removal failed this pass
        failed: Vec<String>,
    },
}

/// Failure of one or more record operations for a single domain.
#[derive(Debug, Error)]
#[error("{}", describe_failures(.failures))]
pub struct DomainError {
    /// Failed record types with their errors
    pub failures: Vec<(RecordType, ProviderError)>,
}

fn describe_failures(failures: &[(RecordType, ProviderError)]) -> String {
    failures
        .iter()
        .map(|(record_type, e)| format!("{record_type}: {e}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Opt-in annotations of an Ingress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsSelection {
    /// Value of the type annotation
    pub provider_type: String,
    /// Name of the DNS configuration source
    pub source: String,
}

/// Read the type and source annotations. `None` means the Ingress is not opted in.
#[must_use]
pub fn dns_selection(ingress: &Ingress) -> Option<DnsSelection> {
    let annotations = ingress.annotations();
    let non_empty = |key: &str| {
        annotations
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
    };

    Some(DnsSelection {
        provider_type: non_empty(DNS_TYPE_ANNOTATION)?,
        source: non_empty(DNS_SOURCE_ANNOTATION)?,
    })
}

/// Declared hostnames minus excluded domains, deduplicated.
#[must_use]
pub fn current_domains(ingress: &Ingress, target: &TargetConfig) -> Vec<String> {
    unique(&difference(&extract_domains(ingress), &target.exclude_domains))
}

/// Reconcile one Ingress.
///
/// # Errors
///
/// Returns an error if configuration cannot be resolved, or if a finalizer or
/// annotation write fails. Per-domain DNS failures are not errors.
pub async fn reconcile_ingress(
    ctx: &Context,
    namespace: &str,
    name: &str,
) -> Result<ReconcileOutcome> {
    let Some(ingress) = ctx
        .store
        .get(namespace, name)
        .await
        .with_context(|| format!("Failed to load Ingress {namespace}/{name}"))?
    else {
        debug!(namespace, name, "Ingress not found, nothing to do");
        return Ok(ReconcileOutcome::NotFound);
    };

    let target = ctx
        .config
        .target_config()
        .await
        .context("Failed to load controller settings")?;

    if ingress.metadata.deletion_timestamp.is_some() {
        return cleanup_ingress(ctx, &ingress, namespace, name, &target).await;
    }

    sync_ingress(ctx, &ingress, namespace, name, &target).await
}

/// Deletion phase: remove every owned record, then release the finalizer.
async fn cleanup_ingress(
    ctx: &Context,
    ingress: &Ingress,
    namespace: &str,
    name: &str,
    target: &TargetConfig,
) -> Result<ReconcileOutcome> {
    if !has_finalizer(ingress, INGRESS_FINALIZER) {
        debug!(namespace, name, "Ingress deleting without finalizer, no cleanup owed");
        return Ok(ReconcileOutcome::CleanupNotOwed);
    }

    let owned = difference(
        &unique(&[extract_domains(ingress), previous_domains(ingress)].concat()),
        &target.exclude_domains,
    );

    let (swept, failed) = match dns_selection(ingress) {
        Some(selection) if !owned.is_empty() => {
            match ProviderKind::from_annotation(&selection.provider_type) {
                Some(kind) => {
                    let provider = build_provider(ctx, kind, &selection.source).await?;
                    info!(
                        namespace,
                        name,
                        provider = provider.provider_name(),
                        domains = ?owned,
                        "Removing DNS records of deleted Ingress"
                    );
                    let report = delete_domains(provider.as_ref(), &owned).await;
                    let failed = report.failed_items();
                    (report.succeeded, failed)
                }
                None => {
                    warn!(
                        namespace,
                        name,
                        provider_type = %selection.provider_type,
                        "Unknown DNS provider type, skipping DNS cleanup"
                    );
                    (Vec::new(), Vec::new())
                }
            }
        }
        _ => (Vec::new(), Vec::new()),
    };

    remove_finalizer(ctx.store.as_ref(), namespace, name, INGRESS_FINALIZER).await?;

    info!(
        namespace,
        name,
        swept = swept.len(),
        failed = failed.len(),
        "Ingress cleanup complete"
    );
    Ok(ReconcileOutcome::Deleted { swept, failed })
}

/// Normal phase: converge DNS to the declared domains and persist them.
async fn sync_ingress(
    ctx: &Context,
    ingress: &Ingress,
    namespace: &str,
    name: &str,
    target: &TargetConfig,
) -> Result<ReconcileOutcome> {
    ensure_finalizer(ctx.store.as_ref(), namespace, name, INGRESS_FINALIZER).await?;

    let Some(selection) = dns_selection(ingress) else {
        debug!(namespace, name, "Ingress not opted in to DNS management");
        return Ok(ReconcileOutcome::NotOptedIn);
    };

    let Some(kind) = ProviderKind::from_annotation(&selection.provider_type) else {
        warn!(
            namespace,
            name,
            provider_type = %selection.provider_type,
            "Unknown DNS provider type, skipping"
        );
        return Ok(ReconcileOutcome::UnknownProviderType(selection.provider_type));
    };

    let current = current_domains(ingress, target);
    if current.is_empty() {
        debug!(namespace, name, "No managed domains after exclusions, skipping");
        return Ok(ReconcileOutcome::NothingToManage);
    }

    let address = ctx
        .config
        .load_balancer_address(&target.service_namespace, &target.service_name)
        .await
        .context("Failed to resolve load-balancer address")?;

    let provider = build_provider(ctx, kind, &selection.source).await?;

    let previous = unique(&previous_domains(ingress));
    let removed = difference(&difference(&previous, &current), &target.exclude_domains);

    info!(
        namespace,
        name,
        provider = provider.provider_name(),
        address = %address,
        current = ?current,
        removed = ?removed,
        "Synchronizing DNS records"
    );

    let removal = delete_domains(provider.as_ref(), &removed).await;
    let sync = sync_domains(provider.as_ref(), &current, &address).await;

    // Failed removals stay recorded so the next pass retries them
    let failed_removals = removal.failed_items();
    let recorded = [current.clone(), failed_removals.clone()].concat();
    persist_previous_domains(
        ctx.store.as_ref(),
        namespace,
        name,
        &format_previous_domains(&recorded),
    )
    .await?;

    let failed = [failed_removals, sync.failed_items()].concat();
    if failed.is_empty() {
        info!(namespace, name, domains = current.len(), "DNS records in sync");
    } else {
        warn!(
            namespace,
            name,
            failed = ?failed,
            "Some domains failed to synchronize, will retry on next reconciliation"
        );
    }

    Ok(ReconcileOutcome::Synced {
        current,
        removed: removal.succeeded,
        failed,
    })
}

/// Resolve the configuration source and build its backend.
async fn build_provider(
    ctx: &Context,
    kind: ProviderKind,
    source: &str,
) -> Result<Arc<dyn DnsProvider>> {
    let settings = ctx
        .config
        .resolve_source(source)
        .await
        .with_context(|| format!("Failed to resolve DNS configuration source {source}"))?;

    ctx.providers
        .build(kind, source, &settings)
        .with_context(|| format!("Invalid {} configuration in source {source}", kind.as_str()))
}

/// Delete the A and TXT records of each domain, fail-open.
pub async fn delete_domains(
    provider: &dyn DnsProvider,
    domains: &[String],
) -> SweepReport<String, DomainError> {
    sweep("delete domains", domains, move |domain: String| async move {
        delete_domain(provider, &domain).await
    })
    .await
}

/// Create or update the A and TXT records of each domain, fail-open.
pub async fn sync_domains(
    provider: &dyn DnsProvider,
    domains: &[String],
    address: &str,
) -> SweepReport<String, DomainError> {
    sweep("sync domains", domains, move |domain: String| async move {
        sync_domain(provider, &domain, address).await
    })
    .await
}

/// Delete both owned records of one domain. A missing record is success.
///
/// # Errors
///
/// Returns the record types whose lookup or delete failed.
pub async fn delete_domain(provider: &dyn DnsProvider, domain: &str) -> Result<(), DomainError> {
    let mut failures = Vec::new();

    for record_type in MANAGED_RECORD_TYPES {
        if let Err(e) = delete_record(provider, domain, record_type).await {
            failures.push((record_type, e));
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(DomainError { failures })
    }
}

/// Bring both owned records of one domain to their desired content.
///
/// # Errors
///
/// Returns the record types whose lookup, create or update failed.
pub async fn sync_domain(
    provider: &dyn DnsProvider,
    domain: &str,
    address: &str,
) -> Result<(), DomainError> {
    let mut failures = Vec::new();

    for (record_type, content) in [
        (RecordType::A, address),
        (RecordType::Txt, OWNERSHIP_TXT_VALUE),
    ] {
        if let Err(e) = sync_record(provider, domain, record_type, content).await {
            failures.push((record_type, e));
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(DomainError { failures })
    }
}

/// Content a lookup must match for a record to count as ours.
///
/// A name may carry TXT records written by others (site verification, SPF);
/// only the ownership marker is ever updated or deleted.
fn owned_content(record_type: RecordType) -> Option<&'static str> {
    match record_type {
        RecordType::A => None,
        RecordType::Txt => Some(OWNERSHIP_TXT_VALUE),
    }
}

async fn delete_record(
    provider: &dyn DnsProvider,
    domain: &str,
    record_type: RecordType,
) -> Result<(), ProviderError> {
    let result = try_delete_record(provider, domain, record_type).await;
    record_provider_error(&result);
    result
}

async fn try_delete_record(
    provider: &dyn DnsProvider,
    domain: &str,
    record_type: RecordType,
) -> Result<(), ProviderError> {
    let Some(existing) = provider
        .lookup(domain, record_type, owned_content(record_type))
        .await?
    else {
        debug!(domain, record_type = %record_type, "Record already absent");
        return Ok(());
    };

    let result = provider.delete(&existing).await;
    metrics::record_dns_operation(provider.provider_name(), "delete", result.is_ok());
    result
}

async fn sync_record(
    provider: &dyn DnsProvider,
    domain: &str,
    record_type: RecordType,
    content: &str,
) -> Result<(), ProviderError> {
    let result = try_sync_record(provider, domain, record_type, content).await;
    record_provider_error(&result);
    result
}

async fn try_sync_record(
    provider: &dyn DnsProvider,
    domain: &str,
    record_type: RecordType,
    content: &str,
) -> Result<(), ProviderError> {
    let (operation, result) = match provider
        .lookup(domain, record_type, owned_content(record_type))
        .await?
    {
        Some(existing) if existing.content == content => {
            debug!(domain, record_type = %record_type, "Record already up to date");
            return Ok(());
        }
        Some(existing) => ("update", provider.update(&existing, content).await),
        None => ("create", provider.create(domain, record_type, content).await),
    };

    metrics::record_dns_operation(provider.provider_name(), operation, result.is_ok());
    result
}

/// Count a failed record operation under its provider error reason.
fn record_provider_error(result: &Result<(), ProviderError>) {
    if let Err(e) = result {
        metrics::record_error(KIND_INGRESS, e.reason());
    }
}

/// Write the previous-domains annotation, re-reading the Ingress on every attempt.
///
/// Only this one annotation is touched; everything else comes from the
/// freshest copy of the object.
async fn persist_previous_domains(
    store: &dyn IngressStore,
    namespace: &str,
    name: &str,
    value: &str,
) -> Result<bool> {
    let operation = format!("record previous domains on {namespace}/{name}");

    let written = retry_on_conflict(&operation, move || async move {
        let Some(mut ingress) = store.get(namespace, name).await? else {
            return Ok(false);
        };

        if ingress
            .annotations()
            .get(PREVIOUS_DOMAINS_ANNOTATION)
            .is_some_and(|existing| existing == value)
        {
            return Ok(false);
        }

        ingress
            .annotations_mut()
            .insert(PREVIOUS_DOMAINS_ANNOTATION.to_string(), value.to_string());
        store.replace(&ingress).await?;
        Ok(true)
    })
    .await
    .with_context(|| format!("Failed to persist previous domains on Ingress {namespace}/{name}"))?;

    if written {
        debug!(namespace, name, previous_domains = value, "Recorded previous domains");
    }
    Ok(written)
}

/// Short reason for a failed pass, used as a metrics label.
#[must_use]
pub fn error_reason(err: &anyhow::Error) -> &'static str {
    if let Some(config) = err.downcast_ref::<ConfigError>() {
        return config.reason();
    }
    match err.downcast_ref::<StoreError>() {
        Some(StoreError::Conflict { .. }) => "ConflictRetriesExhausted",
        Some(_) => "IngressStoreError",
        None => "ReconcileError",
    }
}

#[cfg(test)]
#[path = "ingress_tests.rs"]
mod ingress_tests;
