// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes reconciliation logic for Ingress DNS records.
//!
//! # Reconciliation Architecture
//!
//! The controller follows the standard level-triggered pattern:
//!
//! 1. **Watch** - Ingress changes arrive from the Kubernetes API
//! 2. **Reconcile** - Compare declared hostnames with the recorded previous domains
//! 3. **Update** - Create, update or delete A and TXT records through a DNS provider
//! 4. **Record** - Persist the managed domains back onto the Ingress
//!
//! # Modules
//!
//! - [`ingress`] - The Ingress reconciler ([`reconcile_ingress`])
//! - [`finalizers`] - Finalizer add/remove under optimistic concurrency
//! - [`retry`] - Conflict retry combinator and HTTP backoff
//! - [`sweep`] - Fail-open iteration over a batch of domains
//!
//! # Example: Using the Reconciler
//!
//! ```rust,no_run
//! use kube_dns_manager::context::Context;
//! use kube_dns_manager::reconcilers::reconcile_ingress;
//! use std::sync::Arc;
//!
//! async fn reconcile(ctx: Arc<Context>) -> anyhow::Result<()> {
//!     reconcile_ingress(&ctx, "default", "web").await?;
//!     Ok(())
//! }
//! ```

pub mod finalizers;
pub mod ingress;
pub mod retry;
pub mod sweep;

#[cfg(test)]
pub(crate) mod test_fakes;

pub use ingress::{reconcile_ingress, ReconcileOutcome};
