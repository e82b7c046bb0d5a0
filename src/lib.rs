// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # kube-dns-manager - Ingress DNS controller for Kubernetes
//!
//! kube-dns-manager watches `networking.k8s.io/v1` Ingress objects and keeps
//! the hostnames they declare in sync with an external DNS zone, hosted either
//! on Cloudflare or on a BIND server accepting dynamic updates.
//!
//! ## Overview
//!
//! An Ingress opts in through two annotations:
//!
//! - `dns.configuration/type` - `cloudflare` or `bind`
//! - `dns.configuration/source` - name of a ConfigMap or Secret holding the
//!   zone credentials
//!
//! For every declared host the controller maintains an A record pointing at the
//! cluster load balancer and a TXT ownership record. Hosts dropped from the
//! Ingress are cleaned up using the `dns.configuration/previous-domains`
//! annotation, and a finalizer guarantees every record is removed before the
//! Ingress is deleted.
//!
//! ## Modules
//!
//! - [`reconcilers`] - Reconciliation logic, finalizers and retry combinators
//! - [`providers`] - DNS provider interface with Cloudflare and BIND backends
//! - [`config`] - Controller settings, DNS sources and load-balancer address
//! - [`domains`] - Hostname extraction and set difference
//! - [`store`] - Ingress reads and conflict-aware writes
//! - [`context`] - Shared context passed to every reconciliation
//!
//! ## Example
//!
//! ```rust,no_run
//! use kube_dns_manager::domains::{difference, format_previous_domains};
//!
//! let previous = vec!["a.example.com".to_string(), "b.example.com".to_string()];
//! let current = vec!["a.example.com".to_string()];
//!
//! assert_eq!(difference(&previous, &current), vec!["b.example.com".to_string()]);
//! assert_eq!(format_previous_domains(&current), "a.example.com");
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod dns_errors;
pub mod domains;
pub mod metrics;
pub mod providers;
pub mod reconcilers;
pub mod store;
