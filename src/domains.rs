// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Hostname extraction and domain set arithmetic.
//!
//! Everything in this module is pure: no I/O, no failure modes. The reconciler
//! uses these helpers to turn an Ingress plus its previous-domains annotation
//! into the domain delta for one pass.
//!
//! # Example
//!
//! ```rust
//! use kube_dns_manager::domains::{difference, format_previous_domains, parse_previous_domains};
//!
//! let previous = parse_previous_domains(Some("a.example.com,b.example.com"));
//! let current = vec!["a.example.com".to_string()];
//!
//! assert_eq!(difference(&previous, &current), vec!["b.example.com".to_string()]);
//! assert_eq!(format_previous_domains(&current), "a.example.com");
//! ```

use crate::constants::{PREVIOUS_DOMAINS_ANNOTATION, PREVIOUS_DOMAINS_SEPARATOR};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use std::collections::HashSet;

/// Extract the hostnames declared by an Ingress's routing rules.
///
/// Rule order is preserved and duplicates are kept; callers deduplicate where
/// they need to. Rules without a host (catch-all rules) carry no hostname and
/// are skipped.
#[must_use]
pub fn extract_domains(ingress: &Ingress) -> Vec<String> {
    ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.rules.as_ref())
        .map(|rules| {
            rules
                .iter()
                .filter_map(|rule| rule.host.clone())
                .filter(|host| !host.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Elements of `left` that do not appear in `right`, by exact string equality.
///
/// The relative order of `left` is preserved. Duplicates in `left` survive
/// unless they also appear in `right`.
#[must_use]
pub fn difference(left: &[String], right: &[String]) -> Vec<String> {
    let exclude: HashSet<&str> = right.iter().map(String::as_str).collect();
    left.iter()
        .filter(|item| !exclude.contains(item.as_str()))
        .cloned()
        .collect()
}

/// Drop duplicates, keeping the first occurrence of each element.
#[must_use]
pub fn unique(items: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| seen.insert(item.as_str()))
        .cloned()
        .collect()
}

/// Decode the previous-domains annotation value.
///
/// An absent annotation means "no domains". Empty segments (e.g. from an empty
/// annotation value or a trailing comma) are ignored.
#[must_use]
pub fn parse_previous_domains(value: Option<&str>) -> Vec<String> {
    value
        .map(|raw| {
            raw.split(PREVIOUS_DOMAINS_SEPARATOR)
                .map(str::trim)
                .filter(|domain| !domain.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Encode a domain list as the previous-domains annotation value.
#[must_use]
pub fn format_previous_domains(domains: &[String]) -> String {
    domains.join(&PREVIOUS_DOMAINS_SEPARATOR.to_string())
}

/// Read the previous-domains annotation from an Ingress.
#[must_use]
pub fn previous_domains(ingress: &Ingress) -> Vec<String> {
    parse_previous_domains(
        ingress
            .annotations()
            .get(PREVIOUS_DOMAINS_ANNOTATION)
            .map(String::as_str),
    )
}

#[cfg(test)]
#[path = "domains_tests.rs"]
mod domains_tests;
