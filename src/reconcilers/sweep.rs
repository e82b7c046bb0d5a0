// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Fail-open sweep over a batch of items.
//!
//! [`sweep`] applies an async action to every item in order. A failing item is
//! logged and recorded, and the sweep moves on; one broken item never stops
//! the rest of the batch from converging.

use std::fmt::Display;
use std::future::Future;
use tracing::warn;

/// Outcome of a sweep.
#[derive(Debug)]
pub struct SweepReport<T, E> {
    /// Items whose action succeeded, in input order
    pub succeeded: Vec<T>,
    /// Items whose action failed, with their error, in input order
    pub failed: Vec<(T, E)>,
}

impl<T: Clone, E> SweepReport<T, E> {
    /// Returns true if every item succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Items whose action failed.
    #[must_use]
    pub fn failed_items(&self) -> Vec<T> {
        self.failed.iter().map(|(item, _)| item.clone()).collect()
    }
}

/// Apply `action` to each item sequentially, collecting failures without aborting.
///
/// `label` names the sweep in log entries (e.g. `"delete removed domains"`).
pub async fn sweep<T, E, F, Fut>(label: &str, items: &[T], mut action: F) -> SweepReport<T, E>
where
    T: Clone + Display,
    E: Display,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let mut report = SweepReport {
        succeeded: Vec::with_capacity(items.len()),
        failed: Vec::new(),
    };

    for item in items {
        match action(item.clone()).await {
            Ok(()) => report.succeeded.push(item.clone()),
            Err(e) => {
                warn!(sweep = label, item = %item, error = %e, "Sweep item failed, continuing");
                report.failed.push((item.clone(), e));
            }
        }
    }

    if !report.is_clean() {
        warn!(
            sweep = label,
            failed = report.failed.len(),
            total = items.len(),
            "Sweep finished with failures"
        );
    }

    report
}

#[cfg(test)]
#[path = "sweep_tests.rs"]
mod sweep_tests;
