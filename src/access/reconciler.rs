use crate::core::error::{StoreError, ACCESS_USER_ROUTE_UNIQUE};
use crate::models::grant::normalize_route;
use crate::stores::store::{GrantStore, GrantUpsert};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

/// Difference between a user's stored routes and the routes they should have.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AccessDiff {
    /// Stored routes absent from the desired set
    pub to_delete: BTreeSet<String>,
    /// Desired routes with no stored grant, in desired order
    pub to_insert: Vec<String>,
    /// Desired routes that are already stored, in desired order
    pub to_keep: Vec<String>,
}

impl AccessDiff {
    pub fn is_noop(&self) -> bool {
        self.to_delete.is_empty() && self.to_insert.is_empty()
    }
}

/// Normalize desired routes, keeping first occurrences in their original order
pub fn normalize_desired(desired: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(desired.len());
    desired
        .iter()
        .map(|route| normalize_route(route))
        .filter(|route| seen.insert(*route))
        .map(str::to_string)
        .collect()
}

/// Compute which grants to delete, insert and keep.
///
/// Pure: no storage involved. An empty `desired` set deletes everything.
pub fn reconcile<'a>(current: impl IntoIterator<Item = &'a str>, desired: &[String]) -> AccessDiff {
    let current: BTreeSet<&str> = current.into_iter().collect();
    let desired = normalize_desired(desired);
    let wanted: HashSet<&str> = desired.iter().map(String::as_str).collect();

    let to_delete = current
        .iter()
        .filter(|route| !wanted.contains(*route))
        .map(|route| route.to_string())
        .collect();

    let (to_keep, to_insert): (Vec<String>, Vec<String>) = desired
        .into_iter()
        .partition(|route| current.contains(route.as_str()));

    AccessDiff {
        to_delete,
        to_insert,
        to_keep,
    }
}

/// What a reconciliation changed in storage
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub deleted: usize,
    pub inserted: usize,
    pub touched: usize,
}

/// Applies a desired route set to a user's grants through a [`GrantStore`].
///
/// Deletes run before upserts, so a route present in both sets is never
/// removed and recreated.
pub struct AccessReconciler<'s, S: GrantStore + ?Sized> {
    store: &'s mut S,
}

impl<'s, S: GrantStore + ?Sized> AccessReconciler<'s, S> {
    pub fn new(store: &'s mut S) -> Self {
        Self { store }
    }

    pub fn reconcile(
        &mut self,
        user_id: u32,
        desired: &[String],
        actor: &str,
    ) -> Result<ReconcileReport, StoreError> {
        let current = self.store.grants_for_user(user_id)?;
        let diff = reconcile(current.iter().map(|g| g.route.as_str()), desired);

        let mut report = ReconcileReport::default();

        if !diff.to_delete.is_empty() {
            report.deleted = self.store.delete_grants(user_id, &diff.to_delete)?;
        }

        // Kept routes are only stamped; new ones are appended in desired order
        for route in diff.to_keep.iter().chain(&diff.to_insert) {
            match self.store.upsert_grant(user_id, route, actor)? {
                GrantUpsert::Inserted => report.inserted += 1,
                GrantUpsert::Touched => report.touched += 1,
            }
        }

        debug!(
            user_id,
            deleted = report.deleted,
            inserted = report.inserted,
            touched = report.touched,
            "Access reconciled"
        );

        Ok(report)
    }
}

/// Run `op`, running it once more if it hit the `(user_id, route)` unique
/// constraint. A second violation is returned to the caller.
pub fn with_conflict_retry<T>(mut op: impl FnMut() -> Result<T, StoreError>) -> Result<T, StoreError> {
    match op() {
        Err(StoreError::UniqueViolation(ACCESS_USER_ROUTE_UNIQUE)) => {
            warn!("Concurrent grant modification detected, retrying once");
            op()
        }
        other => other,
    }
}
