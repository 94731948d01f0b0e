use crate::core::error::StoreError;
use crate::models::grant::AccessGrant;
use crate::models::user::{NewUser, User};
use std::collections::BTreeSet;

/// Point lookup used by the route authorizer.
pub trait GrantLookup: Send + Sync {
    fn has_grant(&self, user_id: u32, route: &str) -> Result<bool, StoreError>;
}

/// Outcome of [`GrantStore::upsert_grant`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantUpsert {
    /// A new row was created
    Inserted,
    /// The row already existed; only its updated-by stamp changed
    Touched,
}

/// Grant table operations scoped to a single user's owned collection.
pub trait GrantStore {
    /// All grants of a user in insertion order
    fn grants_for_user(&self, user_id: u32) -> Result<Vec<AccessGrant>, StoreError>;

    /// Delete the user's grants whose route is in `routes`. Returns the number removed.
    fn delete_grants(&mut self, user_id: u32, routes: &BTreeSet<String>) -> Result<usize, StoreError>;

    /// Insert a grant keyed by `(user_id, route)` or stamp the existing one
    fn upsert_grant(&mut self, user_id: u32, route: &str, actor: &str) -> Result<GrantUpsert, StoreError>;
}

/// Write-side user operations used inside a unit of work.
///
/// Lookups by email and filtered listings are served from a read snapshot
/// of the tables instead.
pub trait UserStore {
    fn find_user(&self, id: u32) -> Result<Option<User>, StoreError>;

    /// Fails with a unique violation when the email is already registered
    fn insert_user(&mut self, new: NewUser) -> Result<User, StoreError>;

    /// Replace the stored row with `user`
    fn update_user(&mut self, user: &User) -> Result<(), StoreError>;
}
