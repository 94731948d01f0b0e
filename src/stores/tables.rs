use crate::core::error::{StoreError, ACCESS_USER_ROUTE_UNIQUE, USER_EMAIL_UNIQUE};
use crate::models::grant::AccessGrant;
use crate::models::user::User;
use crate::wal::wal::WalOperation;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Inverse of an applied [`WalOperation`], used to roll back a unit of work
#[derive(Debug)]
pub enum Undo {
    /// Only produced when undoing an insert; users are never deleted otherwise
    RemoveUser(u32),
    RestoreUser(User),
    RemoveGrant(u32),
    RestoreGrant(AccessGrant),
}

/// In-memory user and grant tables with their unique indexes.
///
/// Every mutation goes through [`Tables::apply`], which enforces
/// `user.email` and `access(user_id, route)` uniqueness plus the
/// grant → user foreign key.
#[derive(Debug)]
pub struct Tables {
    users: BTreeMap<u32, User>,
    /// lowercased email -> user id
    emails: HashMap<String, u32>,
    grants: BTreeMap<u32, AccessGrant>,
    /// (user id, route) -> grant id
    grant_keys: HashMap<(u32, String), u32>,
    /// user id -> grant ids, ordered by id (insertion order)
    user_grants: HashMap<u32, BTreeSet<u32>>,
    next_user_id: u32,
    next_grant_id: u32,
}

impl Tables {
    pub fn new() -> Self {
        Self {
            users: BTreeMap::new(),
            emails: HashMap::new(),
            grants: BTreeMap::new(),
            grant_keys: HashMap::new(),
            user_grants: HashMap::new(),
            next_user_id: 1,
            next_grant_id: 1,
        }
    }

    pub fn user(&self, id: u32) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn user_by_email(&self, email: &str) -> Option<&User> {
        self.emails
            .get(&email.to_lowercase())
            .and_then(|id| self.users.get(id))
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn grant_count(&self) -> usize {
        self.grants.len()
    }

    pub fn grant(&self, user_id: u32, route: &str) -> Option<&AccessGrant> {
        self.grant_keys
            .get(&(user_id, route.to_string()))
            .and_then(|id| self.grants.get(id))
    }

    pub fn grants_of(&self, user_id: u32) -> Vec<AccessGrant> {
        self.user_grants
            .get(&user_id)
            .map(|ids| ids.iter().filter_map(|id| self.grants.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    pub fn allocate_user_id(&mut self) -> u32 {
        let id = self.next_user_id;
        self.next_user_id += 1;
        id
    }

    pub fn allocate_grant_id(&mut self) -> u32 {
        let id = self.next_grant_id;
        self.next_grant_id += 1;
        id
    }

    /// Apply one row change, returning how to undo it
    pub fn apply(&mut self, op: &WalOperation) -> Result<Undo, StoreError> {
        match op {
            WalOperation::PutUser(user) => {
                let email_key = user.email.to_lowercase();
                if let Some(&owner) = self.emails.get(&email_key) {
                    if owner != user.id {
                        return Err(StoreError::UniqueViolation(USER_EMAIL_UNIQUE));
                    }
                }

                let previous = self.put_user_row(user.clone());
                Ok(match previous {
                    Some(prev) => Undo::RestoreUser(prev),
                    None => Undo::RemoveUser(user.id),
                })
            }
            WalOperation::PutGrant(grant) => {
                if !self.users.contains_key(&grant.user_id) {
                    return Err(StoreError::NotFound {
                        entity: "User",
                        id: grant.user_id,
                    });
                }

                if let Some(&owner) = self.grant_keys.get(&(grant.user_id, grant.route.clone())) {
                    if owner != grant.id {
                        return Err(StoreError::UniqueViolation(ACCESS_USER_ROUTE_UNIQUE));
                    }
                }

                let previous = self.put_grant_row(grant.clone());
                Ok(match previous {
                    Some(prev) => Undo::RestoreGrant(prev),
                    None => Undo::RemoveGrant(grant.id),
                })
            }
            WalOperation::DeleteGrant { id } => match self.remove_grant_row(*id) {
                Some(prev) => Ok(Undo::RestoreGrant(prev)),
                None => Err(StoreError::NotFound {
                    entity: "Access grant",
                    id: *id,
                }),
            },
        }
    }

    /// Undo an earlier [`Tables::apply`]. Undos must be reverted newest first.
    pub fn revert(&mut self, undo: Undo) {
        match undo {
            Undo::RemoveUser(id) => {
                if let Some(user) = self.users.remove(&id) {
                    self.emails.remove(&user.email.to_lowercase());
                }
            }
            Undo::RestoreUser(user) => {
                self.put_user_row(user);
            }
            Undo::RemoveGrant(id) => {
                self.remove_grant_row(id);
            }
            Undo::RestoreGrant(grant) => {
                self.put_grant_row(grant);
            }
        }
    }

    /// Every row as operations, users first so grant foreign keys resolve on replay
    pub fn snapshot(&self) -> Vec<WalOperation> {
        self.users
            .values()
            .cloned()
            .map(WalOperation::PutUser)
            .chain(self.grants.values().cloned().map(WalOperation::PutGrant))
            .collect()
    }

    fn put_user_row(&mut self, user: User) -> Option<User> {
        let id = user.id;
        let email_key = user.email.to_lowercase();
        let previous = self.users.insert(id, user);

        if let Some(prev) = &previous {
            let prev_key = prev.email.to_lowercase();
            if prev_key != email_key {
                self.emails.remove(&prev_key);
            }
        }
        self.emails.insert(email_key, id);
        self.next_user_id = self.next_user_id.max(id.saturating_add(1));

        previous
    }

    fn put_grant_row(&mut self, grant: AccessGrant) -> Option<AccessGrant> {
        let id = grant.id;
        let previous = self.grants.remove(&id);
        if let Some(prev) = &previous {
            self.unindex_grant(prev);
        }

        self.grant_keys.insert((grant.user_id, grant.route.clone()), id);
        self.user_grants.entry(grant.user_id).or_default().insert(id);
        self.grants.insert(id, grant);
        self.next_grant_id = self.next_grant_id.max(id.saturating_add(1));

        previous
    }

    fn remove_grant_row(&mut self, id: u32) -> Option<AccessGrant> {
        let grant = self.grants.remove(&id)?;
        self.unindex_grant(&grant);
        Some(grant)
    }

    fn unindex_grant(&mut self, grant: &AccessGrant) {
        self.grant_keys.remove(&(grant.user_id, grant.route.clone()));
        if let Some(ids) = self.user_grants.get_mut(&grant.user_id) {
            ids.remove(&grant.id);
            if ids.is_empty() {
                self.user_grants.remove(&grant.user_id);
            }
        }
    }
}

impl Default for Tables {
    fn default() -> Self {
        Self::new()
    }
}
