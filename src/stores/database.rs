use crate::core::error::StoreError;
use crate::models::grant::AccessGrant;
use crate::models::user::{NewUser, User};
use crate::stores::store::{GrantLookup, GrantStore, GrantUpsert, UserStore};
use crate::stores::tables::{Tables, Undo};
use crate::wal::wal::{Wal, WalOperation};
use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Shared user and grant storage.
///
/// Reads take the read lock. A unit of work holds the write lock for its whole
/// duration, so units of work are serializable; each one is journaled to the
/// WAL as a single batch on commit.
pub struct Database {
    tables: RwLock<Tables>,
    wal: Option<Arc<Wal>>,
}

impl Database {
    /// Storage without a WAL; contents are lost on exit
    pub fn in_memory() -> Self {
        Self {
            tables: RwLock::new(Tables::new()),
            wal: None,
        }
    }

    /// Rebuild the tables from every committed WAL batch
    pub fn open(wal: Arc<Wal>) -> Result<Self> {
        let operations = wal.replay().context("Failed to replay WAL")?;
        let mut tables = Tables::new();
        let mut skipped = 0usize;

        for op in &operations {
            if let Err(e) = tables.apply(op) {
                skipped += 1;
                warn!(error = %e, "Skipping WAL operation that no longer applies");
            }
        }

        debug!(
            operations = operations.len(),
            skipped,
            users = tables.user_count(),
            grants = tables.grant_count(),
            "WAL replayed"
        );

        Ok(Self {
            tables: RwLock::new(tables),
            wal: Some(wal),
        })
    }

    /// Run `f` against a consistent view of the tables
    pub fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        f(&self.tables.read())
    }

    /// Run `f` as one atomic unit of work.
    ///
    /// If `f` fails, or its changes cannot be written to the WAL, every change
    /// it made is rolled back and nothing is logged.
    pub fn transaction<R, E>(
        &self,
        now: i64,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let mut tables = self.tables.write();
        let mut tx = Transaction {
            tables: &mut *tables,
            journal: Vec::new(),
            undo: Vec::new(),
            now,
        };

        let value = match f(&mut tx) {
            Ok(value) => value,
            Err(e) => {
                tx.rollback();
                return Err(e);
            }
        };

        if let Some(wal) = &self.wal {
            if let Err(e) = wal.log_batch(&tx.journal) {
                error!(error = %e, operations = tx.journal.len(), "WAL write failed, rolling back");
                tx.rollback();
                return Err(StoreError::Unavailable("write-ahead log is not writable".to_string()).into());
            }
        }

        Ok(value)
    }

    /// Rewrite the WAL as a snapshot of the current rows
    pub fn compact(&self) -> Result<()> {
        let Some(wal) = &self.wal else {
            return Ok(());
        };

        // Hold the write lock so no commit lands between snapshot and rename
        let tables = self.tables.write();
        wal.compact(&tables.snapshot())
    }

    pub fn user_count(&self) -> usize {
        self.tables.read().user_count()
    }

    pub fn grant_count(&self) -> usize {
        self.tables.read().grant_count()
    }
}

impl GrantLookup for Database {
    fn has_grant(&self, user_id: u32, route: &str) -> Result<bool, StoreError> {
        Ok(self.tables.read().grant(user_id, route).is_some())
    }
}

/// Mutable access to the tables inside [`Database::transaction`].
pub struct Transaction<'a> {
    tables: &'a mut Tables,
    journal: Vec<WalOperation>,
    undo: Vec<Undo>,
    now: i64,
}

impl Transaction<'_> {
    /// Timestamp stamped on every row written by this unit of work
    pub fn now(&self) -> i64 {
        self.now
    }

    fn write(&mut self, op: WalOperation) -> Result<(), StoreError> {
        let undo = self.tables.apply(&op)?;
        self.undo.push(undo);
        self.journal.push(op);
        Ok(())
    }

    fn rollback(&mut self) {
        while let Some(undo) = self.undo.pop() {
            self.tables.revert(undo);
        }
        self.journal.clear();
    }
}

impl UserStore for Transaction<'_> {
    fn find_user(&self, id: u32) -> Result<Option<User>, StoreError> {
        Ok(self.tables.user(id).cloned())
    }

    fn insert_user(&mut self, new: NewUser) -> Result<User, StoreError> {
        let id = self.tables.allocate_user_id();
        let user = User::from_new(id, new, self.now);
        self.write(WalOperation::PutUser(user.clone()))?;
        Ok(user)
    }

    fn update_user(&mut self, user: &User) -> Result<(), StoreError> {
        if self.tables.user(user.id).is_none() {
            return Err(StoreError::NotFound {
                entity: "User",
                id: user.id,
            });
        }
        self.write(WalOperation::PutUser(user.clone()))
    }
}

impl GrantStore for Transaction<'_> {
    fn grants_for_user(&self, user_id: u32) -> Result<Vec<AccessGrant>, StoreError> {
        Ok(self.tables.grants_of(user_id))
    }

    fn delete_grants(&mut self, user_id: u32, routes: &BTreeSet<String>) -> Result<usize, StoreError> {
        let ids: Vec<u32> = self
            .tables
            .grants_of(user_id)
            .into_iter()
            .filter(|grant| routes.contains(&grant.route))
            .map(|grant| grant.id)
            .collect();

        for id in &ids {
            self.write(WalOperation::DeleteGrant { id: *id })?;
        }

        Ok(ids.len())
    }

    fn upsert_grant(&mut self, user_id: u32, route: &str, actor: &str) -> Result<GrantUpsert, StoreError> {
        if let Some(mut grant) = self.tables.grant(user_id, route).cloned() {
            grant.updated_by = Some(actor.to_string());
            grant.updated_at = Some(self.now);
            self.write(WalOperation::PutGrant(grant))?;
            return Ok(GrantUpsert::Touched);
        }

        let id = self.tables.allocate_grant_id();
        let grant = AccessGrant::new(id, user_id, route.to_string(), actor.to_string(), self.now);
        self.write(WalOperation::PutGrant(grant))?;
        Ok(GrantUpsert::Inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            fullname: "Test User".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            created_by: "system".to_string(),
        }
    }

    #[test]
    fn test_failed_unit_of_work_leaves_no_trace() {
        let temp_dir = TempDir::new().unwrap();
        let wal = Arc::new(Wal::new(temp_dir.path().join("db.wal")).unwrap());
        let db = Database::open(Arc::clone(&wal)).unwrap();

        let user_id = db
            .transaction(100, |tx| -> Result<u32, StoreError> {
                let user = tx.insert_user(new_user("a@example.com"))?;
                tx.upsert_grant(user.id, "user.index", "system")?;
                Ok(user.id)
            })
            .unwrap();

        let result = db.transaction(200, |tx| -> Result<(), StoreError> {
            let mut user = tx.find_user(user_id)?.unwrap();
            user.fullname = "Renamed".to_string();
            tx.update_user(&user)?;
            tx.delete_grants(user_id, &BTreeSet::from(["user.index".to_string()]))?;
            tx.upsert_grant(user_id, "user.show", "system")?;
            // Duplicate email forces the whole unit of work to fail
            tx.insert_user(new_user("A@example.com"))?;
            Ok(())
        });

        assert!(matches!(result, Err(StoreError::UniqueViolation(_))));

        db.read(|tables| {
            assert_eq!(tables.user(user_id).unwrap().fullname, "Test User");
            let routes: Vec<String> = tables.grants_of(user_id).into_iter().map(|g| g.route).collect();
            assert_eq!(routes, vec!["user.index".to_string()]);
        });

        // Only the first, committed unit of work reached the log
        assert_eq!(wal.replay().unwrap().len(), 2);
    }

    #[test]
    fn test_wal_failure_rolls_back_unit_of_work() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db.wal");

        {
            let db = Database::open(Arc::new(Wal::new(path.clone()).unwrap())).unwrap();
            db.transaction(100, |tx| -> Result<(), StoreError> {
                let user = tx.insert_user(new_user("a@example.com"))?;
                tx.upsert_grant(user.id, "user.index", "system")?;
                Ok(())
            })
            .unwrap();
        }

        let wal = Arc::new(Wal::read_only(path.clone()).unwrap());
        let db = Database::open(Arc::clone(&wal)).unwrap();

        let result = db.transaction(200, |tx| -> Result<(), StoreError> {
            tx.delete_grants(1, &BTreeSet::from(["user.index".to_string()]))?;
            tx.upsert_grant(1, "user.show", "system")?;
            tx.insert_user(new_user("b@example.com"))?;
            Ok(())
        });

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(db.user_count(), 1);
        assert!(db.has_grant(1, "user.index").unwrap());
        assert!(!db.has_grant(1, "user.show").unwrap());

        // Only the first unit of work is on disk
        let replayed = Database::open(Arc::new(Wal::new(path).unwrap())).unwrap();
        assert_eq!(replayed.user_count(), 1);
        assert!(replayed.has_grant(1, "user.index").unwrap());
        assert!(!replayed.has_grant(1, "user.show").unwrap());
    }

    #[test]
    fn test_reopen_restores_committed_state() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db.wal");

        {
            let db = Database::open(Arc::new(Wal::new(path.clone()).unwrap())).unwrap();
            db.transaction(100, |tx| -> Result<(), StoreError> {
                let user = tx.insert_user(new_user("a@example.com"))?;
                tx.upsert_grant(user.id, "user.index", "system")?;
                tx.upsert_grant(user.id, "user.show", "system")?;
                Ok(())
            })
            .unwrap();
            db.transaction(200, |tx| -> Result<(), StoreError> {
                tx.delete_grants(1, &BTreeSet::from(["user.index".to_string()]))?;
                Ok(())
            })
            .unwrap();
        }

        let db = Database::open(Arc::new(Wal::new(path).unwrap())).unwrap();
        assert_eq!(db.user_count(), 1);
        assert!(!db.has_grant(1, "user.index").unwrap());
        assert!(db.has_grant(1, "user.show").unwrap());

        // Sequences continue past replayed rows
        let next = db
            .transaction(300, |tx| tx.insert_user(new_user("b@example.com")))
            .unwrap();
        assert_eq!(next.id, 2);
    }

    #[test]
    fn test_compact_keeps_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db.wal");
        let wal = Arc::new(Wal::new(path.clone()).unwrap());
        let db = Database::open(Arc::clone(&wal)).unwrap();

        for route in ["a", "b", "c"] {
            db.transaction(100, |tx| -> Result<(), StoreError> {
                if tx.find_user(1)?.is_none() {
                    tx.insert_user(new_user("a@example.com"))?;
                }
                tx.upsert_grant(1, route, "system")?;
                Ok(())
            })
            .unwrap();
        }

        db.compact().unwrap();
        assert_eq!(wal.replay().unwrap().len(), 4);

        let reopened = Database::open(Arc::new(Wal::new(path).unwrap())).unwrap();
        assert_eq!(reopened.grant_count(), 3);
    }

    #[test]
    fn test_upsert_touches_existing_grant() {
        let db = Database::in_memory();
        db.transaction(100, |tx| -> Result<(), StoreError> {
            let user = tx.insert_user(new_user("a@example.com"))?;
            assert_eq!(tx.upsert_grant(user.id, "user.index", "creator")?, GrantUpsert::Inserted);
            Ok(())
        })
        .unwrap();

        let outcome = db
            .transaction(200, |tx| tx.upsert_grant(1, "user.index", "editor"))
            .unwrap();
        assert_eq!(outcome, GrantUpsert::Touched);

        db.read(|tables| {
            let grant = tables.grant(1, "user.index").unwrap();
            assert_eq!(grant.created_by, "creator");
            assert_eq!(grant.created_at, 100);
            assert_eq!(grant.updated_by.as_deref(), Some("editor"));
            assert_eq!(grant.updated_at, Some(200));
        });
    }
}
