use crate::access::reconciler::{with_conflict_retry, AccessReconciler, ReconcileReport};
use crate::core::error::{ApiError, StoreError, ACCESS_USER_ROUTE_UNIQUE};
use crate::metrics::collector::Metrics;
use crate::models::api::LoginResponse;
use crate::models::grant::GrantView;
use crate::models::identity::Identity;
use crate::models::user::{NewUser, User, UserDetails, UserFilter, UserView};
use crate::security::password::{hash_password_blocking, verify_password_blocking};
use crate::security::rate_limiter::LoginThrottle;
use crate::stores::database::{Database, Transaction};
use crate::stores::store::UserStore;
use crate::stores::tables::Tables;
use crate::stores::token_store::TokenStore;
use crate::utils::time::current_timestamp;
use crate::validation::users::{ValidatedCreate, ValidatedLogin, ValidatedUpdate};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// User management and login on top of the shared stores.
#[derive(Clone)]
pub struct UserService {
    database: Arc<Database>,
    tokens: Arc<TokenStore>,
    throttle: Arc<LoginThrottle>,
    metrics: Arc<Metrics>,
    token_ttl: Option<u64>,
}

impl UserService {
    pub fn new(
        database: Arc<Database>,
        tokens: Arc<TokenStore>,
        throttle: Arc<LoginThrottle>,
        metrics: Arc<Metrics>,
        token_ttl: Option<u64>,
    ) -> Self {
        Self {
            database,
            tokens,
            throttle,
            metrics,
            token_ttl,
        }
    }

    pub fn list(&self, filter: &UserFilter) -> Vec<UserView> {
        self.database.read(|tables| {
            tables
                .users()
                .filter(|user| filter.matches(user))
                .map(UserView::from)
                .collect()
        })
    }

    pub fn show(&self, id: u32) -> Result<UserDetails, ApiError> {
        self.database
            .read(|tables| tables.user(id).map(|user| details(tables, user)))
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
    }

    /// Register a user with its initial grants. Returns the new id.
    pub async fn create(&self, input: ValidatedCreate, actor: &Identity) -> Result<u32, ApiError> {
        let password_hash = hash_password_blocking(input.password)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        let new_user = NewUser {
            fullname: input.fullname,
            email: input.email,
            password_hash,
            created_by: actor.fullname.clone(),
        };
        let access = input.access;
        let actor_name = actor.fullname.clone();

        let (user, report) = self
            .run_with_retry(move |tx| {
                let user = tx.insert_user(new_user.clone())?;
                let report = AccessReconciler::new(tx).reconcile(user.id, &access, &actor_name)?;
                Ok((user, report))
            })
            .await?;

        self.metrics.record_reconcile(&report);
        info!(user_id = user.id, created_by = %actor.fullname, grants = report.inserted, "User created");

        Ok(user.id)
    }

    /// Apply a partial update. Grants are reconciled only when `access` is present.
    pub async fn update(&self, id: u32, input: ValidatedUpdate, actor: &Identity) -> Result<(), ApiError> {
        let ValidatedUpdate {
            fullname,
            email,
            password,
            access,
        } = input;

        let password_hash = match password {
            Some(password) => Some(
                hash_password_blocking(password)
                    .await
                    .map_err(|e| ApiError::Internal(e.to_string()))?,
            ),
            None => None,
        };
        let actor_name = actor.fullname.clone();

        let report = self
            .run_with_retry(move |tx| {
                let mut user = tx.find_user(id)?.ok_or(StoreError::NotFound { entity: "User", id })?;

                if let Some(fullname) = &fullname {
                    user.fullname = fullname.clone();
                }
                if let Some(email) = &email {
                    user.email = email.clone();
                }
                if let Some(hash) = &password_hash {
                    user.password_hash = hash.clone();
                }
                user.touch(&actor_name, tx.now());
                tx.update_user(&user)?;

                match &access {
                    Some(access) => AccessReconciler::new(tx)
                        .reconcile(id, access, &actor_name)
                        .map(Some),
                    None => Ok(None),
                }
            })
            .await?;

        if let Some(report) = report {
            self.metrics.record_reconcile(&report);
        }
        info!(user_id = id, updated_by = %actor.fullname, "User updated");

        Ok(())
    }

    /// Flip the active flag, returning the new value. Deactivation signs the user out.
    pub async fn toggle_active(&self, id: u32, actor: &Identity) -> Result<bool, ApiError> {
        let actor_name = actor.fullname.clone();
        let active = self
            .run_with_retry(move |tx| {
                let mut user = tx.find_user(id)?.ok_or(StoreError::NotFound { entity: "User", id })?;
                user.active = !user.active;
                user.touch(&actor_name, tx.now());
                tx.update_user(&user)?;
                Ok(user.active)
            })
            .await?;

        if !active {
            let revoked = self.tokens.revoke_user(id);
            info!(user_id = id, revoked, "User deactivated");
        } else {
            info!(user_id = id, "User activated");
        }

        Ok(active)
    }

    /// Verify credentials and issue a bearer token.
    ///
    /// Unknown email, wrong password and inactive account all fail the same way.
    pub async fn login(&self, ip: IpAddr, input: ValidatedLogin) -> Result<LoginResponse, ApiError> {
        let now = current_timestamp();
        if self.throttle.is_locked(ip, now) {
            self.metrics.increment_throttled();
            warn!(%ip, "Login rejected, address is locked out");
            return Err(ApiError::TooManyAttempts);
        }

        let user = self
            .database
            .read(|tables| tables.user_by_email(&input.email).cloned());

        let verified = match &user {
            Some(user) => verify_password_blocking(user.password_hash.clone(), input.password)
                .await
                .map_err(|e| ApiError::Internal(e.to_string()))?,
            None => false,
        };

        let user = match user {
            Some(user) if verified && user.active => user,
            _ => {
                let failures = self.throttle.record_failure(ip, now);
                self.metrics.increment_failed_logins();
                warn!(%ip, failures, "Failed login attempt");
                return Err(ApiError::InvalidCredentials);
            }
        };

        self.throttle.reset(ip);
        let token = self.tokens.issue(user.id, now);
        self.metrics.increment_logins();
        info!(user_id = user.id, "User logged in");

        let user = self
            .database
            .read(|tables| tables.user(user.id).map(|u| details(tables, u)))
            .ok_or_else(|| ApiError::Internal("user vanished during login".to_string()))?;

        Ok(LoginResponse { user, token })
    }

    /// Map a presented bearer token to the identity of an active user
    pub fn authenticate(&self, token: &str) -> Result<Identity, ApiError> {
        let issued = self
            .tokens
            .resolve(token, current_timestamp(), self.token_ttl)
            .ok_or_else(|| ApiError::Unauthenticated("unknown or expired token".to_string()))?;

        let user = self
            .database
            .read(|tables| tables.user(issued.user_id).cloned())
            .ok_or_else(|| ApiError::Unauthenticated("token owner no longer exists".to_string()))?;

        if !user.active {
            return Err(ApiError::Unauthenticated("token owner is inactive".to_string()));
        }

        Ok(Identity {
            user_id: user.id,
            fullname: user.fullname,
            email: user.email,
        })
    }

    /// One unit of work on the blocking pool, retried once on a grant
    /// uniqueness conflict. The WAL sync happens under the table write lock
    /// and must not stall a runtime worker.
    async fn run_with_retry<R, F>(&self, mut f: F) -> Result<R, ApiError>
    where
        R: Send + 'static,
        F: FnMut(&mut Transaction<'_>) -> Result<R, StoreError> + Send + 'static,
    {
        let database = Arc::clone(&self.database);
        let result = tokio::task::spawn_blocking(move || {
            with_conflict_retry(|| database.transaction(current_timestamp(), &mut f))
        })
        .await
        .map_err(|e| ApiError::Internal(format!("unit of work task failed: {}", e)))?;

        result.map_err(|e| {
            if matches!(e, StoreError::UniqueViolation(ACCESS_USER_ROUTE_UNIQUE)) {
                self.metrics.increment_conflicts();
            }
            ApiError::from(e)
        })
    }
}

fn details(tables: &Tables, user: &User) -> UserDetails {
    UserDetails {
        user: UserView::from(user),
        access: tables.grants_of(user.id).iter().map(GrantView::from).collect(),
    }
}

/// Seed an administrator holding every route in `routes`.
///
/// Does nothing when an account with the same email already exists.
pub async fn ensure_admin(
    database: &Database,
    fullname: &str,
    email: &str,
    password: &str,
    routes: &[&str],
) -> anyhow::Result<Option<u32>> {
    if database.read(|tables| tables.user_by_email(email).is_some()) {
        return Ok(None);
    }

    let password_hash = hash_password_blocking(password.to_string()).await?;
    let routes: Vec<String> = routes.iter().map(|r| r.to_string()).collect();

    let (id, _): (u32, ReconcileReport) = database.transaction(current_timestamp(), |tx| {
        let user = tx.insert_user(NewUser {
            fullname: fullname.to_string(),
            email: email.to_string(),
            password_hash,
            created_by: "system".to_string(),
        })?;
        let report = AccessReconciler::new(tx).reconcile(user.id, &routes, "system")?;
        Ok::<_, StoreError>((user.id, report))
    })?;

    Ok(Some(id))
}
