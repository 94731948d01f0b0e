// Application state (AppState)

use crate::access::authorizer::RouteAuthorizer;
use crate::core::config::Config;
use crate::metrics::collector::{Metrics, StoreGauges};
use crate::security::rate_limiter::LoginThrottle;
use crate::services::users::UserService;
use crate::stores::database::Database;
use crate::stores::store::GrantLookup;
use crate::stores::token_store::TokenStore;
use std::sync::Arc;

/// Shared application state
///
/// Everything handlers and middleware touch is injected from here.
/// All fields are cheap to clone across threads.
#[derive(Clone)]
pub struct AppState {
    /// Users and access grants
    pub database: Arc<Database>,

    /// Bearer tokens issued at login
    pub tokens: Arc<TokenStore>,

    /// Failed login counters per client address
    pub throttle: Arc<LoginThrottle>,

    /// Per-route grant check run after authentication
    pub authorizer: RouteAuthorizer<dyn GrantLookup>,

    pub users: UserService,

    pub metrics: Arc<Metrics>,

    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, database: Database) -> Self {
        let config = Arc::new(config);
        let database = Arc::new(database);
        let tokens = Arc::new(TokenStore::new());
        let throttle = Arc::new(LoginThrottle::new(
            config.auth.max_failed_logins,
            config.auth.lockout_window,
        ));
        let metrics = Arc::new(Metrics::new());

        let lookup: Arc<dyn GrantLookup> = database.clone();
        let users = UserService::new(
            Arc::clone(&database),
            Arc::clone(&tokens),
            Arc::clone(&throttle),
            Arc::clone(&metrics),
            config.auth.token_ttl(),
        );

        Self {
            database,
            tokens,
            throttle,
            authorizer: RouteAuthorizer::new(lookup),
            users,
            metrics,
            config,
        }
    }

    pub fn gauges(&self) -> StoreGauges {
        StoreGauges {
            users: self.database.user_count(),
            grants: self.database.grant_count(),
            tokens: self.tokens.len(),
        }
    }
}
