pub mod core {
    pub mod config;
    pub mod error;
    pub mod routes;
    pub mod startup;
    pub mod state;
    pub mod tracing_init;
}

pub mod access {
    pub mod authorizer;
    pub mod reconciler;
}

pub mod handlers {
    pub mod auth;
    pub mod docs;
    pub mod fallback;
    pub mod health;
    pub mod metrics;
    pub mod users;
}

pub mod metrics {
    pub mod collector;
}

pub mod models {
    pub mod api;
    pub mod grant;
    pub mod identity;
    pub mod user;
}

pub mod security {
    pub mod credentials;
    pub mod guard;
    pub mod password;
    pub mod rate_limiter;
}

pub mod services {
    pub mod users;
}

pub mod stores {
    pub mod database;
    pub mod store;
    pub mod tables;
    pub mod token_store;
}

pub mod utils {
    pub mod time;
}

pub mod validation {
    pub mod users;
}

pub mod wal {
    pub mod wal;
}
