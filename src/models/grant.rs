use serde::Serialize;

/// Maximum length of a route name, matching the grant column width
pub const MAX_ROUTE_LEN: usize = 100;

/// A persisted record authorizing one user to invoke one named route.
///
/// `(user_id, route)` is unique across the grant table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessGrant {
    pub id: u32,
    pub user_id: u32,
    pub route: String,
    pub created_by: String,
    pub created_at: i64,
    pub updated_by: Option<String>,
    pub updated_at: Option<i64>,
}

impl AccessGrant {
    pub fn new(id: u32, user_id: u32, route: String, created_by: String, created_at: i64) -> Self {
        Self {
            id,
            user_id,
            route,
            created_by,
            created_at,
            updated_by: None,
            updated_at: None,
        }
    }
}

/// Canonical form of a route name: surrounding whitespace is not significant.
pub fn normalize_route(route: &str) -> &str {
    route.trim()
}

#[derive(Debug, Clone, Serialize, serde::Deserialize, PartialEq)]
pub struct GrantView {
    pub route: String,
    pub created_by: String,
    pub created_at: i64,
    pub updated_by: Option<String>,
    pub updated_at: Option<i64>,
}

impl From<&AccessGrant> for GrantView {
    fn from(grant: &AccessGrant) -> Self {
        Self {
            route: grant.route.clone(),
            created_by: grant.created_by.clone(),
            created_at: grant.created_at,
            updated_by: grant.updated_by.clone(),
            updated_at: grant.updated_at,
        }
    }
}
