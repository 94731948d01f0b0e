use crate::models::grant::GrantView;
use serde::Serialize;

/// A registered account. Never hard-deleted; `active` carries the soft state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: u32,
    pub fullname: String,
    /// Unique, compared case-insensitively
    pub email: String,
    /// Argon2 PHC string
    pub password_hash: String,
    pub active: bool,
    pub created_by: String,
    pub created_at: i64,
    pub updated_by: Option<String>,
    pub updated_at: Option<i64>,
}

/// Attributes for a user that has not been stored yet.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub fullname: String,
    pub email: String,
    pub password_hash: String,
    pub created_by: String,
}

impl User {
    pub fn from_new(id: u32, new: NewUser, created_at: i64) -> Self {
        Self {
            id,
            fullname: new.fullname,
            email: new.email,
            password_hash: new.password_hash,
            active: true,
            created_by: new.created_by,
            created_at,
            updated_by: None,
            updated_at: None,
        }
    }

    /// Stamp the row as modified by `actor`
    pub fn touch(&mut self, actor: &str, now: i64) {
        self.updated_by = Some(actor.to_string());
        self.updated_at = Some(now);
    }
}

/// Filters accepted by the user listing.
#[derive(Clone, Debug, Default)]
pub struct UserFilter {
    /// Case-insensitive substring of the full name
    pub fullname: Option<String>,
    /// Case-insensitive substring of the email
    pub email: Option<String>,
    pub active: Option<bool>,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        if let Some(fullname) = &self.fullname {
            if !contains_ignore_case(&user.fullname, fullname) {
                return false;
            }
        }

        if let Some(email) = &self.email {
            if !contains_ignore_case(&user.email, email) {
                return false;
            }
        }

        self.active.map_or(true, |active| user.active == active)
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Public representation of a user; the password hash never leaves the service.
#[derive(Debug, Clone, Serialize, serde::Deserialize, PartialEq)]
pub struct UserView {
    pub id: u32,
    pub fullname: String,
    pub email: String,
    pub active: bool,
    pub created_by: String,
    pub created_at: i64,
    pub updated_by: Option<String>,
    pub updated_at: Option<i64>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            fullname: user.fullname.clone(),
            email: user.email.clone(),
            active: user.active,
            created_by: user.created_by.clone(),
            created_at: user.created_at,
            updated_by: user.updated_by.clone(),
            updated_at: user.updated_at,
        }
    }
}

/// A user together with the routes granted to it.
#[derive(Debug, Clone, Serialize, serde::Deserialize, PartialEq)]
pub struct UserDetails {
    #[serde(flatten)]
    pub user: UserView,
    pub access: Vec<GrantView>,
}
