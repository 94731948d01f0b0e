use crate::core::error::ValidationError;
use crate::models::api::{CreateUserRequest, LoginRequest, UpdateUserRequest};
use crate::models::grant::{normalize_route, MAX_ROUTE_LEN};
use std::collections::HashSet;

pub const MAX_FULLNAME_LEN: usize = 255;
pub const MAX_EMAIL_LEN: usize = 254;
/// Bounds the work a single login can make the hasher do
pub const MAX_PASSWORD_LEN: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCreate {
    pub fullname: String,
    pub email: String,
    pub password: String,
    pub access: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedUpdate {
    pub fullname: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    /// `None` leaves the user's grants untouched
    pub access: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedLogin {
    pub email: String,
    pub password: String,
}

impl CreateUserRequest {
    pub fn validate(self) -> Result<ValidatedCreate, ValidationError> {
        let fullname = self.fullname.ok_or(ValidationError::MissingField("fullname"))?;
        let email = self.email.ok_or(ValidationError::MissingField("email"))?;
        let password = self.password.ok_or(ValidationError::MissingField("password"))?;
        let access = self.access.ok_or(ValidationError::MissingField("access"))?;

        Ok(ValidatedCreate {
            fullname: validate_fullname(&fullname)?,
            email: validate_email(&email)?,
            password: validate_password(password)?,
            access: validate_access(&access)?,
        })
    }
}

impl UpdateUserRequest {
    pub fn validate(self) -> Result<ValidatedUpdate, ValidationError> {
        Ok(ValidatedUpdate {
            fullname: self.fullname.as_deref().map(validate_fullname).transpose()?,
            email: self.email.as_deref().map(validate_email).transpose()?,
            password: self.password.map(validate_password).transpose()?,
            access: self.access.as_deref().map(validate_access).transpose()?,
        })
    }
}

impl LoginRequest {
    pub fn validate(self) -> Result<ValidatedLogin, ValidationError> {
        Ok(ValidatedLogin {
            email: validate_email(&self.email)?,
            password: validate_password(self.password)?,
        })
    }
}

fn validate_fullname(fullname: &str) -> Result<String, ValidationError> {
    let fullname = fullname.trim();
    if fullname.is_empty() {
        return Err(ValidationError::EmptyField("fullname"));
    }
    if fullname.chars().count() > MAX_FULLNAME_LEN {
        return Err(ValidationError::TooLong {
            field: "fullname",
            max: MAX_FULLNAME_LEN,
        });
    }
    Ok(fullname.to_string())
}

/// Trimmed, with exactly one `@`, a non-empty local part and a dotted domain
pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::EmptyField("email"));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(ValidationError::TooLong {
            field: "email",
            max: MAX_EMAIL_LEN,
        });
    }

    let (local, domain) = email.split_once('@').ok_or(ValidationError::InvalidEmail)?;
    let domain_ok = domain
        .split('.')
        .all(|label| !label.is_empty())
        && domain.contains('.');

    if local.is_empty()
        || !domain_ok
        || domain.contains('@')
        || email.chars().any(char::is_whitespace)
    {
        return Err(ValidationError::InvalidEmail);
    }

    Ok(email.to_string())
}

fn validate_password(password: String) -> Result<String, ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::EmptyField("password"));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(ValidationError::TooLong {
            field: "password",
            max: MAX_PASSWORD_LEN,
        });
    }
    Ok(password)
}

/// A desired access list: non-empty, no blank entries, no duplicates once
/// surrounding whitespace is ignored. Routes are returned normalized.
pub fn validate_access(access: &[String]) -> Result<Vec<String>, ValidationError> {
    if access.is_empty() {
        return Err(ValidationError::EmptyAccessList);
    }

    let mut seen = HashSet::with_capacity(access.len());
    let mut routes = Vec::with_capacity(access.len());

    for raw in access {
        let route = normalize_route(raw);
        if route.is_empty() {
            return Err(ValidationError::BlankRoute);
        }
        if route.chars().count() > MAX_ROUTE_LEN {
            return Err(ValidationError::TooLong {
                field: "access",
                max: MAX_ROUTE_LEN,
            });
        }
        if !seen.insert(route) {
            return Err(ValidationError::DuplicateRoute(route.to_string()));
        }
        routes.push(route.to_string());
    }

    Ok(routes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn create_request() -> CreateUserRequest {
        CreateUserRequest {
            fullname: Some("  Ada Lovelace ".into()),
            email: Some("ada@example.com".into()),
            password: Some("analytical".into()),
            access: Some(strings(&["user.index", " user.show"])),
        }
    }

    #[test]
    fn test_valid_create() {
        let valid = create_request().validate().unwrap();

        assert_eq!(valid.fullname, "Ada Lovelace");
        assert_eq!(valid.access, strings(&["user.index", "user.show"]));
    }

    #[test]
    fn test_create_requires_every_field() {
        let mut req = create_request();
        req.access = None;
        assert_eq!(req.validate(), Err(ValidationError::MissingField("access")));

        let mut req = create_request();
        req.password = None;
        assert_eq!(req.validate(), Err(ValidationError::MissingField("password")));
    }

    #[test]
    fn test_access_rules() {
        assert_eq!(validate_access(&[]), Err(ValidationError::EmptyAccessList));
        assert_eq!(
            validate_access(&strings(&["user.index", "  "])),
            Err(ValidationError::BlankRoute)
        );
        assert_eq!(
            validate_access(&strings(&["user.index", "user.index "])),
            Err(ValidationError::DuplicateRoute("user.index".into()))
        );
        assert!(matches!(
            validate_access(&["x".repeat(MAX_ROUTE_LEN + 1)]),
            Err(ValidationError::TooLong { field: "access", .. })
        ));
        assert!(validate_access(&["x".repeat(MAX_ROUTE_LEN)]).is_ok());
    }

    #[test]
    fn test_email_format() {
        assert!(validate_email("a@b.co").is_ok());
        assert_eq!(validate_email(" a@b.co ").unwrap(), "a@b.co");

        for bad in ["plain", "@b.co", "a@b", "a@@b.co", "a@b..co", "a b@c.co", "a@.co"] {
            assert_eq!(validate_email(bad), Err(ValidationError::InvalidEmail), "{}", bad);
        }
        assert_eq!(validate_email("  "), Err(ValidationError::EmptyField("email")));
    }

    #[test]
    fn test_update_is_partial() {
        let valid = UpdateUserRequest::default().validate().unwrap();
        assert_eq!(valid, ValidatedUpdate::default());

        let valid = UpdateUserRequest {
            fullname: Some("New Name".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(valid.fullname.as_deref(), Some("New Name"));
        assert!(valid.access.is_none());
    }

    #[test]
    fn test_update_rejects_explicit_empty_access() {
        let err = UpdateUserRequest {
            access: Some(vec![]),
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        assert_eq!(err, ValidationError::EmptyAccessList);
    }

    #[test]
    fn test_login_validation() {
        let err = LoginRequest {
            email: "ada@example.com".into(),
            password: String::new(),
        }
        .validate()
        .unwrap_err();
        assert_eq!(err, ValidationError::EmptyField("password"));
    }
}
