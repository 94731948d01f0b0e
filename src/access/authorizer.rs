use crate::core::error::ApiError;
use crate::models::identity::Identity;
use crate::stores::store::GrantLookup;
use std::sync::Arc;
use tracing::{debug, warn};

/// Decides whether an authenticated identity may invoke a named route.
///
/// A route is allowed only if the user holds a grant for it. A route nobody
/// holds is indistinguishable from one this user lacks.
pub struct RouteAuthorizer<L: GrantLookup + ?Sized> {
    lookup: Arc<L>,
}

impl<L: GrantLookup + ?Sized> Clone for RouteAuthorizer<L> {
    fn clone(&self) -> Self {
        Self {
            lookup: Arc::clone(&self.lookup),
        }
    }
}

impl<L: GrantLookup + ?Sized> RouteAuthorizer<L> {
    pub fn new(lookup: Arc<L>) -> Self {
        Self { lookup }
    }

    pub fn authorize(&self, identity: Option<&Identity>, route: &str) -> Result<(), ApiError> {
        let identity = identity.ok_or_else(|| {
            ApiError::Unauthenticated("no identity attached to request".to_string())
        })?;

        match self.lookup.has_grant(identity.user_id, route) {
            Ok(true) => {
                debug!(user_id = identity.user_id, route, "Route authorized");
                Ok(())
            }
            Ok(false) => Err(ApiError::AccessDenied {
                route: route.to_string(),
            }),
            // Fail closed
            Err(e) => {
                warn!(user_id = identity.user_id, route, error = %e, "Grant lookup failed");
                Err(ApiError::AccessDenied {
                    route: route.to_string(),
                })
            }
        }
    }
}
