//! Authentication context types.

use crate::db::UserRole;
use crate::jwt::SessionClaims;
use crate::models::UserProfile;

/// Identity decoded from a validated bearer token. Lives for one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// JWT claims from the session token
    pub claims: SessionClaims,
}

impl RequestContext {
    pub fn user_id(&self) -> &str {
        &self.claims.sub
    }

    pub fn role(&self) -> UserRole {
        self.claims.role
    }

    pub fn profile(&self) -> UserProfile {
        self.claims.profile()
    }
}
