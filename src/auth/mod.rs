//! Bearer-token authentication with role-based access control.
//!
//! `require_auth` validates the `Authorization: Bearer` header on every
//! protected request and stores a [`RequestContext`] in the request
//! extensions. Handlers read it back through the [`Auth`] extractor, which
//! also applies a [`RoleConstraint`].

mod bearer;
mod errors;
mod extractors;
mod ip;
mod state;
mod types;

pub use bearer::{BEARER_PREFIX, extract_bearer_token};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{AdminOnly, AnyRole, Auth, RoleConstraint, authenticate, require_auth};
pub use ip::client_ip;
pub use state::HasAuthBackend;
pub use types::RequestContext;
