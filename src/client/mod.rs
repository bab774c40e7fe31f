//! Client half of the session lifecycle.
//!
//! [`AuthClient`] talks to the auth endpoints and injects bearer tokens,
//! [`SessionManager`] keeps the persisted session and the exposed
//! [`AuthState`] in step, and [`AuthProvider`] hands an [`AuthContext`] to
//! the rest of the application.

mod api;
mod context;
mod error;
mod session;
mod store;

pub use api::{AuthClient, DEFAULT_TIMEOUT};
pub use context::{AuthContext, AuthProvider, use_auth};
pub use error::{ClientError, ContextError, StoreError};
pub use session::{AuthState, SessionEvent, SessionManager, SessionStatus, Ticket};
pub use store::{FileStore, KeyValueStore, MemoryStore, Session, SessionStore, TOKEN_KEY, USER_KEY};
