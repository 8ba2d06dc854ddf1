mod claims;
mod error;
mod issuer;
mod password;
pub mod session_store;
mod sso;
mod verifier;

pub use claims::{DEFAULT_ROLE, IssuedClaims, UserClaims};
pub use error::AuthError;
pub use issuer::{TokenIssuer, split_name};
pub use password::verify_password;
pub use session_store::{
    LoginMethod, MemorySessionStore, Session, SessionError, SessionResult, SessionStore,
    require_session,
};
pub use sso::{SsoAuthenticator, SsoError};
pub use verifier::{TokenError, TokenVerifier};
