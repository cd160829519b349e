//! Cookie-referenced session authentication.
//!
//! The session cookie carries a random id; its keyed hash references a row
//! in the sessions table. Protected endpoints resolve the cookie through
//! the `SessionAuth` extractor. The JWT the API hands out plays no part in
//! authorizing requests.

mod cookie;
mod errors;
mod extractors;
mod state;

pub use cookie::{SESSION_COOKIE_NAME, clear_session_cookie, get_cookie, session_cookie};
pub use errors::AuthError;
pub use extractors::{SessionAuth, SessionUser};
pub use state::HasSessionBackend;
