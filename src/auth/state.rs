//! Session state trait and macro.

use crate::db::Database;

/// Trait for state types that expose the session backend to the auth
/// extractors: the database holding the sessions table and the secret that
/// keys session id hashing.
pub trait HasSessionBackend {
    fn db(&self) -> &Database;
    fn session_secret(&self) -> &str;
}

/// Macro to implement `HasSessionBackend` for state structs with the
/// standard fields.
///
/// The struct must have these fields:
/// - `db: Database`
/// - `session_secret: Arc<String>`
///
/// # Example
/// ```ignore
/// use crate::impl_has_session_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub db: Database,
///     pub session_secret: Arc<String>,
///     // ... other fields
/// }
///
/// impl_has_session_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_session_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasSessionBackend for $state_type {
            fn db(&self) -> &$crate::db::Database {
                &self.db
            }
            fn session_secret(&self) -> &str {
                &self.session_secret
            }
        }
    };
}
