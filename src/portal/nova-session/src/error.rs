//! Session error types.

use thiserror::Error;

use nova_auth::AuthError;
use nova_storage::StorageError;

/// Errors surfaced by session writes and the sign-in flow.
///
/// Reads never produce these; they degrade to defaults instead.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Writing to the session backend failed.
    #[error("session storage error: {0}")]
    Storage(#[from] StorageError),

    /// The identity provider could not supply the signed-in user's claims.
    #[error("identity provider error: {0}")]
    Auth(#[from] AuthError),

    /// The provider behind an identifier handle has been unmounted.
    #[error("portal provider unmounted")]
    ProviderUnmounted,
}
