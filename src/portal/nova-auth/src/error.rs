//! Authentication error types.

use thiserror::Error;

/// Errors raised by identity-provider integrations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No signed-in user.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Token signature, issuer or audience did not check out.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Token has expired.
    #[error("token expired")]
    TokenExpired,

    /// Token is not a well-formed JWT.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The user-info endpoint failed or returned garbage.
    #[error("user info unavailable: {0}")]
    UserInfo(String),

    /// Integration configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}
