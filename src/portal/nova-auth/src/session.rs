//! Identity session trait.

use async_trait::async_trait;
use nova_identity::ClaimsDocument;

use crate::AuthError;

/// The signed-in state exposed by an identity-provider integration.
///
/// Implementations own the transport (redirects, token storage, refresh);
/// callers only see the decoded results.
#[async_trait]
pub trait IdentitySession: Send + Sync {
    /// Whether a user is currently signed in.
    fn is_authenticated(&self) -> bool;

    /// Returns the decoded ID token.
    ///
    /// # Errors
    ///
    /// * [`AuthError::NotAuthenticated`] if nobody is signed in
    /// * Any decode or validation failure of the token
    async fn decoded_id_token(&self) -> Result<ClaimsDocument, AuthError>;

    /// Returns the user-info document, or `None` when the integration has
    /// no user-info source.
    async fn user_info(&self) -> Result<Option<ClaimsDocument>, AuthError>;

    /// Returns the name of this integration for logging/debugging.
    fn name(&self) -> &'static str;
}
