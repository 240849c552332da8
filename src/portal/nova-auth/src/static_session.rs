//! Identity session with pre-decoded claims.

use async_trait::async_trait;

use nova_identity::ClaimsDocument;

use crate::{AuthError, IdentitySession};

/// An identity session whose token and user info are already decoded.
///
/// Used by tests and by the CLI when claims come from a file.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentitySession {
    token: Option<ClaimsDocument>,
    user_info: Option<ClaimsDocument>,
}

impl StaticIdentitySession {
    /// A signed-in session with the given token claims.
    pub fn signed_in(token: ClaimsDocument) -> Self {
        Self {
            token: Some(token),
            user_info: None,
        }
    }

    /// A session with nobody signed in.
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Attaches a user-info document.
    pub fn with_user_info(mut self, user_info: ClaimsDocument) -> Self {
        self.user_info = Some(user_info);
        self
    }
}

#[async_trait]
impl IdentitySession for StaticIdentitySession {
    fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    async fn decoded_id_token(&self) -> Result<ClaimsDocument, AuthError> {
        self.token.clone().ok_or(AuthError::NotAuthenticated)
    }

    async fn user_info(&self) -> Result<Option<ClaimsDocument>, AuthError> {
        Ok(self.user_info.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
