//! Sign-in post-processing and sign-out.

use serde::Serialize;
use tracing::{debug, info, warn};

use nova_auth::IdentitySession;
use nova_identity::{
    resolve_identifier, resolve_portal, Evidence, GroupDiscovery, GroupSet, PortalIdentifier,
    PortalKind,
};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::store::SessionStore;

/// What a completed sign-in decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignInOutcome {
    /// Portal the user was sent to.
    pub portal: PortalKind,
    /// Identifier persisted for that portal.
    pub identifier: PortalIdentifier,
    /// Groups the decision was based on.
    pub groups: GroupSet,
    /// Discovery strategy that produced the groups, if any matched.
    pub group_source: Option<&'static str>,
}

/// Turns an identity-provider session into a persisted portal session.
#[derive(Debug)]
pub struct SignInFlow {
    store: SessionStore,
    discovery: GroupDiscovery,
}

impl SignInFlow {
    /// Creates a flow writing into `store`.
    pub fn new(store: SessionStore, config: &SessionConfig) -> Self {
        Self {
            store,
            discovery: config.discovery(),
        }
    }

    /// Runs post-sign-in processing.
    ///
    /// Returns `Ok(None)` when nobody is signed in. Otherwise decodes the
    /// token, picks the portal and identifier, and persists both. The
    /// identifier write is announced to every mounted provider.
    ///
    /// # Errors
    ///
    /// * [`SessionError::Auth`] if the ID token cannot be decoded
    /// * [`SessionError::Storage`] if persisting fails
    pub async fn complete(
        &self,
        session: &dyn IdentitySession,
    ) -> Result<Option<SignInOutcome>, SessionError> {
        if !session.is_authenticated() {
            debug!(integration = session.name(), "No signed-in user");
            return Ok(None);
        }

        let token = session.decoded_id_token().await?;
        let user_info = match session.user_info().await {
            Ok(info) => info,
            Err(e) => {
                warn!(integration = session.name(), error = %e, "User info unavailable");
                None
            },
        };

        let discovered = self.discovery.discover(&Evidence {
            token: &token,
            user_info: user_info.as_ref(),
        });
        let portal = resolve_portal(&discovered.groups);
        let identifier = resolve_identifier(&token, portal);

        self.store.set_active_portal(portal).await?;
        self.store.set_identifier(portal, &identifier).await?;

        info!(
            portal = %portal,
            identifier = %identifier,
            group_source = discovered.source.unwrap_or("none"),
            "Sign-in completed"
        );

        Ok(Some(SignInOutcome {
            portal,
            identifier,
            groups: discovered.groups,
            group_source: discovered.source,
        }))
    }

    /// Signs the active portal out.
    ///
    /// Returns the portal that was signed out, or `None` if none was active.
    pub async fn sign_out(&self) -> Result<Option<PortalKind>, SessionError> {
        let Some(portal) = self.store.active_portal().await else {
            debug!("Sign-out with no active portal");
            return Ok(None);
        };

        self.store.clear(portal).await?;
        info!(portal = %portal, "Signed out");
        Ok(Some(portal))
    }
}
