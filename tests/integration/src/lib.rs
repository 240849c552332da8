//! Integration tests for Nova portal sessions.
//!
//! These tests drive the whole path from a finished identity-provider
//! sign-in to the mounted providers of several tabs.

// Allow unwrap() in tests - panics are acceptable for test assertions
#![allow(clippy::disallowed_methods)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::Value;

use nova_auth::StaticIdentitySession;
use nova_identity::{ClaimsDocument, PortalKind};
use nova_session::{
    CrossTabRelay, IdentifierHandle, PortalProvider, RouteGuard, SessionConfig, SessionStore,
    SignInFlow, SignInOutcome,
};
use nova_storage::SessionArea;
use nova_storage_sqlite::SqliteBackend;

// ============================================================================
// Test Browser
// ============================================================================

/// A browser session: one storage area shared by any number of tabs.
pub struct TestBrowser {
    area: SessionArea,
    config: SessionConfig,
}

impl TestBrowser {
    /// A browser whose providers effectively never poll.
    pub fn new() -> Self {
        Self::with_config(SessionConfig {
            poll_interval: Duration::from_secs(3600),
            ..SessionConfig::default()
        })
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            area: SessionArea::new(),
            config,
        }
    }

    /// Opens a tab with its own change bus and cross-tab relay.
    pub fn open_tab(&self) -> Result<TestTab> {
        let store = SessionStore::new(Arc::new(self.area.open_tab()));
        let relay = CrossTabRelay::start(&store).context("Tab storage has no storage events")?;
        Ok(TestTab {
            store,
            config: self.config.clone(),
            _relay: relay,
        })
    }
}

impl Default for TestBrowser {
    fn default() -> Self {
        Self::new()
    }
}

/// One tab of a [`TestBrowser`].
pub struct TestTab {
    store: SessionStore,
    config: SessionConfig,
    _relay: CrossTabRelay,
}

impl TestTab {
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn guard(&self) -> RouteGuard {
        RouteGuard::new(self.store.clone())
    }

    pub fn flow(&self) -> SignInFlow {
        SignInFlow::new(self.store.clone(), &self.config)
    }

    /// Completes a sign-in with the given decoded token claims.
    pub async fn sign_in(&self, claims: Value) -> Result<SignInOutcome> {
        let session = StaticIdentitySession::signed_in(ClaimsDocument::from(claims));
        self.flow()
            .complete(&session)
            .await?
            .context("Session was not signed in")
    }

    pub async fn mount(&self, kind: PortalKind) -> PortalProvider {
        PortalProvider::mount(kind, &self.store, &self.config).await
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Waits until `handle` holds `expected`.
pub async fn wait_for(handle: &mut IdentifierHandle, expected: &str, within: Duration) -> Result<()> {
    let deadline = tokio::time::Instant::now() + within;

    while handle.current() != expected {
        match tokio::time::timeout_at(deadline, handle.changed()).await {
            Ok(changed) => changed?,
            Err(_) => bail!(
                "{} identifier is {} after {:?}, expected {}",
                handle.kind(),
                handle.current(),
                within,
                expected
            ),
        }
    }

    Ok(())
}

/// Opens the SQLite session `name` under `dir`, as a separate process would.
pub async fn open_durable(dir: &Path, name: &str, actor: &str) -> Result<SessionStore> {
    let backend = SqliteBackend::open(dir, name)
        .await
        .context("Failed to open session database")?
        .with_actor(actor);
    Ok(SessionStore::new(Arc::new(backend)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nova_auth::{IdTokenDecoder, JwtDecoderConfig, JwtIdentitySession};
    use nova_identity::home_path;
    use nova_session::GuardDecision;
    use serde_json::json;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_sign_in_updates_every_tab() {
        let browser = TestBrowser::new();
        let tab_a = browser.open_tab().unwrap();
        let tab_b = browser.open_tab().unwrap();

        let header_a = tab_a.mount(PortalKind::Customer).await;
        let header_b = tab_b.mount(PortalKind::Customer).await;
        let mut handle_a = header_a.handle();
        let mut handle_b = header_b.handle();
        assert_eq!(handle_b.current(), "C_002");

        let outcome = tab_a
            .sign_in(json!({ "groups": ["Customers"], "db_id": "C_010" }))
            .await
            .unwrap();
        assert_eq!(outcome.portal, PortalKind::Customer);

        // Same tab through the bus, other tab through the storage event.
        wait_for(&mut handle_a, "C_010", WAIT).await.unwrap();
        wait_for(&mut handle_b, "C_010", WAIT).await.unwrap();

        assert_eq!(
            tab_b.guard().check(PortalKind::Customer, true).await,
            GuardDecision::Allow
        );
    }

    #[tokio::test]
    async fn test_sign_out_propagates() {
        let browser = TestBrowser::new();
        let tab_a = browser.open_tab().unwrap();
        let tab_b = browser.open_tab().unwrap();

        tab_a
            .sign_in(json!({ "profile": { "groups": ["Employees"], "db_id": "E_777" } }))
            .await
            .unwrap();

        let provider = tab_b.mount(PortalKind::Employee).await;
        let mut handle = provider.handle();
        assert_eq!(handle.current(), "E_777");

        assert_eq!(
            tab_a.flow().sign_out().await.unwrap(),
            Some(PortalKind::Employee)
        );
        wait_for(&mut handle, "E_001", WAIT).await.unwrap();

        assert_eq!(
            tab_b.guard().check(PortalKind::Employee, true).await,
            GuardDecision::Redirect("/")
        );
        assert_eq!(home_path(tab_b.store().active_portal().await), "/customer");
    }

    #[tokio::test]
    async fn test_admin_routes() {
        let browser = TestBrowser::new();
        let tab = browser.open_tab().unwrap();

        let outcome = tab
            .sign_in(json!({ "groups": ["Employees", "admin"], "db_id": "E_9" }))
            .await
            .unwrap();
        assert_eq!(outcome.portal, PortalKind::Admin);
        assert_eq!(outcome.identifier, "A_001");

        let guard = tab.guard();
        assert_eq!(guard.check(PortalKind::Admin, true).await, GuardDecision::Allow);
        assert_eq!(
            guard.check(PortalKind::Customer, true).await,
            GuardDecision::Redirect("/admin")
        );
        assert_eq!(home_path(tab.store().active_portal().await), "/admin");
    }

    #[tokio::test]
    async fn test_unmounted_provider_in_other_tab() {
        let browser = TestBrowser::new();
        let tab_a = browser.open_tab().unwrap();
        let tab_b = browser.open_tab().unwrap();

        let provider = tab_b.mount(PortalKind::Customer).await;
        let handle = provider.handle();
        provider.unmount().await;
        assert_eq!(tab_b.store().bus().receiver_count(PortalKind::Customer), 0);

        tab_a
            .sign_in(json!({ "groups": ["Customers"], "db_id": "C_050" }))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(handle.current(), "C_002");
        // The store itself still sees the write.
        assert_eq!(
            tab_b.store().identifier(PortalKind::Customer).await.unwrap(),
            "C_050"
        );
    }

    #[tokio::test]
    async fn test_verified_token_sign_in() {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let config = JwtDecoderConfig {
            jwt_secret: "integration-secret-minimum-32-chars".to_string(),
            issuer: "https://id.nova.example/oauth2/token".to_string(),
            audience: "nova-portal".to_string(),
        };
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let token = encode(
            &Header::default(),
            &json!({
                "sub": "carol",
                "iss": config.issuer,
                "aud": config.audience,
                "exp": now + 600,
                "groups": ["Employees"],
                "claims": { "db_id": 4711 }
            }),
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        )
        .unwrap();

        let browser = TestBrowser::new();
        let tab = browser.open_tab().unwrap();
        let provider = tab.mount(PortalKind::Employee).await;
        let mut handle = provider.handle();

        let session = JwtIdentitySession::new(token, IdTokenDecoder::verified(&config));
        let outcome = tab.flow().complete(&session).await.unwrap().unwrap();
        assert_eq!(outcome.portal, PortalKind::Employee);
        assert_eq!(outcome.identifier, "4711");
        assert_eq!(outcome.group_source, Some("token-groups"));

        wait_for(&mut handle, "4711", WAIT).await.unwrap();
    }

    #[tokio::test]
    async fn test_durable_session_between_processes() {
        let dir = TempDir::new().unwrap();
        let writer = open_durable(dir.path(), "shared", "writer").await.unwrap();
        let reader = open_durable(dir.path(), "shared", "reader").await.unwrap();

        // No storage events between processes: only polling carries writes.
        let config = SessionConfig {
            poll_interval: Duration::from_millis(100),
            ..SessionConfig::default()
        };
        let provider = PortalProvider::mount_customer(&reader, &config).await;
        let mut handle = provider.handle();
        assert_eq!(handle.current(), "C_002");

        let session = StaticIdentitySession::signed_in(ClaimsDocument::from(
            json!({ "groups": ["Customers"], "db_id": "C_321" }),
        ));
        SignInFlow::new(writer, &config)
            .complete(&session)
            .await
            .unwrap();

        wait_for(&mut handle, "C_321", WAIT).await.unwrap();
        provider.unmount().await;

        // A fresh open behaves like a reload.
        let reloaded = open_durable(dir.path(), "shared", "reload").await.unwrap();
        let record = reloaded.record().await;
        assert_eq!(record.active_portal, Some(PortalKind::Customer));
        assert_eq!(record.identifiers[&PortalKind::Customer], "C_321");
    }
}
