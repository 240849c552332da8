//! ID token decoding.
//!
//! Tokens can be decoded two ways:
//! - verified: HS256 signature, issuer, audience and expiry are checked
//! - payload-only: for tokens the provider SDK has already validated

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tracing::debug;

use nova_identity::ClaimsDocument;

use crate::{AuthError, IdentitySession, UserInfoClient};

/// Configuration for verified ID token decoding.
#[derive(Debug, Clone)]
pub struct JwtDecoderConfig {
    /// HS256 signing secret shared with the identity provider.
    pub jwt_secret: String,
    /// Expected issuer (e.g., "https://id.example.com/oauth2/token").
    pub issuer: String,
    /// Expected audience (the portal's client id).
    pub audience: String,
}

/// Decodes ID tokens into claims documents.
pub enum IdTokenDecoder {
    /// Check signature, issuer, audience and expiry.
    Verified {
        /// Key for signature checks.
        decoding_key: DecodingKey,
        /// Validation rules.
        validation: Box<Validation>,
    },
    /// Trust the token and read its payload only.
    PayloadOnly,
}

impl IdTokenDecoder {
    /// Creates a verifying decoder.
    pub fn verified(config: &JwtDecoderConfig) -> Self {
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&[&config.audience]);
        validation.validate_exp = true;
        validation.validate_nbf = false;

        Self::Verified {
            decoding_key,
            validation: Box::new(validation),
        }
    }

    /// Creates a decoder that reads the payload without checks.
    pub fn payload_only() -> Self {
        Self::PayloadOnly
    }

    /// Decodes `token` into its claims.
    ///
    /// # Errors
    ///
    /// * [`AuthError::TokenExpired`] for an expired token (verified mode)
    /// * [`AuthError::InvalidCredentials`] for bad signature, issuer or audience
    /// * [`AuthError::MalformedToken`] if the token is not a JWT with a JSON payload
    pub fn decode(&self, token: &str) -> Result<ClaimsDocument, AuthError> {
        match self {
            Self::Verified {
                decoding_key,
                validation,
            } => {
                let data = decode::<Value>(token, decoding_key, validation).map_err(|e| {
                    match e.kind() {
                        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                        ErrorKind::InvalidToken
                        | ErrorKind::Base64(_)
                        | ErrorKind::Json(_)
                        | ErrorKind::Utf8(_) => AuthError::MalformedToken(e.to_string()),
                        _ => AuthError::InvalidCredentials,
                    }
                })?;
                Ok(ClaimsDocument::from(data.claims))
            },
            Self::PayloadOnly => decode_payload(token),
        }
    }
}

impl std::fmt::Debug for IdTokenDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Verified { .. } => f.write_str("IdTokenDecoder::Verified"),
            Self::PayloadOnly => f.write_str("IdTokenDecoder::PayloadOnly"),
        }
    }
}

fn decode_payload(token: &str) -> Result<ClaimsDocument, AuthError> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(AuthError::MalformedToken("expected three segments".into())),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::MalformedToken(format!("payload is not base64url: {e}")))?;

    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedToken(format!("payload is not JSON: {e}")))?;

    if !value.is_object() {
        return Err(AuthError::MalformedToken("payload is not an object".into()));
    }

    Ok(ClaimsDocument::from(value))
}

/// Identity session backed by a raw ID token.
#[derive(Debug)]
pub struct JwtIdentitySession {
    id_token: Option<String>,
    access_token: Option<String>,
    decoder: IdTokenDecoder,
    user_info: Option<UserInfoClient>,
}

impl JwtIdentitySession {
    /// Creates a session for a signed-in user.
    pub fn new(id_token: impl Into<String>, decoder: IdTokenDecoder) -> Self {
        Self {
            id_token: Some(id_token.into()),
            access_token: None,
            decoder,
            user_info: None,
        }
    }

    /// A session with nobody signed in.
    pub fn signed_out() -> Self {
        Self {
            id_token: None,
            access_token: None,
            decoder: IdTokenDecoder::PayloadOnly,
            user_info: None,
        }
    }

    /// Enables the user-info endpoint, authenticated with `access_token`.
    pub fn with_user_info(mut self, client: UserInfoClient, access_token: impl Into<String>) -> Self {
        self.user_info = Some(client);
        self.access_token = Some(access_token.into());
        self
    }
}

#[async_trait]
impl IdentitySession for JwtIdentitySession {
    fn is_authenticated(&self) -> bool {
        self.id_token.is_some()
    }

    async fn decoded_id_token(&self) -> Result<ClaimsDocument, AuthError> {
        let token = self.id_token.as_deref().ok_or(AuthError::NotAuthenticated)?;
        let claims = self.decoder.decode(token)?;
        debug!(decoder = ?self.decoder, "ID token decoded");
        Ok(claims)
    }

    async fn user_info(&self) -> Result<Option<ClaimsDocument>, AuthError> {
        match (&self.user_info, &self.access_token) {
            (Some(client), Some(access_token)) => client.fetch(access_token).await.map(Some),
            _ => Ok(None),
        }
    }

    fn name(&self) -> &'static str {
        "jwt"
    }
}
