//! # Nova Auth
//!
//! Boundary with the external identity provider.
//!
//! The portal core never talks to the provider directly. It consumes an
//! [`IdentitySession`], which answers three questions: is the user signed
//! in, what does their decoded ID token say, and what does the user-info
//! endpoint say.
//!
//! ## Implementations
//!
//! - [`JwtIdentitySession`]: decodes a raw ID token, optionally verifying it
//! - [`StaticIdentitySession`]: pre-decoded claims, for tests and offline use

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod jwt;
pub mod session;
pub mod static_session;
pub mod userinfo;

pub use error::AuthError;
pub use jwt::{IdTokenDecoder, JwtDecoderConfig, JwtIdentitySession};
pub use session::IdentitySession;
pub use static_session::StaticIdentitySession;
pub use userinfo::UserInfoClient;
