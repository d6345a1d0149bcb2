//! Token authorization against a refreshable JWKS authority, with
//! permission-scoped access policies
//!
//! This crate composes the verification primitives from [`trellis`] into an
//! [`Authority`]: give it the identity provider's key set (fixed, or fetched
//! from the published JWKS endpoint) and a validation plan, and it turns raw
//! bearer tokens into typed, verified claims or into one of a small set of
//! precisely-distinguished failures.
//!
//! Access control is expressed as a [`PermissionPolicy`] evaluated against
//! the permission set the token was granted. Protecting a mutating endpoint
//! with a single named permission looks like:
//!
//! ```
//! use trellis_oauth2::{permissions, PermissionPolicy};
//!
//! let policy = PermissionPolicy::allow_one(permissions!["post:plants"]);
//! assert!(policy.evaluate(&permissions!["post:plants"]).is_ok());
//! assert!(policy.evaluate(&permissions!["post:observations"]).is_err());
//! ```
//!
//! # Feature flags
//!
//! The `reqwest` feature enables [`RemoteJwks`] and OIDC discovery. This
//! crate does not choose a TLS implementation for `reqwest`; if nothing else
//! in your application does, enable the `default-tls` or `rustls-tls`
//! feature.

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod authority;
#[cfg(feature = "reqwest")]
pub mod oidc;
pub mod permission;
mod policy;
#[cfg(feature = "reqwest")]
mod remote;

pub use authority::{
    Authority, AuthorityError, KeySetSource, KeySourceError, DEFAULT_KEY_TTL,
};
pub use permission::{
    ClaimsWithPermissions, HasPermissions, InvalidPermission, Permission, PermissionRef,
    PermissionSet,
};
pub use policy::{InsufficientPermissions, PermissionPolicy};
#[cfg(feature = "reqwest")]
pub use remote::{RemoteJwks, DEFAULT_FETCH_TIMEOUT};
