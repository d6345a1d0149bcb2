//! Bearer-token verification primitives for services fronted by an external
//! identity provider, including:
//!
//! * JSON Web Signature (JWS): [RFC7515][]
//! * JSON Web Key (JWK): [RFC7517][]
//! * JSON Web Algorithms (JWA): [RFC7518][]
//! * JSON Web Token (JWT): [RFC7519][]
//!
//! Only verification of externally-minted tokens is in scope. Symmetric
//! (HMAC) signing is retained so that tests and local tooling can mint
//! tokens without a provider round-trip; asymmetric private-key operations
//! are not implemented.
//!
//! [RFC7515]: https://tools.ietf.org/html/rfc7515
//! [RFC7517]: https://tools.ietf.org/html/rfc7517
//! [RFC7518]: https://tools.ietf.org/html/rfc7518
//! [RFC7519]: https://tools.ietf.org/html/rfc7519
//!
//! # Example
//!
//! ```
//! use trellis::b64::Base64Url;
//! use trellis::{jwa, jwk, jwt, jwt::CoreHeaders, jwt::HasAlgorithm, Jwk, Jwks, Jwt};
//!
//! let secret = Base64Url::from_raw(&b"test"[..]);
//! let key = Jwk::from(jwa::Hmac::new(secret))
//!     .with_algorithm(jwa::Algorithm::HS256)
//!     .with_key_id(jwk::KeyId::from_static("test key"));
//!
//! let mut keys = Jwks::default();
//! keys.add_key(key);
//!
//! let claims = jwt::BasicClaims::new()
//!     .with_audience(jwt::Audience::from_static("my_api"))
//!     .with_issuer(jwt::Issuer::from_static("authority"))
//!     .with_future_expiration(300);
//!
//! let headers = jwt::BasicHeaders::with_key_id(
//!     jwa::Algorithm::HS256,
//!     jwk::KeyId::from_static("test key"),
//! );
//!
//! let token = claims.sign(keys.keys().first().unwrap(), &headers).unwrap();
//!
//! let validator = jwt::CoreValidator::default()
//!     .add_approved_algorithm(jwa::Algorithm::HS256)
//!     .add_allowed_audience(jwt::Audience::from_static("my_api"))
//!     .require_issuer(jwt::Issuer::from_static("authority"));
//!
//! let decomposed: jwt::Decomposed = token.decompose().unwrap();
//! let key_ref = keys
//!     .get_key_by_opt(decomposed.kid(), decomposed.alg())
//!     .unwrap();
//!
//! let data: jwt::Validated = token.verify(key_ref, &validator).expect("token was invalid");
//! # let _ = data;
//! ```

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

pub mod b64;
pub mod error;
pub mod jwa;
pub mod jwk;
mod jwks;
pub mod jws;
pub mod jwt;

#[doc(inline)]
pub use jwk::Jwk;
#[doc(inline)]
pub use jwks::Jwks;
#[doc(inline)]
pub use jwt::{Jwt, JwtRef};
