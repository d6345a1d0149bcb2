//! Axum integration for bearer-token verification and permission-scoped
//! endpoint guards
//!
//! The boundary runs in two stages, each independently testable and each
//! refused with its own machine-readable code:
//!
//! 1. **Token verification**: the `Authorization` header is located and
//!    split (a missing header and a malformed header are distinct
//!    precondition failures, raised before any cryptography runs), then the
//!    token is verified by the [`Authority`][trellis_oauth2::Authority]
//!    taken from the router state.
//! 2. **Permission check**: the verified claims are evaluated against the
//!    endpoint's [`PermissionPolicy`][trellis_oauth2::PermissionPolicy]; a
//!    valid token without the required permissions is refused with `403`
//!    and `{"code": "unauthorized", "description": "Permission not found."}`.
//!
//! ```no_run
//! use axum::routing::{get, post};
//! use axum::extract::FromRef;
//! use axum::Router;
//! use trellis::{jwt, Jwks};
//! use trellis_axum::permission_guards;
//! use trellis_oauth2::Authority;
//!
//! permission_guards! {
//!     pub guard PostPlants = "post:plants";
//!     pub guard AnyValidToken = *;
//! }
//!
//! #[derive(Clone)]
//! struct AppState {
//!     authority: Authority,
//! }
//!
//! impl FromRef<AppState> for Authority {
//!     fn from_ref(state: &AppState) -> Authority {
//!         state.authority.clone()
//!     }
//! }
//!
//! async fn new_plant(_guard: PostPlants) -> &'static str {
//!     "created"
//! }
//!
//! async fn whoami(guard: AnyValidToken) -> String {
//!     format!("{:?}", guard.claims().basic)
//! }
//!
//! let authority = Authority::new(Jwks::default(), jwt::CoreValidator::default());
//! let router: Router = Router::new()
//!     .route("/plants/new", post(new_plant))
//!     .route("/whoami", get(whoami))
//!     .with_state(AppState { authority });
//! # let _ = router;
//! ```
//!
//! Browser pages that authenticate with a server-side session instead use
//! [`RequireSession`], which redirects to the home page (where the login
//! link lives) rather than failing hard.

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

use http::request::Parts;
use trellis::Jwt;
use trellis_oauth2::HasPermissions;

mod error;
mod macros;
mod session;

pub use error::{AuthRejection, ErrorBody};
pub use session::{CurrentSession, LoginRedirect, RequireSession};

/// The permission policy an endpoint guard enforces
pub trait EndpointPolicy {
    /// The claims structure extracted and returned when authorized
    type Claims: HasPermissions;

    /// The policy evaluated when this guard protects an endpoint
    fn policy() -> &'static trellis_oauth2::PermissionPolicy;
}

/// Locates and splits the `Authorization` header
///
/// The header must consist of exactly two whitespace-separated parts, the
/// first being `Bearer` (case-insensitive). Absence and malformation are
/// distinct failures.
fn extract_bearer(parts: &Parts) -> Result<Jwt, AuthRejection> {
    let header = parts
        .headers
        .get(http::header::AUTHORIZATION)
        .ok_or(AuthRejection::MissingAuthorization)?;

    let value = header
        .to_str()
        .map_err(|_| AuthRejection::MalformedAuthorization)?;

    let mut split = value.split_whitespace();
    match (split.next(), split.next(), split.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => {
            Ok(Jwt::from(token))
        }
        _ => Err(AuthRejection::MalformedAuthorization),
    }
}

#[doc(hidden)]
pub mod __private {
    use axum::extract::FromRef;
    use http::request::Parts;
    pub use once_cell::sync::OnceCell;
    pub use trellis_oauth2::{
        Authority, ClaimsWithPermissions as DefaultClaims, PermissionPolicy,
    };

    use crate::AuthRejection;

    pub async fn verify<Claims, S>(
        parts: &mut Parts,
        state: &S,
        policy: &'static PermissionPolicy,
    ) -> Result<Claims, AuthRejection>
    where
        Claims: for<'de> serde::Deserialize<'de>
            + trellis_oauth2::HasPermissions
            + trellis::jwt::CoreClaims,
        Authority: FromRef<S>,
    {
        let token = crate::extract_bearer(parts)?;
        let authority = Authority::from_ref(state);
        Ok(authority.verify_token::<Claims>(&token, policy).await?)
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        extract::FromRef,
        http::{Request, StatusCode},
        routing::{get, patch, post},
        Router,
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use trellis::{b64::Base64Url, jwa, jwk, jwt, jwt::CoreClaims as _, Jwk, Jwks, Jwt};
    use trellis_clock::{Clock, System, UnixTime};
    use trellis_oauth2::{permissions, Authority, ClaimsWithPermissions, PermissionSet};
    use trellis_provision::{LocalUser, Role, SessionContext, UserId};

    use super::*;

    crate::permission_guards! {
        pub guard PostPlants = "post:plants";
        pub guard EditOrDeletePlants = "edit_or_delete:plants";
        pub guard AnyValidToken = *;
    }

    const ISSUER: &str = "https://issuer.example.com/";
    const AUDIENCE: &str = "plants-api";
    const KID: &str = "test-key";

    #[derive(Clone)]
    struct AppState {
        authority: Authority,
    }

    impl FromRef<AppState> for Authority {
        fn from_ref(state: &AppState) -> Authority {
            state.authority.clone()
        }
    }

    fn signing_key() -> Jwk {
        Jwk::from(jwa::Hmac::new(Base64Url::from_raw(&b"boundary-secret"[..])))
            .with_algorithm(jwa::Algorithm::HS256)
            .with_key_id(jwk::KeyId::from(KID))
    }

    fn authority() -> Authority {
        let mut jwks = Jwks::default();
        jwks.add_key(signing_key());

        let validator = jwt::CoreValidator::default()
            .add_approved_algorithm(jwa::Algorithm::HS256)
            .add_allowed_audience(jwt::Audience::from_static(AUDIENCE))
            .require_issuer(jwt::Issuer::from_static(ISSUER));

        Authority::new(jwks, validator)
    }

    fn token(permissions: PermissionSet, expires_in: i64) -> Jwt {
        let now = System.now().0 as i64;
        let claims = ClaimsWithPermissions {
            basic: jwt::BasicClaims::new()
                .with_audience(jwt::Audience::from_static(AUDIENCE))
                .with_issuer(jwt::Issuer::from_static(ISSUER))
                .with_subject(jwt::Subject::from("auth0|123"))
                .with_expiration(UnixTime((now + expires_in).max(0) as u64)),
            permissions,
        };

        let headers = jwt::BasicHeaders::with_key_id(jwa::Algorithm::HS256, jwk::KeyId::from(KID));
        Jwt::try_from_parts_with_signature(&headers, &claims, &signing_key())
            .expect("signing with an HMAC key succeeds")
    }

    async fn new_plant(_guard: PostPlants) -> &'static str {
        "created"
    }

    async fn edit_plant(_guard: EditOrDeletePlants) -> &'static str {
        "edited"
    }

    async fn whoami(guard: AnyValidToken) -> String {
        guard
            .claims()
            .basic
            .sub()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default()
    }

    async fn dashboard(RequireSession(session): RequireSession) -> String {
        session.local_user().username.clone()
    }

    fn router() -> Router {
        Router::new()
            .route("/plants/new", post(new_plant))
            .route("/plants/edit", patch(edit_plant))
            .route("/whoami", get(whoami))
            .route("/dashboard", get(dashboard))
            .with_state(AppState {
                authority: authority(),
            })
    }

    fn request(method: &str, uri: &str, bearer: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).expect("request is well formed")
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body can be read")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("body is JSON")
    }

    #[tokio::test]
    async fn permitted_token_reaches_the_handler() {
        let response = router()
            .oneshot(request(
                "POST",
                "/plants/new",
                Some(token(permissions!["post:plants"], 300).as_str()),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_header_is_401_with_the_documented_body() {
        let response = router()
            .oneshot(request("POST", "/plants/new", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(response).await;
        assert_eq!(body["code"], "authorization_header_missing");
        assert_eq!(body["description"], "Authorization header is expected.");
    }

    #[tokio::test]
    async fn malformed_header_is_distinct_from_missing() {
        for bad in ["Token abc", "Bearer", "Bearer one two"] {
            let response = router()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/plants/new")
                        .header("Authorization", bad)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            let body = body_json(response).await;
            assert_eq!(body["code"], "invalid_header", "header: {bad}");
        }
    }

    #[tokio::test]
    async fn valid_token_without_the_permission_is_403_unauthorized() {
        let response = router()
            .oneshot(request(
                "PATCH",
                "/plants/edit",
                Some(token(PermissionSet::empty(), 300).as_str()),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = body_json(response).await;
        assert_eq!(body["code"], "unauthorized");
        assert_eq!(body["description"], "Permission not found.");
    }

    #[tokio::test]
    async fn wrong_permission_does_not_satisfy_the_guard() {
        let response = router()
            .oneshot(request(
                "POST",
                "/plants/new",
                Some(token(permissions!["post:observations"], 300).as_str()),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn expired_token_reports_token_expired() {
        let response = router()
            .oneshot(request(
                "POST",
                "/plants/new",
                Some(token(permissions!["post:plants"], -60).as_str()),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(response).await;
        assert_eq!(body["code"], "token_expired");
        assert_eq!(body["description"], "Token expired.");
    }

    #[tokio::test]
    async fn garbage_token_reports_token_malformed() {
        let response = router()
            .oneshot(request("GET", "/whoami", Some("not-a-token")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(response).await;
        assert_eq!(body["code"], "token_malformed");
    }

    #[tokio::test]
    async fn verification_only_guard_admits_any_valid_token() {
        let response = router()
            .oneshot(request(
                "GET",
                "/whoami",
                Some(token(PermissionSet::empty(), 300).as_str()),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"auth0|123");
    }

    #[tokio::test]
    async fn missing_session_redirects_to_the_login_page() {
        let response = router()
            .oneshot(request("GET", "/dashboard", None))
            .await
            .unwrap();

        assert!(response.status().is_redirection());
        assert_eq!(response.headers()["location"], "/");
    }

    #[tokio::test]
    async fn session_bearing_request_reaches_the_handler() {
        let session = SessionContext::new(
            ClaimsWithPermissions {
                basic: jwt::BasicClaims::new()
                    .with_issuer(jwt::Issuer::from_static(ISSUER))
                    .with_subject(jwt::Subject::from("auth0|123")),
                permissions: PermissionSet::empty(),
            },
            LocalUser {
                id: UserId(1),
                subject: jwt::Subject::from("auth0|123"),
                name: "Rosa Chan".to_string(),
                username: "rosa@example.com".to_string(),
                role: Role::Public,
                created_at: UnixTime(1_700_000_000),
            },
        );

        let response = router()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/dashboard")
                    .extension(session)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"rosa@example.com");
    }
}
