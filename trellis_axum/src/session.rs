//! Extractors for the browser-session side of authentication
//!
//! Browser pages authenticate with a server-side session rather than a
//! bearer header. The application's session layer is responsible for
//! inserting a [`SessionContext`] into the request extensions once the
//! login callback has provisioned the user; these extractors read it back
//! out.

use std::convert::Infallible;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use trellis_provision::SessionContext;

/// The session, if the request has one
///
/// Never rejects; pages that render differently for visitors and
/// authenticated users branch on the inner [`Option`].
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Option<SessionContext>);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<SessionContext>().cloned()))
    }
}

/// Requires an authenticated session, redirecting visitors to the home
/// page (where the login link lives) instead of failing hard
#[derive(Debug, Clone)]
pub struct RequireSession(pub SessionContext);

/// The rejection issued when a session-requiring endpoint has no session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginRedirect;

impl IntoResponse for LoginRedirect {
    fn into_response(self) -> Response {
        Redirect::to("/").into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequireSession
where
    S: Send + Sync,
{
    type Rejection = LoginRedirect;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionContext>()
            .cloned()
            .map(Self)
            .ok_or(LoginRedirect)
    }
}
