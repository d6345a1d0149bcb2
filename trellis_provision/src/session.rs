//! The authenticated identity carried through a browser session

use std::sync::Arc;

use trellis_oauth2::ClaimsWithPermissions;

use crate::user::LocalUser;

#[derive(Debug)]
struct SessionInner {
    claims: ClaimsWithPermissions,
    user: LocalUser,
}

/// The verified claims and local user record for an authenticated session
///
/// Constructed once, after callback-time provisioning, and read-only from
/// then on: nothing mutates a session in place, and logout destroys the
/// value rather than transitioning it through partial states. Identity is
/// always read from a context passed by value or reference, never from
/// ambient shared state.
///
/// Cloning is cheap; the claims and user record are shared behind an [`Arc`].
#[derive(Debug, Clone)]
pub struct SessionContext {
    inner: Arc<SessionInner>,
}

impl SessionContext {
    /// Constructs the context for a freshly-authenticated session
    #[must_use]
    pub fn new(claims: ClaimsWithPermissions, user: LocalUser) -> Self {
        Self {
            inner: Arc::new(SessionInner { claims, user }),
        }
    }

    /// Whether this session is authenticated
    ///
    /// A context only ever exists for an authenticated session, so this is
    /// always true; an unauthenticated request simply has no context.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        true
    }

    /// The verified claims this session was established from
    #[must_use]
    pub fn claims(&self) -> &ClaimsWithPermissions {
        &self.inner.claims
    }

    /// The local user record for this session
    #[must_use]
    pub fn local_user(&self) -> &LocalUser {
        &self.inner.user
    }
}

#[cfg(test)]
mod tests {
    use trellis::jwt::{self, CoreClaims as _, Subject};
    use trellis_clock::UnixTime;
    use trellis_oauth2::PermissionSet;

    use super::*;
    use crate::user::{Role, UserId};

    #[test]
    fn exposes_claims_and_user() {
        let claims = ClaimsWithPermissions {
            basic: jwt::BasicClaims::new()
                .with_issuer(jwt::Issuer::from_static("authority"))
                .with_subject(Subject::from("auth0|123")),
            permissions: PermissionSet::empty(),
        };

        let user = LocalUser {
            id: UserId(7),
            subject: Subject::from("auth0|123"),
            name: "Rosa Chan".to_string(),
            username: "rosa@example.com".to_string(),
            role: Role::Public,
            created_at: UnixTime(1_700_000_000),
        };

        let session = SessionContext::new(claims, user);

        assert!(session.is_authenticated());
        assert_eq!(session.local_user().id, UserId(7));
        assert_eq!(
            session.claims().basic.iss().map(|i| i.as_str()),
            Some("authority")
        );
    }
}
