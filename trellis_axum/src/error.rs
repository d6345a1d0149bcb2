//! The wire shape of authentication and authorization failures
//!
//! Every failure kind keeps a distinct machine-readable `code` so clients
//! and test suites can tell exactly why a request was refused, rather than
//! receiving one opaque "invalid token" answer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use trellis::error::{ClaimsRejected, JwtVerifyError};
use trellis_oauth2::AuthorityError;

/// The JSON body returned for a refused request
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// A stable, machine-readable failure code
    pub code: &'static str,
    /// A human-readable description of the failure
    pub description: &'static str,
}

/// A request was refused at the authentication/authorization boundary
#[derive(Debug, Error)]
pub enum AuthRejection {
    /// No `Authorization` header was presented at all
    ///
    /// Detected before any verification runs; never silently treated as an
    /// anonymous request.
    #[error("authorization header is missing")]
    MissingAuthorization,

    /// The `Authorization` header is not exactly `Bearer <token>`
    #[error("authorization header is malformed")]
    MalformedAuthorization,

    /// The token failed verification or was denied by policy
    #[error(transparent)]
    Verification(#[from] AuthorityError),
}

impl AuthRejection {
    /// The status code and body this rejection maps to on the wire
    #[must_use]
    pub fn status_and_body(&self) -> (StatusCode, ErrorBody) {
        match self {
            Self::MissingAuthorization => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "authorization_header_missing",
                    description: "Authorization header is expected.",
                },
            ),
            Self::MalformedAuthorization => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "invalid_header",
                    description: "Authorization header must be a bearer token.",
                },
            ),
            Self::Verification(AuthorityError::UnknownKey) => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "unknown_signing_key",
                    description: "Unable to find an appropriate key to verify the token.",
                },
            ),
            Self::Verification(AuthorityError::Unavailable(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorBody {
                    code: "verification_unavailable",
                    description: "Token verification is temporarily unavailable.",
                },
            ),
            Self::Verification(AuthorityError::PolicyDenial(_)) => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    code: "unauthorized",
                    description: "Permission not found.",
                },
            ),
            Self::Verification(AuthorityError::JwtVerifyError(err)) => {
                (StatusCode::UNAUTHORIZED, jwt_error_body(err))
            }
        }
    }
}

fn jwt_error_body(err: &JwtVerifyError) -> ErrorBody {
    match err {
        JwtVerifyError::ClaimsRejected(ClaimsRejected::TokenExpired) => ErrorBody {
            code: "token_expired",
            description: "Token expired.",
        },
        JwtVerifyError::ClaimsRejected(ClaimsRejected::TokenNotYetValid) => ErrorBody {
            code: "token_not_yet_valid",
            description: "Token is not yet valid.",
        },
        JwtVerifyError::ClaimsRejected(ClaimsRejected::InvalidAlgorithm) => ErrorBody {
            code: "unsupported_algorithm",
            description: "Token is signed with an unsupported algorithm.",
        },
        JwtVerifyError::ClaimsRejected(_) => ErrorBody {
            code: "invalid_claims",
            description: "Incorrect claims. Please, check the audience and issuer.",
        },
        JwtVerifyError::JwkVerifyError(err) if err.is_signature_mismatch() => ErrorBody {
            code: "invalid_signature",
            description: "Token signature could not be verified.",
        },
        JwtVerifyError::JwkVerifyError(_) => ErrorBody {
            code: "unsupported_algorithm",
            description: "Token is signed with an unsupported algorithm.",
        },
        JwtVerifyError::MalformedTokenPayload(_) => ErrorBody {
            code: "claims_malformed",
            description: "Unable to parse token claims.",
        },
        JwtVerifyError::MalformedToken(_)
        | JwtVerifyError::MalformedTokenHeader(_)
        | JwtVerifyError::MalformedTokenSignature(_) => ErrorBody {
            code: "token_malformed",
            description: "Unable to parse authentication token.",
        },
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        tracing::debug!(
            http.status_code = status.as_u16(),
            auth.code = body.code,
            "request refused at the auth boundary",
        );
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_header_maps_to_the_documented_contract() {
        let (status, body) = AuthRejection::MissingAuthorization.status_and_body();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.code, "authorization_header_missing");
        assert_eq!(body.description, "Authorization header is expected.");
    }

    #[test]
    fn policy_denial_maps_to_403_unauthorized() {
        let rejection = AuthRejection::Verification(AuthorityError::PolicyDenial(
            trellis_oauth2::InsufficientPermissions,
        ));

        let (status, body) = rejection.status_and_body();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.code, "unauthorized");
        assert_eq!(body.description, "Permission not found.");
    }

    #[test]
    fn expired_token_keeps_its_own_code() {
        let rejection = AuthRejection::Verification(AuthorityError::JwtVerifyError(
            JwtVerifyError::ClaimsRejected(ClaimsRejected::TokenExpired),
        ));

        let (status, body) = rejection.status_and_body();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.code, "token_expired");
    }

    #[test]
    fn unavailable_key_source_is_a_server_side_failure() {
        let rejection = AuthRejection::Verification(AuthorityError::Unavailable(
            trellis_oauth2::KeySourceError::new("connection refused"),
        ));

        let (status, body) = rejection.status_and_body();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.code, "verification_unavailable");
    }
}
