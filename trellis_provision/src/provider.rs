//! HTTP clients for the identity provider's collaborator endpoints
//!
//! Two endpoints matter to provisioning: the administrative API that
//! attaches a role to an identity (authenticated by a separately-obtained
//! machine-to-machine credential), and the `userinfo` endpoint that asserts
//! an identity's profile (authenticated by the end user's own access
//! token). Every request carries a bounded timeout so a hung provider
//! surfaces as a provisioning failure rather than a stalled login.

use std::{fmt, time::Duration};

use aliri_braid::braid;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use trellis::jwt::{Subject, SubjectRef};

use crate::{
    provision::{Profile, ProfileFetchError, ProfileSource, RoleAdministrator, RoleAssignmentError},
    user::Role,
};

/// The default bound applied to each provider request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The provider client could not be configured
#[derive(Debug, Error)]
#[error("invalid provider client configuration")]
pub struct ProviderConfigError {
    #[from]
    source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl ProviderConfigError {
    fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// An access token presented to provider endpoints
///
/// This type provides custom implementations of [`Display`][AccessTokenRef#impl-Display]
/// and [`Debug`][AccessTokenRef#impl-Debug] to prevent unintentional
/// disclosure of sensitive values.
#[braid(
    serde,
    debug = "owned",
    display = "owned",
    ref_doc = "\
    A borrowed reference to an [`AccessToken`]\n\
    \n\
    This type provides custom implementations of [`Display`][Self#impl-Display] and \
    [`Debug`][Self#impl-Debug] to prevent unintentional disclosure of sensitive values.
    "
)]
pub struct AccessToken;

impl fmt::Debug for AccessTokenRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(concat!("***", "ACCESS TOKEN", "***"))
    }
}

impl fmt::Display for AccessTokenRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(concat!("***", "ACCESS TOKEN", "***"))
    }
}

/// A provider-side role identifier, e.g. `rol_a1B2c3`
#[braid(serde, ref_doc = "A borrowed reference to a [`RoleId`]")]
pub struct RoleId;

/// Maps the closed local role set onto the provider's role identifiers
#[derive(Debug, Clone)]
pub struct RoleMapping {
    admin: RoleId,
    public: RoleId,
}

impl RoleMapping {
    /// Constructs a mapping from the provider role ids for each local role
    pub fn new(admin: RoleId, public: RoleId) -> Self {
        Self { admin, public }
    }

    /// The provider role id for the given local role
    #[must_use]
    pub fn role_id(&self, role: Role) -> &RoleIdRef {
        match role {
            Role::Admin => &self.admin,
            Role::Public => &self.public,
        }
    }
}

#[derive(Debug, Serialize)]
struct RoleAssignmentDto<'a> {
    roles: [&'a RoleIdRef; 1],
}

/// A client for the provider's administrative API
///
/// Requires a machine-to-machine credential obtained out of band; acquiring
/// and refreshing that credential is the caller's concern.
#[derive(Debug)]
pub struct ManagementApiClient {
    client: reqwest::Client,
    api_base: reqwest::Url,
    token: AccessToken,
    roles: RoleMapping,
}

impl ManagementApiClient {
    /// Constructs a client for the provider's administrative API
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client
    /// cannot be constructed.
    pub fn new(
        api_base: &str,
        token: AccessToken,
        roles: RoleMapping,
    ) -> Result<Self, ProviderConfigError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("trellis_provision/", env!("CARGO_PKG_VERSION")))
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(ProviderConfigError::new)?;

        Self::with_client(client, api_base, token, roles)
    }

    /// Constructs a client over an existing HTTP client
    ///
    /// The client should already carry a request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid.
    pub fn with_client(
        client: reqwest::Client,
        api_base: &str,
        token: AccessToken,
        roles: RoleMapping,
    ) -> Result<Self, ProviderConfigError> {
        let api_base = api_base
            .parse::<reqwest::Url>()
            .map_err(ProviderConfigError::new)?;

        Ok(Self {
            client,
            api_base,
            token,
            roles,
        })
    }

    fn roles_url(&self, subject: &SubjectRef) -> Result<reqwest::Url, RoleAssignmentError> {
        // Subjects like `auth0|123` carry bytes that must be escaped in a path.
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| RoleAssignmentError::new("administrative API base URL cannot be a base"))?
            .pop_if_empty()
            .extend(["api", "v2", "users", subject.as_str(), "roles"]);
        Ok(url)
    }
}

#[async_trait]
impl RoleAdministrator for ManagementApiClient {
    #[tracing::instrument(skip(self), fields(user.subject = %subject, user.role = %role))]
    async fn assign_role(
        &self,
        subject: &SubjectRef,
        role: Role,
    ) -> Result<(), RoleAssignmentError> {
        let url = self.roles_url(subject)?;
        let body = RoleAssignmentDto {
            roles: [self.roles.role_id(role)],
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(self.token.as_str())
            .json(&body)
            .send()
            .await
            .map_err(RoleAssignmentError::new)?;

        if let Err(err) = response.error_for_status_ref() {
            tracing::warn!(
                http.status_code = response.status().as_u16(),
                "role assignment rejected by the administrative API",
            );
            return Err(RoleAssignmentError::new(err));
        }

        tracing::debug!("role assigned");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct UserInfoDto {
    sub: Subject,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

/// A client for the provider's `userinfo` endpoint
///
/// Constructed per login with the access token minted for that login, since
/// `userinfo` answers for the token's own subject.
#[derive(Debug)]
pub struct UserInfoClient {
    client: reqwest::Client,
    userinfo_url: reqwest::Url,
    token: AccessToken,
}

impl UserInfoClient {
    /// Constructs a client for the given `userinfo` URL and user token
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// constructed.
    pub fn new(userinfo_url: &str, token: AccessToken) -> Result<Self, ProviderConfigError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("trellis_provision/", env!("CARGO_PKG_VERSION")))
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(ProviderConfigError::new)?;

        Self::with_client(client, userinfo_url, token)
    }

    /// Constructs a client over an existing HTTP client
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn with_client(
        client: reqwest::Client,
        userinfo_url: &str,
        token: AccessToken,
    ) -> Result<Self, ProviderConfigError> {
        let userinfo_url = userinfo_url
            .parse::<reqwest::Url>()
            .map_err(ProviderConfigError::new)?;

        Ok(Self {
            client,
            userinfo_url,
            token,
        })
    }
}

#[async_trait]
impl ProfileSource for UserInfoClient {
    #[tracing::instrument(skip(self), fields(user.subject = %subject))]
    async fn fetch_profile(&self, subject: &SubjectRef) -> Result<Profile, ProfileFetchError> {
        let response = self
            .client
            .get(self.userinfo_url.clone())
            .bearer_auth(self.token.as_str())
            .send()
            .await
            .map_err(ProfileFetchError::new)?;
        let response = response
            .error_for_status()
            .map_err(ProfileFetchError::new)?;

        let info = response
            .json::<UserInfoDto>()
            .await
            .map_err(ProfileFetchError::new)?;

        if <Subject as AsRef<SubjectRef>>::as_ref(&info.sub) != subject {
            return Err(ProfileFetchError::new(
                "userinfo response subject does not match the authenticated identity",
            ));
        }

        let name = info
            .name
            .or_else(|| info.nickname.clone())
            .unwrap_or_else(|| subject.as_str().to_string());
        let username = info
            .email
            .or(info.nickname)
            .unwrap_or_else(|| subject.as_str().to_string());

        Ok(Profile {
            name,
            username,
            picture: info.picture,
        })
    }
}
