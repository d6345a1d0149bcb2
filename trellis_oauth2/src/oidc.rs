//! OpenID Connect discovery
//!
//! Resolves a provider's published configuration document so deployments
//! only need to be configured with the provider's base URL.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::KeySourceError;

/// The subset of the discovery document used to configure an authority
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OidcConfiguration {
    /// The issuer that will appear in the `iss` claim of minted tokens
    pub issuer: String,
    /// The URL of the provider's published key set
    pub jwks_uri: String,
}

/// Fetches the OIDC discovery document from the given URL
///
/// # Errors
///
/// Returns an error if the document cannot be retrieved or parsed.
pub async fn fetch_oidc_configuration(uri: &str) -> Result<OidcConfiguration, KeySourceError> {
    let client = Client::builder()
        .user_agent(concat!("trellis_oauth2/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(KeySourceError::new)?;

    let response = client
        .get(uri)
        .send()
        .await
        .map_err(KeySourceError::new)?;
    let response = response
        .error_for_status()
        .map_err(KeySourceError::new)?;

    let document = response
        .json::<OidcConfiguration>()
        .await
        .map_err(KeySourceError::new)?;

    Ok(document)
}
