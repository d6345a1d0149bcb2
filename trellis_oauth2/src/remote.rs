//! A key set source backed by a provider's published JWKS endpoint

use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use reqwest::{
    header::{self, HeaderValue},
    Client, StatusCode,
};
use trellis::Jwks;

use crate::{KeySetSource, KeySourceError};

/// The default bound applied to each request to the JWKS endpoint
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Default)]
struct Conditional {
    etag: Option<HeaderValue>,
    last_modified: Option<HeaderValue>,
}

/// Fetches the published key set over HTTPS
///
/// Uses `ETag`/`Last-Modified` conditional requests so an unchanged key set
/// costs a `304` rather than a re-download. Every request is bounded by a
/// timeout; a hung endpoint surfaces as [`KeySourceError`] rather than a
/// stalled verification.
#[derive(Debug)]
pub struct RemoteJwks {
    client: Client,
    jwks_url: reqwest::Url,
    conditional: Mutex<Conditional>,
}

impl RemoteJwks {
    /// Constructs a source for the given JWKS URL with the default timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// constructed.
    pub fn new(jwks_url: &str) -> Result<Self, KeySourceError> {
        Self::with_timeout(jwks_url, DEFAULT_FETCH_TIMEOUT)
    }

    /// Constructs a source with an explicit per-request timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// constructed.
    pub fn with_timeout(jwks_url: &str, timeout: Duration) -> Result<Self, KeySourceError> {
        let client = Client::builder()
            .user_agent(concat!("trellis_oauth2/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(KeySourceError::new)?;

        Self::with_client(client, jwks_url)
    }

    /// Constructs a source over an existing HTTP client
    ///
    /// The client should already carry a request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn with_client(client: Client, jwks_url: &str) -> Result<Self, KeySourceError> {
        let jwks_url = jwks_url
            .parse::<reqwest::Url>()
            .map_err(KeySourceError::new)?;

        Ok(Self {
            client,
            jwks_url,
            conditional: Mutex::new(Conditional::default()),
        })
    }
}

#[async_trait]
impl KeySetSource for RemoteJwks {
    #[tracing::instrument(skip(self), fields(jwks.url = %self.jwks_url))]
    async fn fetch_keys(&self) -> Result<Option<Jwks>, KeySourceError> {
        tracing::debug!("fetching key set");
        let mut request = self.client.get(self.jwks_url.clone());

        {
            let conditional = self
                .conditional
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(etag) = &conditional.etag {
                request = request.header(header::IF_NONE_MATCH, etag);
            } else if let Some(last_modified) = &conditional.last_modified {
                request = request.header(header::IF_MODIFIED_SINCE, last_modified);
            }
        }

        let response = request.send().await.map_err(KeySourceError::new)?;

        if response.status() == StatusCode::NOT_MODIFIED {
            tracing::debug!("key set not modified");
            return Ok(None);
        } else if let Err(err) = response.error_for_status_ref() {
            tracing::warn!(
                http.status_code = response.status().as_u16(),
                "key set fetch failed; unexpected response status",
            );
            return Err(KeySourceError::new(err));
        }

        let etag = response.headers().get(header::ETAG).map(ToOwned::to_owned);
        let last_modified = response
            .headers()
            .get(header::LAST_MODIFIED)
            .map(ToOwned::to_owned);

        let jwks = response
            .json::<Jwks>()
            .await
            .map_err(KeySourceError::new)?;

        {
            let mut conditional = self
                .conditional
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            conditional.etag = etag;
            conditional.last_modified = last_modified;
        }

        Ok(Some(jwks))
    }
}
