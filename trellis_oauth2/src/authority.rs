//! A token-verification authority backed by a refreshable key set

use std::{error::Error as StdError, fmt, sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use trellis::{
    jwt::{self, CoreHeaders, HasAlgorithm},
    Jwks, JwtRef,
};
use trellis_clock::{Clock, System, UnixTime};

use crate::{HasPermissions, InsufficientPermissions, PermissionPolicy};

/// How long a fetched key set is served before a verification consults the
/// source again
pub const DEFAULT_KEY_TTL: Duration = Duration::from_secs(300);

/// The signing key source could not be reached or its response could not be
/// understood
///
/// This is a retryable, caller-is-not-at-fault condition, distinct from a
/// token that actually failed verification.
#[derive(Debug, Error)]
#[error("signing key source unavailable")]
pub struct KeySourceError {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

impl KeySourceError {
    /// Wraps the underlying cause of the failure
    pub fn new(source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// An error preventing a token from being accepted by the authority
#[derive(Debug, Error)]
pub enum AuthorityError {
    /// No key matching the token header's specifications is known, even
    /// after consulting the key source
    #[error("no matching key found to validate the token")]
    UnknownKey,

    /// The key source could not be consulted, so the token could be neither
    /// accepted nor rejected
    #[error("token verification unavailable")]
    Unavailable(#[from] KeySourceError),

    /// The token was malformed or otherwise failed verification
    #[error("invalid token")]
    JwtVerifyError(#[from] trellis::error::JwtVerifyError),

    /// The token is valid but does not grant the level of authorization
    /// required
    #[error("access denied by policy")]
    PolicyDenial(#[from] InsufficientPermissions),
}

/// A source from which the authority can fetch the provider's current
/// published key set
#[async_trait]
pub trait KeySetSource: fmt::Debug + Send + Sync {
    /// Fetches the current key set
    ///
    /// Returns `Ok(None)` when the source can assert that the key set has
    /// not changed since the last fetch.
    ///
    /// # Errors
    ///
    /// Returns an error if the key set cannot be retrieved or parsed.
    async fn fetch_keys(&self) -> Result<Option<Jwks>, KeySourceError>;
}

#[derive(Debug)]
struct VolatileData {
    jwks: Jwks,
    fetched_at: UnixTime,
}

#[derive(Debug)]
struct Inner {
    data: ArcSwap<VolatileData>,
    source: Option<Arc<dyn KeySetSource>>,
    validator: jwt::CoreValidator,
    key_ttl: Duration,
}

/// An authority that verifies bearer tokens against a cached key set and
/// evaluates permission policies over the verified claims
///
/// The key set is replaced atomically on refresh; readers always observe
/// either the old or the new set, never a partially-updated one. When a
/// token names a key id that is not cached, the authority refreshes from its
/// source once and retries the lookup before rejecting the token.
#[derive(Debug, Clone)]
#[must_use]
pub struct Authority {
    inner: Arc<Inner>,
}

impl Authority {
    /// Constructs an authority over a fixed, local key set
    pub fn new(jwks: Jwks, validator: jwt::CoreValidator) -> Self {
        let data = VolatileData {
            jwks,
            fetched_at: System.now(),
        };

        Self {
            inner: Arc::new(Inner {
                data: ArcSwap::from_pointee(data),
                source: None,
                validator,
                key_ttl: DEFAULT_KEY_TTL,
            }),
        }
    }

    /// Constructs an authority that keeps its key set current from the given
    /// source, performing an initial fetch before returning
    ///
    /// # Errors
    ///
    /// Returns an error if the initial fetch fails.
    pub async fn from_source(
        source: impl KeySetSource + 'static,
        validator: jwt::CoreValidator,
        key_ttl: Duration,
    ) -> Result<Self, KeySourceError> {
        let jwks = source.fetch_keys().await?.unwrap_or_default();

        let data = VolatileData {
            jwks,
            fetched_at: System.now(),
        };

        Ok(Self {
            inner: Arc::new(Inner {
                data: ArcSwap::from_pointee(data),
                source: Some(Arc::new(source)),
                validator,
                key_ttl,
            }),
        })
    }

    /// Spawns a non-terminating background task that refreshes the key set
    /// on the given interval
    ///
    /// Refresh failures are ignored; the next tick tries again.
    #[cfg(feature = "tokio")]
    pub fn spawn_refresh(&self, interval: Duration) {
        let this = self.clone();

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await;

            loop {
                timer.tick().await;
                if let Err(err) = this.refresh().await {
                    let error: &dyn StdError = &err;
                    tracing::warn!(error, "background key set refresh failed");
                }
            }
        });
    }

    /// Refreshes the key set from the source
    ///
    /// No retries are attempted, and a failed refresh leaves the cached key
    /// set untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be consulted.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> Result<(), KeySourceError> {
        let source = match &self.inner.source {
            Some(source) => source,
            None => return Ok(()),
        };

        let fetched_at = System.now();
        match source.fetch_keys().await? {
            Some(jwks) => {
                self.inner
                    .data
                    .store(Arc::new(VolatileData { jwks, fetched_at }));
                tracing::info!("key set refreshed");
            }
            None => {
                let data = self.inner.data.load();
                self.inner.data.store(Arc::new(VolatileData {
                    jwks: data.jwks.clone(),
                    fetched_at,
                }));
                tracing::debug!("key set not modified");
            }
        }

        Ok(())
    }

    /// Replaces the cached key set directly
    pub fn set_jwks(&self, jwks: Jwks) {
        self.inner.data.store(Arc::new(VolatileData {
            jwks,
            fetched_at: System.now(),
        }));
    }

    fn is_stale(&self) -> bool {
        let data = self.inner.data.load();
        System.now().since(data.fetched_at) >= self.inner.key_ttl.as_secs()
    }

    /// Verifies the token and checks access according to the policy
    ///
    /// The declared algorithm is checked against the validation plan before
    /// any key is consulted, so a token using an unapproved algorithm is
    /// rejected without touching the key cache or the network.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is invalid, no usable key is known, the
    /// key source cannot be reached, or the policy denies the claims.
    pub async fn verify_token<T>(
        &self,
        token: &JwtRef,
        policy: &PermissionPolicy,
    ) -> Result<T, AuthorityError>
    where
        T: for<'de> Deserialize<'de> + HasPermissions + jwt::CoreClaims,
    {
        let decomposed: jwt::Decomposed = token.decompose()?;

        let alg = decomposed.alg();
        if !self.inner.validator.approves(alg) {
            return Err(trellis::error::JwtVerifyError::from(
                trellis::error::ClaimsRejected::InvalidAlgorithm,
            )
            .into());
        }

        let mut refreshed = false;
        if self.inner.source.is_some() && self.is_stale() {
            self.refresh().await?;
            refreshed = true;
        }

        let key_is_cached = {
            let guard = self.inner.data.load();
            guard.jwks.get_key_by_opt(decomposed.kid(), alg).is_some()
        };

        if !key_is_cached && !refreshed && self.inner.source.is_some() {
            // One refresh, then one more lookup. A second miss is final.
            self.refresh().await?;
        }

        let validated: jwt::Validated<T>;
        {
            let guard = self.inner.data.load();

            let key = {
                let kid = decomposed.kid();

                guard.jwks.get_key_by_opt(kid, alg).ok_or_else(|| {
                    if let Some(kid) = kid {
                        tracing::debug!(%kid, %alg, "unable to find matching key");
                    } else {
                        tracing::debug!(%alg, "unable to find matching key");
                    }
                    AuthorityError::UnknownKey
                })?
            };

            validated = decomposed.verify(key, &self.inner.validator)?;
        }

        policy.evaluate(validated.claims().permissions())?;

        let (_, validated_claims) = validated.extract();

        Ok(validated_claims)
    }
}
