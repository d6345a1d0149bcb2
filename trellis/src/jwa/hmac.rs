//! HMAC shared-secret keys

use std::fmt;

use ring::rand::SecureRandom;
use serde::{Deserialize, Serialize};

use crate::{b64::Base64Url, error, jwa::Algorithm, jws};

/// An HMAC shared secret
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub struct Hmac {
    #[serde(rename = "k")]
    secret: Base64Url,
}

impl fmt::Debug for Hmac {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Hmac { secret }")
    }
}

impl Hmac {
    /// HMAC using the provided secret
    pub fn new(secret: impl Into<Base64Url>) -> Self {
        let secret = secret.into();
        Self { secret }
    }

    /// Generates a new secret sized for the given algorithm
    ///
    /// # Errors
    ///
    /// Returns an error if the system random number generator fails.
    pub fn generate(alg: Algorithm) -> Result<Self, error::Unexpected> {
        Self::generate_with_rng(alg, &ring::rand::SystemRandom::new())
    }

    /// Generates a new secret using the provided source of randomness
    ///
    /// # Errors
    ///
    /// Returns an error if the random number generator fails.
    pub fn generate_with_rng(
        alg: Algorithm,
        rng: &dyn SecureRandom,
    ) -> Result<Self, error::Unexpected> {
        let mut secret = Base64Url::from_raw(vec![0; alg.signature_size()]);

        rng.fill(secret.as_mut_slice())
            .map_err(|_| error::unexpected("random number generator failure"))?;

        Ok(Self { secret })
    }

    fn ring_algorithm(alg: Algorithm) -> Result<ring::hmac::Algorithm, error::IncompatibleAlgorithm> {
        match alg {
            Algorithm::HS256 => Ok(ring::hmac::HMAC_SHA256),
            Algorithm::HS384 => Ok(ring::hmac::HMAC_SHA384),
            Algorithm::HS512 => Ok(ring::hmac::HMAC_SHA512),
            #[allow(unreachable_patterns)]
            _ => Err(error::incompatible_algorithm(alg)),
        }
    }
}

impl jws::Signer for Hmac {
    type Algorithm = Algorithm;
    type Error = error::IncompatibleAlgorithm;

    fn can_sign(&self, alg: Self::Algorithm) -> bool {
        alg.is_hmac()
    }

    fn sign(&self, alg: Self::Algorithm, data: &[u8]) -> Result<Vec<u8>, Self::Error> {
        let key = ring::hmac::Key::new(Self::ring_algorithm(alg)?, self.secret.as_slice());
        let digest = ring::hmac::sign(&key, data);
        Ok(digest.as_ref().to_owned())
    }
}

impl jws::Verifier for Hmac {
    type Algorithm = Algorithm;
    type Error = error::JwkVerifyError;

    fn can_verify(&self, alg: Self::Algorithm) -> bool {
        alg.is_hmac()
    }

    fn verify(
        &self,
        alg: Self::Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Self::Error> {
        let key = ring::hmac::Key::new(Self::ring_algorithm(alg)?, self.secret.as_slice());
        ring::hmac::verify(&key, data, signature)
            .map_err(|_| error::signature_mismatch().into())
    }
}
