//! RSA public keys for signature verification
//!
//! Private-key operations are intentionally absent. This workspace only ever
//! verifies tokens minted by an external identity provider.

use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

use crate::{b64::Base64Url, error, jwa::Algorithm, jws};

/// RSA public key components
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PublicKeyDto")]
pub struct PublicKey {
    /// The public modulus
    #[serde(rename = "n")]
    modulus: Base64Url,

    /// The public exponent
    #[serde(rename = "e")]
    exponent: Base64Url,
}

impl PublicKey {
    /// The public key's modulus
    pub fn modulus(&self) -> &Base64Url {
        &self.modulus
    }

    /// The public key's exponent
    pub fn exponent(&self) -> &Base64Url {
        &self.exponent
    }

    /// Constructs a public key from its modulus and exponent
    ///
    /// # Errors
    ///
    /// Returns an error if the modulus is not that of a 2048-bit key.
    pub fn from_components(
        modulus: impl Into<Base64Url>,
        exponent: impl Into<Base64Url>,
    ) -> Result<Self, error::KeyRejected> {
        let modulus = modulus.into();
        let exponent = exponent.into();
        if modulus.as_slice().len() != 256 {
            return Err(error::key_rejected("key modulus must be 2048 bits"));
        }

        Ok(Self { modulus, exponent })
    }

    fn verification_params(
        alg: Algorithm,
    ) -> Result<&'static ring::signature::RsaParameters, error::IncompatibleAlgorithm> {
        match alg {
            Algorithm::RS256 => Ok(&ring::signature::RSA_PKCS1_2048_8192_SHA256),
            Algorithm::RS384 => Ok(&ring::signature::RSA_PKCS1_2048_8192_SHA384),
            Algorithm::RS512 => Ok(&ring::signature::RSA_PKCS1_2048_8192_SHA512),
            #[allow(unreachable_patterns)]
            _ => Err(error::incompatible_algorithm(alg)),
        }
    }
}

impl jws::Verifier for PublicKey {
    type Algorithm = Algorithm;
    type Error = error::JwkVerifyError;

    fn can_verify(&self, alg: Self::Algorithm) -> bool {
        alg.is_rsa()
    }

    fn verify(
        &self,
        alg: Self::Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Self::Error> {
        let pk = ring::signature::RsaPublicKeyComponents {
            n: self.modulus.as_slice(),
            e: self.exponent.as_slice(),
        };

        pk.verify(Self::verification_params(alg)?, data, signature)
            .map_err(|_| error::signature_mismatch().into())
    }
}

impl TryFrom<PublicKeyDto> for PublicKey {
    type Error = error::KeyRejected;

    fn try_from(dto: PublicKeyDto) -> Result<Self, Self::Error> {
        Self::from_components(dto.modulus, dto.exponent)
    }
}

/// Serialized RSA public key components
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
struct PublicKeyDto {
    #[serde(rename = "n")]
    modulus: Base64Url,

    #[serde(rename = "e")]
    exponent: Base64Url,
}
