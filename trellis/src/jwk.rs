//! Keys from the JSON Web Key (JWK) standard
//!
//! The specifications for JSON Web Keys can be found in [RFC7517][].
//!
//! [RFC7517]: https://tools.ietf.org/html/rfc7517

use std::convert::TryFrom;

use aliri_braid::braid;
use serde::Deserialize;

use crate::{b64::Base64Url, error, jwa, jws};

/// An identifier for a key
#[braid(serde, ref_doc = "A borrowed reference to a key identifier ([`KeyId`])")]
pub struct KeyId;

/// An identified key, as published by an identity provider
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "JwkDto")]
#[must_use]
pub struct Jwk {
    key_id: Option<KeyId>,
    usage: Option<jwa::Usage>,
    algorithm: Option<jwa::Algorithm>,
    key: Key,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Key {
    #[cfg(feature = "hmac")]
    Hmac(jwa::Hmac),

    #[cfg(feature = "rsa")]
    Rsa(jwa::rsa::PublicKey),
}

impl Key {
    fn is_compatible(&self, alg: jwa::Algorithm) -> bool {
        match self {
            #[cfg(feature = "hmac")]
            Self::Hmac(_) => alg.is_hmac(),

            #[cfg(feature = "rsa")]
            Self::Rsa(_) => alg.is_rsa(),
        }
    }
}

impl Jwk {
    /// The key ID
    #[must_use]
    pub fn key_id(&self) -> Option<&KeyIdRef> {
        self.key_id.as_deref()
    }

    /// The intended usage of the key
    #[must_use]
    pub fn usage(&self) -> Option<jwa::Usage> {
        self.usage
    }

    /// The algorithm this key is restricted to, if any
    #[must_use]
    pub fn algorithm(&self) -> Option<jwa::Algorithm> {
        self.algorithm
    }

    /// Whether the key material is usable with the given algorithm
    #[must_use]
    pub fn is_compatible(&self, alg: jwa::Algorithm) -> bool {
        self.key.is_compatible(alg)
    }

    /// Sets the key ID
    pub fn with_key_id(self, kid: impl Into<KeyId>) -> Self {
        Self {
            key_id: Some(kid.into()),
            ..self
        }
    }

    /// Sets the key's usage
    pub fn with_usage(self, usage: jwa::Usage) -> Self {
        Self {
            usage: Some(usage),
            ..self
        }
    }

    /// Sets the algorithm and the usage consistent with that algorithm
    pub fn with_algorithm(self, alg: jwa::Algorithm) -> Self {
        Self {
            algorithm: Some(alg),
            usage: Some(alg.to_usage()),
            ..self
        }
    }

    fn check_declarations(
        &self,
        alg: jwa::Algorithm,
    ) -> Result<(), error::JwkVerifyError> {
        if let Some(key_alg) = self.algorithm {
            if key_alg != alg {
                return Err(error::incompatible_algorithm(alg).into());
            }
        }

        if let Some(usage) = self.usage {
            if usage != jwa::Usage::Signing {
                return Err(error::key_usage_mismatch().into());
            }
        }

        if !self.key.is_compatible(alg) {
            return Err(error::incompatible_algorithm(alg).into());
        }

        Ok(())
    }
}

#[cfg(feature = "hmac")]
impl From<jwa::Hmac> for Jwk {
    fn from(key: jwa::Hmac) -> Self {
        Self {
            key_id: None,
            usage: None,
            algorithm: None,
            key: Key::Hmac(key),
        }
    }
}

#[cfg(feature = "rsa")]
impl From<jwa::rsa::PublicKey> for Jwk {
    fn from(key: jwa::rsa::PublicKey) -> Self {
        Self {
            key_id: None,
            usage: None,
            algorithm: None,
            key: Key::Rsa(key),
        }
    }
}

impl jws::Verifier for Jwk {
    type Algorithm = jwa::Algorithm;
    type Error = error::JwkVerifyError;

    fn can_verify(&self, alg: Self::Algorithm) -> bool {
        self.key.is_compatible(alg)
            && self.algorithm.map_or(true, |a| a == alg)
            && self.usage.map_or(true, |u| u == jwa::Usage::Signing)
    }

    fn verify(
        &self,
        alg: Self::Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Self::Error> {
        self.check_declarations(alg)?;

        match &self.key {
            #[cfg(feature = "hmac")]
            Key::Hmac(key) => jws::Verifier::verify(key, alg, data, signature),

            #[cfg(feature = "rsa")]
            Key::Rsa(key) => jws::Verifier::verify(key, alg, data, signature),
        }
    }
}

#[cfg(feature = "hmac")]
impl jws::Signer for Jwk {
    type Algorithm = jwa::Algorithm;
    type Error = error::SigningError;

    fn can_sign(&self, alg: Self::Algorithm) -> bool {
        match &self.key {
            Key::Hmac(_) => alg.is_hmac(),

            #[allow(unreachable_patterns)]
            _ => false,
        }
    }

    fn sign(&self, alg: Self::Algorithm, data: &[u8]) -> Result<Vec<u8>, Self::Error> {
        match self.check_declarations(alg) {
            Ok(()) => {}
            Err(error::JwkVerifyError::KeyUsageMismatch(e)) => return Err(e.into()),
            Err(_) => return Err(error::incompatible_algorithm(alg).into()),
        }

        match &self.key {
            Key::Hmac(key) => Ok(jws::Signer::sign(key, alg, data)?),

            #[allow(unreachable_patterns)]
            _ => Err(error::missing_signing_key().into()),
        }
    }
}

#[derive(Deserialize)]
struct JwkDto {
    #[serde(default)]
    kid: Option<KeyId>,

    #[serde(rename = "use", default)]
    usage: Option<jwa::Usage>,

    #[serde(default)]
    alg: Option<jwa::Algorithm>,

    kty: String,

    #[serde(default)]
    k: Option<Base64Url>,

    #[serde(default)]
    n: Option<Base64Url>,

    #[serde(default)]
    e: Option<Base64Url>,
}

impl TryFrom<JwkDto> for Jwk {
    type Error = error::KeyRejected;

    fn try_from(dto: JwkDto) -> Result<Self, Self::Error> {
        let key = match dto.kty.as_str() {
            #[cfg(feature = "hmac")]
            "oct" => {
                let k = dto
                    .k
                    .ok_or_else(|| error::key_rejected("symmetric key missing secret"))?;
                Key::Hmac(jwa::Hmac::new(k))
            }

            #[cfg(feature = "rsa")]
            "RSA" => {
                let n = dto
                    .n
                    .ok_or_else(|| error::key_rejected("RSA key missing modulus"))?;
                let e = dto
                    .e
                    .ok_or_else(|| error::key_rejected("RSA key missing exponent"))?;
                Key::Rsa(jwa::rsa::PublicKey::from_components(n, e)?)
            }

            other => {
                return Err(error::key_rejected(format!(
                    "unsupported key type '{other}'"
                )))
            }
        };

        Ok(Self {
            key_id: dto.kid,
            usage: dto.usage,
            algorithm: dto.alg,
            key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(feature = "hmac")]
    fn deserializes_symmetric_key() {
        let jwk: Jwk = serde_json::from_str(
            r#"{
                "kty": "oct",
                "kid": "test",
                "use": "sig",
                "alg": "HS256",
                "k": "dGVzdA"
            }"#,
        )
        .unwrap();

        assert_eq!(jwk.key_id().unwrap().as_str(), "test");
        assert_eq!(jwk.algorithm(), Some(jwa::Algorithm::HS256));
        assert!(jwk.is_compatible(jwa::Algorithm::HS256));
        assert!(!jwk.is_compatible(jwa::Algorithm::RS256));
    }

    #[test]
    fn rejects_unsupported_key_type() {
        let result = serde_json::from_str::<Jwk>(r#"{ "kty": "EC", "crv": "P-256" }"#);
        assert!(result.is_err());
    }
}
