//! Signature algorithms from the JSON Web Algorithms (JWA) standard
//!
//! Only the algorithm families needed to verify identity-provider tokens are
//! implemented: HMAC (shared secret) and RSA PKCS#1 v1.5 (public key). The
//! specifications can be found in [RFC7518][].
//!
//! [RFC7518]: https://tools.ietf.org/html/rfc7518

use std::{convert::TryFrom, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error;

#[cfg(feature = "hmac")]
pub mod hmac;
#[cfg(feature = "rsa")]
pub mod rsa;

#[cfg(feature = "hmac")]
#[doc(inline)]
pub use hmac::Hmac;

/// A JWS signing/verification algorithm
///
/// This list may be expanded in the future.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
#[non_exhaustive]
pub enum Algorithm {
    /// HMAC using SHA-256
    #[cfg(feature = "hmac")]
    HS256,

    /// HMAC using SHA-384
    #[cfg(feature = "hmac")]
    HS384,

    /// HMAC using SHA-512
    #[cfg(feature = "hmac")]
    HS512,

    /// RSASSA-PKCS1-v1_5 using SHA-256
    #[cfg(feature = "rsa")]
    RS256,

    /// RSASSA-PKCS1-v1_5 using SHA-384
    #[cfg(feature = "rsa")]
    RS384,

    /// RSASSA-PKCS1-v1_5 using SHA-512
    #[cfg(feature = "rsa")]
    RS512,
}

impl Algorithm {
    /// The expected size of this algorithm's signature in bytes
    ///
    /// For RSA algorithms, this reports the signature size produced by a
    /// 2048-bit key.
    #[must_use]
    pub fn signature_size(self) -> usize {
        match self {
            #[cfg(feature = "hmac")]
            Self::HS256 => 256 / 8,
            #[cfg(feature = "hmac")]
            Self::HS384 => 384 / 8,
            #[cfg(feature = "hmac")]
            Self::HS512 => 512 / 8,

            #[cfg(feature = "rsa")]
            Self::RS256 | Self::RS384 | Self::RS512 => 2048 / 8,
        }
    }

    /// The usage associated with this algorithm
    pub fn to_usage(self) -> Usage {
        Usage::Signing
    }

    /// Whether this is an HMAC family algorithm
    #[must_use]
    pub fn is_hmac(self) -> bool {
        #[cfg(feature = "hmac")]
        {
            matches!(self, Self::HS256 | Self::HS384 | Self::HS512)
        }
        #[cfg(not(feature = "hmac"))]
        {
            false
        }
    }

    /// Whether this is an RSA family algorithm
    #[must_use]
    pub fn is_rsa(self) -> bool {
        #[cfg(feature = "rsa")]
        {
            matches!(self, Self::RS256 | Self::RS384 | Self::RS512)
        }
        #[cfg(not(feature = "rsa"))]
        {
            false
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            #[cfg(feature = "hmac")]
            Self::HS256 => "HS256",
            #[cfg(feature = "hmac")]
            Self::HS384 => "HS384",
            #[cfg(feature = "hmac")]
            Self::HS512 => "HS512",

            #[cfg(feature = "rsa")]
            Self::RS256 => "RS256",
            #[cfg(feature = "rsa")]
            Self::RS384 => "RS384",
            #[cfg(feature = "rsa")]
            Self::RS512 => "RS512",
        };

        f.write_str(s)
    }
}

impl TryFrom<&'_ str> for Algorithm {
    type Error = error::UnknownAlgorithm;

    fn try_from(value: &'_ str) -> Result<Self, Self::Error> {
        match value {
            #[cfg(feature = "hmac")]
            "HS256" => Ok(Self::HS256),
            #[cfg(feature = "hmac")]
            "HS384" => Ok(Self::HS384),
            #[cfg(feature = "hmac")]
            "HS512" => Ok(Self::HS512),
            #[cfg(feature = "rsa")]
            "RS256" => Ok(Self::RS256),
            #[cfg(feature = "rsa")]
            "RS384" => Ok(Self::RS384),
            #[cfg(feature = "rsa")]
            "RS512" => Ok(Self::RS512),
            _ => Err(error::unknown_algorithm(value.to_string())),
        }
    }
}

impl FromStr for Algorithm {
    type Err = error::UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

/// The intended usage of a key
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum Usage {
    /// Signing and signature verification
    #[serde(rename = "sig")]
    Signing,

    /// Encryption
    #[serde(rename = "enc")]
    Encryption,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_from_header_string() {
        let alg: Algorithm = serde_json::from_str("\"RS256\"").unwrap();
        assert_eq!(alg, Algorithm::RS256);
    }

    #[test]
    fn rejects_unknown_algorithm_names() {
        assert!(serde_json::from_str::<Algorithm>("\"none\"").is_err());
        assert!("ES256".parse::<Algorithm>().is_err());
    }
}
