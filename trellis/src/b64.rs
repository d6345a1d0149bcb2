//! URL-safe base64 wrappers for raw byte data
//!
//! JOSE structures carry binary values (key material, signatures, token
//! segments) as base64url without padding, per [RFC7515 §2][RFC7515]. The
//! [`Base64Url`] type keeps the decoded bytes and renders the encoded form
//! on demand.
//!
//! [RFC7515]: https://tools.ietf.org/html/rfc7515#section-2

use std::{borrow::Cow, fmt};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// The provided data was not valid base64url
#[derive(Debug, Error)]
#[error("invalid base64url data")]
pub struct InvalidBase64Data {
    #[from]
    source: base64::DecodeError,
}

/// Owned raw data which serializes as unpadded base64url
#[derive(Clone, PartialEq, Eq, Hash)]
#[must_use]
pub struct Base64Url(Vec<u8>);

impl Base64Url {
    /// Wraps raw bytes, to be encoded when displayed or serialized
    #[inline]
    pub fn from_raw(raw: impl Into<Vec<u8>>) -> Self {
        Self(raw.into())
    }

    /// Decodes an unpadded base64url string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid unpadded base64url.
    pub fn from_encoded(enc: &str) -> Result<Self, InvalidBase64Data> {
        Ok(Self(URL_SAFE_NO_PAD.decode(enc)?))
    }

    /// The raw, decoded bytes
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// A mutable view of the raw, decoded bytes
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }

    /// Unwraps the raw bytes
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }

    /// The length of the data when encoded
    #[inline]
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        Self::calc_encoded_len(self.0.len())
    }

    /// The unpadded base64url length of `len` raw bytes
    #[inline]
    #[must_use]
    pub fn calc_encoded_len(len: usize) -> usize {
        let whole = len / 3 * 4;
        match len % 3 {
            0 => whole,
            1 => whole + 2,
            _ => whole + 3,
        }
    }
}

impl From<Vec<u8>> for Base64Url {
    #[inline]
    fn from(raw: Vec<u8>) -> Self {
        Self(raw)
    }
}

impl From<&'_ [u8]> for Base64Url {
    #[inline]
    fn from(raw: &[u8]) -> Self {
        Self(raw.to_vec())
    }
}

impl fmt::Display for Base64Url {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&URL_SAFE_NO_PAD.encode(&self.0))
    }
}

impl fmt::Debug for Base64Url {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "b64({self})")
    }
}

impl Serialize for Base64Url {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Base64Url {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let enc = Cow::<str>::deserialize(deserializer)?;
        Self::from_encoded(&enc).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_encoded_form() {
        let data = Base64Url::from_encoded("dGVzdA").unwrap();
        assert_eq!(data.as_slice(), b"test");
        assert_eq!(data.to_string(), "dGVzdA");
    }

    #[test]
    fn rejects_padded_input() {
        assert!(Base64Url::from_encoded("dGVzdA==").is_err());
    }

    #[test]
    fn encoded_len_matches_remainders() {
        for len in 0..10 {
            let enc = Base64Url::from_raw(vec![0; len]).to_string();
            assert_eq!(enc.len(), Base64Url::calc_encoded_len(len));
        }
    }
}
