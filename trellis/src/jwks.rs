//! Key sets from the JSON Web Key Set (JWKS) standard

use serde::Deserialize;

use crate::{jwa, jwk, Jwk};

/// A set of keys published by an identity provider
///
/// Deserialization is lenient: keys using unsupported key types or
/// algorithms are skipped rather than failing the whole set, since
/// providers routinely publish encryption keys alongside signing keys.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Jwks {
    #[serde(deserialize_with = "deserialize_keys")]
    keys: Vec<Jwk>,
}

impl Jwks {
    /// Adds a key to the set
    pub fn add_key(&mut self, key: Jwk) {
        self.keys.push(key);
    }

    /// A view of the keys in this set
    pub fn keys(&self) -> &[Jwk] {
        &self.keys
    }

    /// Gets the best available key for the algorithm requested
    pub fn get_key(&self, alg: jwa::Algorithm) -> Option<&Jwk> {
        self.best_match(None, alg)
    }

    /// Gets the best available key for the key ID and algorithm requested
    pub fn get_key_by_id(&self, kid: &jwk::KeyIdRef, alg: jwa::Algorithm) -> Option<&Jwk> {
        self.best_match(Some(kid), alg)
    }

    /// Gets the best available key for the key ID (if any) and algorithm
    pub fn get_key_by_opt(
        &self,
        kid: Option<&jwk::KeyIdRef>,
        alg: jwa::Algorithm,
    ) -> Option<&Jwk> {
        self.best_match(kid, alg)
    }

    /// Ranks candidate keys by how specifically they match the request
    ///
    /// A key that declares a key ID must match the requested ID exactly;
    /// keys without an ID remain eligible as a fallback. The same holds for
    /// declared algorithms and usages.
    fn best_match(&self, kid: Option<&jwk::KeyIdRef>, alg: jwa::Algorithm) -> Option<&Jwk> {
        let alg_usage = alg.to_usage();

        let best = self.keys.iter().fold(None, move |best, k| {
            let mut score = 0;

            if !k.is_compatible(alg) {
                return best;
            }

            match (kid, k.key_id()) {
                (Some(requested), Some(key_id)) if requested == key_id => score += 4,
                (_, None) => {}
                _ => return best,
            }

            if let Some(algorithm) = k.algorithm() {
                if algorithm == alg {
                    score += 2;
                } else {
                    return best;
                }
            }

            if let Some(key_usage) = k.usage() {
                if key_usage == alg_usage {
                    score += 1;
                } else {
                    return best;
                }
            }

            match best {
                Some((_, best_score)) if best_score < score => Some((k, score)),
                None => Some((k, score)),
                _ => best,
            }
        });

        best.map(|(b, _)| b)
    }
}

fn deserialize_keys<'de, D>(deserializer: D) -> Result<Vec<Jwk>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct LenientKeysVisitor;

    impl<'de> serde::de::Visitor<'de> for LenientKeysVisitor {
        type Value = Vec<Jwk>;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("a list of JWK objects")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: serde::de::SeqAccess<'de>,
        {
            let mut values = Vec::with_capacity(seq.size_hint().unwrap_or_default());
            let mut index = 0_usize;

            while let Some(value) = seq.next_element()? {
                match value {
                    MaybeJwk::Jwk(jwk) => values.push(jwk),
                    MaybeJwk::Unknown(key) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            jwks.idx = index,
                            jwk.kid = ?key.kid,
                            "jwk.use" = ?key.r#use,
                            jwk.alg = ?key.alg,
                            "ignoring unusable JWK"
                        );
                        let _ = (index, key);
                    }
                }
                index += 1;
            }

            Ok(values)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MaybeJwk {
        Jwk(Jwk),
        Unknown(JwkLike),
    }

    #[allow(dead_code)]
    #[derive(Deserialize)]
    struct JwkLike {
        #[serde(default)]
        kid: Option<jwk::KeyId>,
        #[serde(rename = "use", default)]
        r#use: Option<String>,
        #[serde(default)]
        alg: Option<String>,
    }

    deserializer.deserialize_seq(LenientKeysVisitor)
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;

    const JWKS_WITH_UNSUPPORTED_ALG: &str = r#"
        {
            "keys": [
                {
                    "kid": "1",
                    "use": "enc",
                    "alg": "RSA-OAEP"
                }
            ]
        }
    "#;

    const JWKS_WITH_NO_KTY: &str = r#"
        {
            "keys": [
                {
                    "kid": "1",
                    "use": "enc"
                }
            ]
        }
    "#;

    #[test]
    fn skips_keys_with_unsupported_algorithms() -> Result<()> {
        let jwks: Jwks = serde_json::from_str(JWKS_WITH_UNSUPPORTED_ALG)?;
        assert!(jwks.keys().is_empty());
        Ok(())
    }

    #[test]
    fn skips_keys_without_a_key_type() -> Result<()> {
        let jwks: Jwks = serde_json::from_str(JWKS_WITH_NO_KTY)?;
        assert!(jwks.keys().is_empty());
        Ok(())
    }

    #[test]
    #[cfg(feature = "hmac")]
    fn selects_key_by_id() -> Result<()> {
        let jwks: Jwks = serde_json::from_str(
            r#"
            {
                "keys": [
                    { "kty": "oct", "kid": "first", "use": "sig", "alg": "HS256", "k": "Zmlyc3Q" },
                    { "kty": "oct", "kid": "second", "use": "sig", "alg": "HS256", "k": "c2Vjb25k" }
                ]
            }
        "#,
        )?;

        let key = jwks
            .get_key_by_id(jwk::KeyIdRef::from_str("second"), jwa::Algorithm::HS256)
            .expect("key should be found");

        assert_eq!(key.key_id().unwrap().as_str(), "second");

        assert!(jwks
            .get_key_by_id(jwk::KeyIdRef::from_str("third"), jwa::Algorithm::HS256)
            .is_none());

        Ok(())
    }

    #[test]
    #[cfg(all(feature = "hmac", feature = "rsa"))]
    fn mixed_set_retains_supported_keys() -> Result<()> {
        let modulus = "A".repeat(342);
        let doc = format!(
            r#"
            {{
                "keys": [
                    {{ "kty": "RSA", "kid": "rsa-key", "use": "sig", "alg": "RS256", "n": "{modulus}", "e": "AQAB" }},
                    {{ "kty": "oct", "kid": "hmac-key", "use": "sig", "alg": "HS256", "k": "c2VjcmV0" }},
                    {{ "kid": "enc-key", "use": "enc", "alg": "RSA-OAEP" }}
                ]
            }}
        "#
        );

        let jwks: Jwks = serde_json::from_str(&doc)?;
        assert_eq!(jwks.keys().len(), 2);

        let rsa = jwks
            .get_key_by_id(jwk::KeyIdRef::from_str("rsa-key"), jwa::Algorithm::RS256)
            .expect("RSA key should be found");
        assert_eq!(rsa.algorithm(), Some(jwa::Algorithm::RS256));

        Ok(())
    }
}
