//! Token decomposition, verification, and claim validation
//!
//! Bearer tokens arrive as three base64url sections separated by `.`:
//!
//! ```text
//! eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiJhdXRoMHwxMjMifQ.<signature>
//! ```
//!
//! The header carries the metadata needed to select a verification key and
//! nothing in it may be trusted until the signature has been checked against
//! that key. The payload carries the claims; it is likewise untrusted until
//! verification completes. Verification is pure: the same token, key, and
//! validation plan always produce the same outcome, so it is safe to run
//! concurrently and repeatedly.
//!
//! ```
//! use trellis::{jwa, jwt, Jwk};
//! use trellis::b64::Base64Url;
//!
//! let key = Jwk::from(jwa::Hmac::new(Base64Url::from_raw(&b"my-secret"[..])))
//!     .with_algorithm(jwa::Algorithm::HS256);
//!
//! let claims = jwt::BasicClaims::new()
//!     .with_audience(jwt::Audience::from_static("plants-api"))
//!     .with_issuer(jwt::Issuer::from_static("https://issuer.example.com/"))
//!     .with_future_expiration(300);
//!
//! let token = claims
//!     .sign(&key, &jwt::BasicHeaders::new(jwa::Algorithm::HS256))
//!     .unwrap();
//!
//! let validator = jwt::CoreValidator::default()
//!     .add_approved_algorithm(jwa::Algorithm::HS256)
//!     .add_allowed_audience(jwt::Audience::from_static("plants-api"))
//!     .require_issuer(jwt::Issuer::from_static("https://issuer.example.com/"));
//!
//! let verified: jwt::Validated = token.verify(&key, &validator).unwrap();
//! # let _ = verified;
//! ```

use std::{convert::TryFrom, fmt, time::Duration};

use aliri_braid::braid;
use serde::{Deserialize, Serialize};
use trellis_clock::{Clock, System, UnixTime};

use crate::{b64::Base64Url, error, jwa, jwk, jws};

/// The validated headers and claims of a verified token
///
/// This type can only be created within this crate, asserting that the
/// contained headers and claims passed signature verification and claim
/// validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validated<C = BasicClaims, H = BasicHeaders> {
    headers: H,
    claims: C,
}

impl<C, H> Validated<C, H> {
    /// Extracts the headers and claims from the token
    pub fn extract(self) -> (H, C) {
        (self.headers, self.claims)
    }

    /// The validated token headers
    pub fn headers(&self) -> &H {
        &self.headers
    }

    /// The validated token claims
    pub fn claims(&self) -> &C {
        &self.claims
    }
}

/// A decomposed token, split into its sections but not yet verified
///
/// Suitable for inspecting the untrusted header to determine which key
/// should verify the token.
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct Decomposed<'a, H = BasicHeaders> {
    pub(crate) header: H,
    pub(crate) message: &'a str,
    pub(crate) payload: &'a str,
    pub(crate) signature: Base64Url,
}

macro_rules! expect_two {
    ($iter:expr) => {{
        let mut i = $iter;
        match (i.next(), i.next(), i.next()) {
            (Some(first), Some(second), None) => Some((first, second)),
            _ => None,
        }
    }};
}

impl<'a, H> Decomposed<'a, H>
where
    H: for<'de> Deserialize<'de> + CoreHeaders,
{
    /// Verifies the decomposed token against the given key and validation plan
    ///
    /// # Errors
    ///
    /// Returns an error if the signature does not match, the payload cannot
    /// be decoded, or the claims are rejected by the validator.
    pub fn verify<C, V>(
        self,
        key: &'_ V,
        validator: &CoreValidator,
    ) -> Result<Validated<C, H>, error::JwtVerifyError>
    where
        C: for<'de> Deserialize<'de> + CoreClaims,
        V: jws::Verifier<Algorithm = jwa::Algorithm>,
        error::JwtVerifyError: From<V::Error>,
    {
        key.verify(
            self.header.alg(),
            self.message.as_bytes(),
            self.signature.as_slice(),
        )?;

        let p_raw = Base64Url::from_encoded(self.payload).map_err(error::malformed_jwt_payload)?;

        let payload: C =
            serde_json::from_slice(p_raw.as_slice()).map_err(error::malformed_jwt_payload)?;

        validator.validate(&self.header, &payload)?;

        Ok(Validated {
            headers: self.header,
            claims: payload,
        })
    }

    /// The untrusted headers of the token
    ///
    /// **WARNING:** *These headers have not been validated and should not be
    /// trusted.* An adversary controls every byte of an unverified token.
    pub fn untrusted_header(&self) -> &H {
        &self.header
    }

    /// The untrusted, still-encoded payload of the token
    ///
    /// **WARNING:** *This payload has not been validated and should not be
    /// trusted.* An adversary controls every byte of an unverified token.
    pub fn untrusted_payload(&self) -> &'a str {
        self.payload
    }
}

impl<'a, H> HasAlgorithm for Decomposed<'a, H>
where
    H: HasAlgorithm,
{
    fn alg(&self) -> jwa::Algorithm {
        self.header.alg()
    }
}

impl<'a, H> CoreHeaders for Decomposed<'a, H>
where
    H: CoreHeaders,
{
    fn kid(&self) -> Option<&jwk::KeyIdRef> {
        self.header.kid()
    }
}

impl JwtRef {
    /// Decomposes the token into its sections, preparing it for verification
    ///
    /// # Errors
    ///
    /// Returns an error if the token does not have the expected structure.
    pub fn decompose<H>(&self) -> Result<Decomposed<H>, error::JwtVerifyError>
    where
        H: for<'de> Deserialize<'de>,
    {
        let (s_str, message) =
            expect_two!(self.as_str().rsplitn(2, '.')).ok_or_else(error::malformed_jwt)?;
        let (payload, h_str) =
            expect_two!(message.rsplitn(2, '.')).ok_or_else(error::malformed_jwt)?;
        let h_raw = Base64Url::from_encoded(h_str).map_err(error::malformed_jwt_header)?;
        let signature = Base64Url::from_encoded(s_str).map_err(error::malformed_jwt_signature)?;
        let header: H =
            serde_json::from_slice(h_raw.as_slice()).map_err(error::malformed_jwt_header)?;
        Ok(Decomposed {
            header,
            message,
            payload,
            signature,
        })
    }

    /// Verifies the token against a particular key and validation plan
    ///
    /// To inspect the token first and select a key, use [`decompose()`][Self::decompose].
    ///
    /// # Errors
    ///
    /// Returns an error if the token is invalid according to the validator.
    pub fn verify<C, H, V>(
        &self,
        key: &'_ V,
        validator: &CoreValidator,
    ) -> Result<Validated<C, H>, error::JwtVerifyError>
    where
        C: for<'de> Deserialize<'de> + CoreClaims,
        H: for<'de> Deserialize<'de> + CoreHeaders,
        V: jws::Verifier<Algorithm = jwa::Algorithm>,
        error::JwtVerifyError: From<V::Error>,
    {
        let decomposed = self.decompose()?;

        decomposed.verify(key, validator)
    }
}

/// Core claims that a compliant token is expected to carry
pub trait CoreClaims {
    /// Not before
    ///
    /// A verifier MUST reject this token before the given time.
    fn nbf(&self) -> Option<UnixTime>;

    /// Expires
    ///
    /// A verifier MUST reject this token at or after the given time.
    fn exp(&self) -> Option<UnixTime>;

    /// Audience
    ///
    /// A verifier MUST reject this token if none of the audiences is approved.
    fn aud(&self) -> &Audiences;

    /// Issuer
    ///
    /// A verifier MUST reject this token if the issuer is not approved.
    fn iss(&self) -> Option<&IssuerRef>;

    /// Subject
    ///
    /// The stable identity the token was issued for.
    fn sub(&self) -> Option<&SubjectRef>;
}

/// Indicates that the type specifies a signing algorithm
pub trait HasAlgorithm {
    /// The algorithm declared for signing this token
    fn alg(&self) -> jwa::Algorithm;
}

/// Values common to a token header
pub trait CoreHeaders: HasAlgorithm {
    /// The ID of the key used to sign this token, if declared
    fn kid(&self) -> Option<&jwk::KeyIdRef>;
}

/// An audience for tokens
#[braid(serde, ref_doc = "A borrowed reference to an [`Audience`]")]
pub struct Audience;

/// An issuer of tokens
#[braid(serde, ref_doc = "A borrowed reference to an [`Issuer`]")]
pub struct Issuer;

/// The subject of a token: the identity-provider-scoped, stable identifier
/// of an authenticated identity
#[braid(serde, ref_doc = "A borrowed reference to a [`Subject`]")]
pub struct Subject;

/// A bearer token in compact serialization
///
/// This type provides custom implementations of [`Display`][JwtRef#impl-Display]
/// and [`Debug`][JwtRef#impl-Debug] to prevent unintentional disclosure of
/// sensitive values. See the documentation on those trait implementations on
/// the [`JwtRef`] type for more information.
#[braid(
    serde,
    debug = "owned",
    display = "owned",
    ord = "omit",
    ref_doc = "\
    A borrowed reference to a bearer token ([`Jwt`])\n\
    \n\
    This type provides custom implementations of [`Display`][Self#impl-Display] and \
    [`Debug`][Self#impl-Debug] to prevent unintentional disclosure of sensitive values. \
    See the documentation on those trait implementations for more information.
    "
)]
#[must_use]
pub struct Jwt;

impl Jwt {
    /// Constructs a signed token from a header and payload
    ///
    /// Headers and payload are serialized as JSON blobs before signing.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or if the key cannot produce
    /// a signature with the requested algorithm.
    #[cfg(feature = "hmac")]
    pub fn try_from_parts_with_signature<H: Serialize + HasAlgorithm, P: Serialize>(
        headers: &H,
        payload: &P,
        jwk: &jwk::Jwk,
    ) -> Result<Self, error::JwtSigningError> {
        use std::fmt::Write;

        use crate::jws::Signer as _;

        let alg = headers.alg();

        let h_raw =
            Base64Url::from_raw(serde_json::to_vec(headers).map_err(error::malformed_jwt_header)?);
        let p_raw =
            Base64Url::from_raw(serde_json::to_vec(payload).map_err(error::malformed_jwt_payload)?);

        let expected_len = h_raw.encoded_len()
            + p_raw.encoded_len()
            + Base64Url::calc_encoded_len(alg.signature_size())
            + 2;

        let mut message = String::with_capacity(expected_len);
        write!(message, "{h_raw}.{p_raw}").expect("writes to strings never fail");

        let s = Base64Url::from_raw(jwk.sign(alg, message.as_bytes())?);

        write!(message, ".{s}").expect("writes to strings never fail");

        debug_assert_eq!(message.len(), expected_len);

        Ok(Self::new(message))
    }
}

/// By default, this type will not print out its contents without explicitly
/// specifying the alternate debug format, i.e. `{:#?}`. When specified in
/// that form, it will print out the entire header and payload, but will omit
/// the token's signature. To change the number of signature characters to
/// reveal, specify the amount as a width in the format string, i.e. `{:#25?}`.
///
/// If not specified, a placeholder value is printed instead to indicate that
/// sensitive information is being hidden.
impl fmt::Debug for JwtRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            f.write_str("\"")?;
            let last_period = &self.0.rfind('.');
            if let Some(last_period) = *last_period {
                f.write_str(&self.0[..=last_period])?;
                limited_reveal(&self.0[last_period + 1..], &mut *f, 0)?;
            } else {
                limited_reveal(&self.0, &mut *f, 0)?;
            }
            f.write_str("\"")
        } else {
            f.write_str(concat!("***", "JWT", "***"))
        }
    }
}

/// By default, this type will not print out its contents without explicitly
/// specifying the alternate format, i.e. `{:#}`, which prints the entire
/// token. To elide some of the signature characters, specify the quantity to
/// reveal as a width in the format string, i.e. `{:#10}`.
///
/// If not specified, a placeholder value is printed instead to indicate that
/// sensitive information is being hidden.
impl fmt::Display for JwtRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            let last_period = &self.0.rfind('.');
            if let Some(last_period) = *last_period {
                f.write_str(&self.0[..=last_period])?;
                limited_reveal(&self.0[last_period + 1..], &mut *f, usize::MAX)
            } else {
                limited_reveal(&self.0, &mut *f, usize::MAX)
            }
        } else {
            f.write_str(concat!("***", "JWT", "***"))
        }
    }
}

fn limited_reveal(unprotected: &str, f: &mut fmt::Formatter, default_len: usize) -> fmt::Result {
    let max_len = f.width().unwrap_or(default_len);
    if max_len <= 1 {
        f.write_str("…")
    } else if max_len > unprotected.len() {
        f.write_str(unprotected)
    } else {
        match unprotected.char_indices().nth(max_len - 2) {
            Some((idx, c)) if idx + c.len_utf8() < unprotected.len() => {
                f.write_str(&unprotected[0..idx + c.len_utf8()])?;
                f.write_str("…")
            }
            _ => f.write_str(unprotected),
        }
    }
}

/// A set of zero or more [`Audience`]s
///
/// Identity providers serialize a single audience as a bare string and
/// multiple audiences as an array; this type accepts both forms.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OneOrMany<Audience>", into = "OneOrMany<Audience>")]
#[repr(transparent)]
#[must_use]
pub struct Audiences(Vec<Audience>);

impl Audiences {
    /// An empty audience set
    #[inline]
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// An audience set with a single audience
    #[inline]
    pub fn single(aud: impl Into<Audience>) -> Self {
        Self(vec![aud.into()])
    }

    /// Indicates whether the audience set is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates through references to the audiences in the set
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &AudienceRef> {
        self.0.iter().map(AsRef::as_ref)
    }
}

impl From<OneOrMany<Audience>> for Audiences {
    #[inline]
    fn from(vals: OneOrMany<Audience>) -> Self {
        match vals {
            OneOrMany::One(x) => Self(vec![x]),
            OneOrMany::Many(v) => Self(v),
        }
    }
}

impl From<Audiences> for OneOrMany<Audience> {
    #[inline]
    fn from(mut vec: Audiences) -> Self {
        if vec.0.len() == 1 {
            Self::One(vec.0.pop().expect("a single element is present"))
        } else {
            Self::Many(vec.0)
        }
    }
}

impl From<Vec<Audience>> for Audiences {
    #[inline]
    fn from(vals: Vec<Audience>) -> Self {
        Self(vals)
    }
}

impl From<Audience> for Audiences {
    #[inline]
    fn from(aud: Audience) -> Self {
        Self::single(aud)
    }
}

/// A type representing one or more items, primarily for serialization
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// A single item
    One(T),

    /// Zero or more items, serialized as an array
    Many(Vec<T>),
}

/// The validation plan applied to a token's header and claims
///
/// The default plan approves no algorithms, enforces expiration with zero
/// leeway, and checks `nbf` whenever the claim is present.
#[derive(Clone, Debug)]
#[must_use]
pub struct CoreValidator {
    approved_algorithms: Vec<jwa::Algorithm>,
    leeway: Duration,
    validate_exp: bool,
    allowed_audiences: Vec<Audience>,
    issuer: Option<Issuer>,
}

impl Default for CoreValidator {
    #[inline]
    fn default() -> Self {
        Self {
            approved_algorithms: Vec::new(),
            leeway: Duration::default(),
            validate_exp: true,
            allowed_audiences: Vec::new(),
            issuer: None,
        }
    }
}

impl CoreValidator {
    /// Allows a clock-skew grace period, in either direction, when
    /// evaluating the `exp` and `nbf` claims
    #[inline]
    pub fn with_leeway(self, leeway: Duration) -> Self {
        Self { leeway, ..self }
    }

    /// Allows a clock-skew grace period (in seconds)
    #[inline]
    pub fn with_leeway_secs(self, leeway: u64) -> Self {
        Self {
            leeway: Duration::from_secs(leeway),
            ..self
        }
    }

    /// Enforces expiration checks (the default)
    #[inline]
    pub fn check_expiration(self) -> Self {
        Self {
            validate_exp: true,
            ..self
        }
    }

    /// Skips expiration checks
    #[inline]
    pub fn ignore_expiration(self) -> Self {
        Self {
            validate_exp: false,
            ..self
        }
    }

    /// Adds a single audience to the set of allowed audiences
    #[inline]
    pub fn add_allowed_audience(self, audience: Audience) -> Self {
        let mut this = self;
        this.allowed_audiences.push(audience);
        this
    }

    /// Adds multiple audiences to the set of allowed audiences
    #[inline]
    pub fn extend_allowed_audiences<I: IntoIterator<Item = Audience>>(self, auds: I) -> Self {
        let mut this = self;
        this.allowed_audiences.extend(auds);
        this
    }

    /// Approves a single algorithm
    ///
    /// Tokens declaring any algorithm outside the approved set are rejected
    /// before their signature is considered, closing off algorithm-confusion
    /// attacks.
    #[inline]
    pub fn add_approved_algorithm(self, alg: jwa::Algorithm) -> Self {
        let mut this = self;
        this.approved_algorithms.push(alg);
        this
    }

    /// Requires that tokens specify a particular issuer
    #[inline]
    pub fn require_issuer(self, issuer: Issuer) -> Self {
        Self {
            issuer: Some(issuer),
            ..self
        }
    }

    /// Whether the declared algorithm is in the approved set
    ///
    /// An empty approved set places no restriction on algorithms.
    #[must_use]
    pub fn approves(&self, alg: jwa::Algorithm) -> bool {
        self.approved_algorithms.is_empty()
            || self.approved_algorithms.iter().any(|&a| a == alg)
    }

    pub(crate) fn validate<H: CoreHeaders, T: CoreClaims>(
        &self,
        header: &H,
        claims: &T,
    ) -> Result<(), error::ClaimsRejected> {
        self.validate_with_clock(header, claims, &System)
    }

    /// Validates a token's header and claims against this plan, reading the
    /// current time from the provided clock
    ///
    /// # Errors
    ///
    /// Returns an error describing the first check that failed.
    pub fn validate_with_clock<C: Clock, H: CoreHeaders, T: CoreClaims>(
        &self,
        header: &H,
        claims: &T,
        clock: &C,
    ) -> Result<(), error::ClaimsRejected> {
        let now = clock.now();
        let leeway = self.leeway.as_secs();

        if !self.approves(header.alg()) {
            return Err(error::ClaimsRejected::InvalidAlgorithm);
        }

        if self.validate_exp {
            if let Some(exp) = claims.exp() {
                // The token is expired at the instant of its `exp` claim.
                if now.0 >= exp.0.saturating_add(leeway) {
                    return Err(error::ClaimsRejected::TokenExpired);
                }
            } else {
                return Err(error::ClaimsRejected::MissingRequiredClaim("exp"));
            }
        }

        if let Some(nbf) = claims.nbf() {
            if nbf.0 > now.0.saturating_add(leeway) {
                return Err(error::ClaimsRejected::TokenNotYetValid);
            }
        }

        if !self.allowed_audiences.is_empty() {
            if claims.aud().is_empty() {
                return Err(error::ClaimsRejected::MissingRequiredClaim("aud"));
            }

            let found = claims
                .aud()
                .iter()
                .any(|a| {
                    self.allowed_audiences
                        .iter()
                        .any(|e| a == <Audience as AsRef<AudienceRef>>::as_ref(e))
                });
            if !found {
                return Err(error::ClaimsRejected::InvalidAudience);
            }
        }

        if let Some(expected_iss) = &self.issuer {
            if let Some(iss) = claims.iss() {
                if iss != <Issuer as AsRef<IssuerRef>>::as_ref(expected_iss) {
                    return Err(error::ClaimsRejected::InvalidIssuer);
                }
            } else {
                return Err(error::ClaimsRejected::MissingRequiredClaim("iss"));
            }
        }

        Ok(())
    }
}

/// Minimal set of headers for common tokens
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct BasicHeaders {
    alg: jwa::Algorithm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<jwk::KeyId>,
}

impl BasicHeaders {
    /// Constructs headers for a token to be signed with the given algorithm
    pub const fn new(alg: jwa::Algorithm) -> Self {
        Self { alg, kid: None }
    }

    /// Constructs headers with a specific signing algorithm and key ID
    pub fn with_key_id(alg: jwa::Algorithm, kid: impl Into<jwk::KeyId>) -> Self {
        Self {
            alg,
            kid: Some(kid.into()),
        }
    }
}

impl HasAlgorithm for BasicHeaders {
    fn alg(&self) -> jwa::Algorithm {
        self.alg
    }
}

impl CoreHeaders for BasicHeaders {
    fn kid(&self) -> Option<&jwk::KeyIdRef> {
        self.kid.as_deref()
    }
}

/// Common claims used in tokens
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct BasicClaims {
    #[serde(default, skip_serializing_if = "Audiences::is_empty")]
    aud: Audiences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<Issuer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<Subject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<UnixTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nbf: Option<UnixTime>,
}

impl CoreClaims for BasicClaims {
    fn nbf(&self) -> Option<UnixTime> {
        self.nbf
    }

    fn exp(&self) -> Option<UnixTime> {
        self.exp
    }

    fn aud(&self) -> &Audiences {
        &self.aud
    }

    fn iss(&self) -> Option<&IssuerRef> {
        self.iss.as_deref()
    }

    fn sub(&self) -> Option<&SubjectRef> {
        self.sub.as_deref()
    }
}

impl Default for BasicClaims {
    fn default() -> Self {
        Self::new()
    }
}

impl BasicClaims {
    /// Constructs a new, empty set of claims
    pub const fn new() -> Self {
        Self {
            aud: Audiences::empty(),
            iss: None,
            sub: None,
            exp: None,
            nbf: None,
        }
    }

    /// Sets the `aud` claim
    pub fn with_audience(mut self, aud: impl Into<Audience>) -> Self {
        self.aud = Audiences::from(vec![aud.into()]);
        self
    }

    /// Sets the `aud` claim, where multiple audiences are allowed
    pub fn with_audiences(mut self, aud: impl Into<Audiences>) -> Self {
        self.aud = aud.into();
        self
    }

    /// Sets the `iss` claim
    pub fn with_issuer(mut self, iss: impl Into<Issuer>) -> Self {
        self.iss = Some(iss.into());
        self
    }

    /// Sets the `sub` claim
    pub fn with_subject(mut self, sub: impl Into<Subject>) -> Self {
        self.sub = Some(sub.into());
        self
    }

    /// Sets the `exp` claim to `secs` seconds from now, per the system clock
    pub fn with_future_expiration(self, secs: u64) -> Self {
        self.with_future_expiration_from_clock(secs, &System)
    }

    /// Sets the `exp` claim to `secs` seconds from now, per the given clock
    pub fn with_future_expiration_from_clock<C: Clock>(mut self, secs: u64, clock: &C) -> Self {
        let n = clock.now();
        self.exp = Some(UnixTime(n.0 + secs));
        self
    }

    /// Sets the `exp` claim
    pub fn with_expiration(mut self, time: UnixTime) -> Self {
        self.exp = Some(time);
        self
    }

    /// Sets the `nbf` claim
    pub fn with_not_before(mut self, time: UnixTime) -> Self {
        self.nbf = Some(time);
        self
    }

    /// Produces a signed token carrying these claims
    ///
    /// # Errors
    ///
    /// Returns an error if the signature cannot be produced.
    #[cfg(feature = "hmac")]
    pub fn sign<H: Serialize + HasAlgorithm>(
        &self,
        jwk: &jwk::Jwk,
        headers: &H,
    ) -> Result<Jwt, error::JwtSigningError> {
        Jwt::try_from_parts_with_signature(headers, self, jwk)
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;
    use trellis_clock::TestClock;

    use super::*;

    #[test]
    fn deserializes_minimal_claims() -> Result<()> {
        const DATA: &str = r#"{
                "nbf": 345,
                "iss": "me"
            }"#;

        let claims: BasicClaims = serde_json::from_str(DATA)?;
        assert_eq!(claims.nbf(), Some(UnixTime(345)));
        assert_eq!(claims.iss().map(|i| i.as_str()), Some("me"));

        Ok(())
    }

    #[test]
    fn deserializes_audience_as_string_or_array() -> Result<()> {
        let single: BasicClaims = serde_json::from_str(r#"{ "aud": "one" }"#)?;
        assert_eq!(single.aud().iter().count(), 1);

        let many: BasicClaims = serde_json::from_str(r#"{ "aud": ["one", "two"] }"#)?;
        assert_eq!(many.aud().iter().count(), 2);

        Ok(())
    }

    fn validator() -> CoreValidator {
        CoreValidator::default()
            .add_approved_algorithm(jwa::Algorithm::HS256)
            .add_allowed_audience(Audience::from_static("plants-api"))
            .require_issuer(Issuer::from_static("authority"))
    }

    fn claims_for(exp: u64) -> BasicClaims {
        BasicClaims::new()
            .with_audience(Audience::from_static("plants-api"))
            .with_issuer(Issuer::from_static("authority"))
            .with_expiration(UnixTime(exp))
    }

    #[test]
    fn accepts_valid_claims() {
        let header = BasicHeaders::new(jwa::Algorithm::HS256);
        let clock = TestClock::new(UnixTime(100));

        assert!(validator()
            .validate_with_clock(&header, &claims_for(101), &clock)
            .is_ok());
    }

    #[test]
    fn rejects_token_expired_one_second_ago() {
        let header = BasicHeaders::new(jwa::Algorithm::HS256);
        let clock = TestClock::new(UnixTime(100));

        let result = validator().validate_with_clock(&header, &claims_for(99), &clock);
        assert!(matches!(result, Err(error::ClaimsRejected::TokenExpired)));
    }

    #[test]
    fn rejects_token_expiring_now() {
        let header = BasicHeaders::new(jwa::Algorithm::HS256);
        let clock = TestClock::new(UnixTime(100));

        let result = validator().validate_with_clock(&header, &claims_for(100), &clock);
        assert!(matches!(result, Err(error::ClaimsRejected::TokenExpired)));
    }

    #[test]
    fn leeway_tolerates_skew() {
        let header = BasicHeaders::new(jwa::Algorithm::HS256);
        let clock = TestClock::new(UnixTime(100));

        let result = validator()
            .with_leeway_secs(5)
            .validate_with_clock(&header, &claims_for(97), &clock);
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_token_not_yet_valid() {
        let header = BasicHeaders::new(jwa::Algorithm::HS256);
        let clock = TestClock::new(UnixTime(100));

        let claims = claims_for(200).with_not_before(UnixTime(150));
        let result = validator().validate_with_clock(&header, &claims, &clock);
        assert!(matches!(
            result,
            Err(error::ClaimsRejected::TokenNotYetValid)
        ));
    }

    #[test]
    fn nbf_is_optional() {
        let header = BasicHeaders::new(jwa::Algorithm::HS256);
        let clock = TestClock::new(UnixTime(100));

        assert!(validator()
            .validate_with_clock(&header, &claims_for(101), &clock)
            .is_ok());
    }

    #[test]
    fn rejects_unapproved_algorithm() {
        let header = BasicHeaders::new(jwa::Algorithm::HS384);
        let clock = TestClock::new(UnixTime(100));

        let result = validator().validate_with_clock(&header, &claims_for(101), &clock);
        assert!(matches!(
            result,
            Err(error::ClaimsRejected::InvalidAlgorithm)
        ));
    }

    #[test]
    fn rejects_wrong_audience() {
        let header = BasicHeaders::new(jwa::Algorithm::HS256);
        let clock = TestClock::new(UnixTime(100));

        let claims = BasicClaims::new()
            .with_audience(Audience::from_static("other-api"))
            .with_issuer(Issuer::from_static("authority"))
            .with_expiration(UnixTime(101));

        let result = validator().validate_with_clock(&header, &claims, &clock);
        assert!(matches!(
            result,
            Err(error::ClaimsRejected::InvalidAudience)
        ));
    }

    #[test]
    fn rejects_wrong_issuer() {
        let header = BasicHeaders::new(jwa::Algorithm::HS256);
        let clock = TestClock::new(UnixTime(100));

        let claims = BasicClaims::new()
            .with_audience(Audience::from_static("plants-api"))
            .with_issuer(Issuer::from_static("somebody-else"))
            .with_expiration(UnixTime(101));

        let result = validator().validate_with_clock(&header, &claims, &clock);
        assert!(matches!(result, Err(error::ClaimsRejected::InvalidIssuer)));
    }

    #[test]
    fn rejects_missing_expiration() {
        let header = BasicHeaders::new(jwa::Algorithm::HS256);
        let clock = TestClock::new(UnixTime(100));

        let claims = BasicClaims::new()
            .with_audience(Audience::from_static("plants-api"))
            .with_issuer(Issuer::from_static("authority"));

        let result = validator().validate_with_clock(&header, &claims, &clock);
        assert!(matches!(
            result,
            Err(error::ClaimsRejected::MissingRequiredClaim("exp"))
        ));
    }

    #[test]
    fn malformed_token_fails_decomposition() {
        let token = Jwt::from_static("not-a-token");
        let result = token.decompose::<BasicHeaders>();
        assert!(matches!(
            result,
            Err(error::JwtVerifyError::MalformedToken(_))
        ));
    }

    #[test]
    #[cfg(feature = "hmac")]
    fn round_trips_hs256() -> Result<()> {
        let key = jwk::Jwk::from(jwa::Hmac::generate(jwa::Algorithm::HS256)?)
            .with_algorithm(jwa::Algorithm::HS256);

        let claims = BasicClaims::new()
            .with_issuer(Issuer::from_static("authority"))
            .with_expiration(UnixTime(100));

        let headers = BasicHeaders::new(jwa::Algorithm::HS256);

        let token = claims.sign(&key, &headers)?;

        let validator = CoreValidator::default().ignore_expiration();
        let verified: Validated = token.verify(&key, &validator)?;

        assert_eq!(verified.claims(), &claims);
        assert_eq!(verified.headers(), &headers);

        Ok(())
    }

    #[test]
    #[cfg(feature = "hmac")]
    fn tampered_payload_fails_signature_check() -> Result<()> {
        let key = jwk::Jwk::from(jwa::Hmac::generate(jwa::Algorithm::HS256)?)
            .with_algorithm(jwa::Algorithm::HS256);

        let claims = BasicClaims::new()
            .with_issuer(Issuer::from_static("authority"))
            .with_expiration(UnixTime(100));

        let token = claims.sign(&key, &BasicHeaders::new(jwa::Algorithm::HS256))?;

        let mut parts: Vec<&str> = token.as_str().split('.').collect();
        let forged_payload = Base64Url::from_raw(
            br#"{"iss":"authority","exp":100,"sub":"intruder"}"#.to_vec(),
        )
        .to_string();
        parts[1] = &forged_payload;
        let forged = Jwt::new(parts.join("."));

        let validator = CoreValidator::default().ignore_expiration();
        let result = forged.verify::<BasicClaims, BasicHeaders, _>(&key, &validator);

        assert!(matches!(
            result,
            Err(error::JwtVerifyError::JwkVerifyError(e)) if e.is_signature_mismatch()
        ));

        Ok(())
    }

    #[test]
    fn concealed_display_and_debug() {
        let token = Jwt::from_static("header.payload.signature");
        assert_eq!(format!("{token}"), "***JWT***");
        assert_eq!(format!("{token:?}"), "***JWT***");
        assert_eq!(format!("{token:#}"), "header.payload.signature");
    }
}
