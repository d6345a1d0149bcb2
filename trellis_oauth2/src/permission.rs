//! Permissions granted to a bearer token
//!
//! A permission is a single string capability such as `post:plants`, using
//! the character set allowed for scope tokens in [RFC 6749, Section
//! 3.3][RFC6749 3.3]. Identity providers deliver the granted set either as a
//! JSON array (the `permissions` claim) or as a space-delimited string (the
//! `scope` claim); [`PermissionSet`] deserializes from both shapes.
//!
//!   [RFC6749 3.3]: https://datatracker.ietf.org/doc/html/rfc6749#section-3.3

use std::{collections::hash_set, convert::TryFrom, iter::FromIterator, str::FromStr};

use ahash::AHashSet;
use aliri_braid::braid;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use trellis::jwt;
use trellis_clock::UnixTime;

/// An invalid permission
#[derive(Debug, Error)]
pub enum InvalidPermission {
    /// The permission was the empty string
    #[error("permission cannot be empty")]
    EmptyString,
    /// The permission contained an invalid byte
    #[error("invalid permission byte at position {position}: 0x{value:02x}")]
    InvalidByte {
        /// The index in the permission where the invalid byte was found
        position: usize,
        /// The invalid byte value
        value: u8,
    },
}

/// A single string capability granting the right to perform one class of
/// protected operation
///
/// A permission must be composed of printable ASCII characters excluding
/// ` ` (space), `"` (double quote), and `\` (backslash).
#[braid(
    serde,
    validator,
    ref_doc = "A borrowed reference to a [`Permission`]"
)]
pub struct Permission;

impl From<std::convert::Infallible> for InvalidPermission {
    fn from(value: std::convert::Infallible) -> Self {
        match value {}
    }
}

impl aliri_braid::Validator for Permission {
    type Error = InvalidPermission;

    /// Validates that the permission is non-empty and composed of printable
    /// ASCII characters except ` `, `"`, and `\`
    fn validate(s: &str) -> Result<(), Self::Error> {
        if s.is_empty() {
            Err(InvalidPermission::EmptyString)
        } else if let Some((position, &value)) = s
            .as_bytes()
            .iter()
            .enumerate()
            .find(|(_, &b)| b <= 0x20 || b == 0x22 || b == 0x5C || 0x7F <= b)
        {
            Err(InvalidPermission::InvalidByte { position, value })
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum PermissionsDto {
    String(String),
    Array(Vec<Permission>),
}

impl TryFrom<Option<PermissionsDto>> for PermissionSet {
    type Error = InvalidPermission;

    fn try_from(dto: Option<PermissionsDto>) -> Result<Self, Self::Error> {
        if let Some(dto) = dto {
            match dto {
                PermissionsDto::String(s) => Self::try_from(s),
                PermissionsDto::Array(arr) => Ok(arr.into_iter().collect()),
            }
        } else {
            Ok(Self::empty())
        }
    }
}

impl From<PermissionSet> for PermissionsDto {
    fn from(s: PermissionSet) -> Self {
        let tokens: Vec<_> = s.0.into_iter().map(Permission::take).collect();
        PermissionsDto::String(tokens.join(" "))
    }
}

/// The set of permissions granted to a token
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "Option<PermissionsDto>", into = "PermissionsDto")]
pub struct PermissionSet(AHashSet<Permission>);

impl PermissionSet {
    /// Produces an empty permission set
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self(AHashSet::new())
    }

    /// Constructs a set holding a single permission
    #[inline]
    #[must_use]
    pub fn single(permission: Permission) -> Self {
        let mut s = Self::empty();
        s.insert(permission);
        s
    }

    /// Adds an additional permission, builder style
    #[inline]
    #[must_use]
    pub fn and(self, permission: Permission) -> Self {
        let mut s = self;
        s.insert(permission);
        s
    }

    /// Constructs a set from an iterator of permissions
    #[inline]
    #[must_use]
    pub fn from_permissions<I>(permissions: I) -> Self
    where
        I: IntoIterator<Item = Permission>,
    {
        Self::from_iter(permissions)
    }

    /// Adds a permission to the set
    #[inline]
    pub fn insert(&mut self, permission: Permission) {
        self.0.insert(permission);
    }

    /// Produces an iterator over the permissions in this set
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &PermissionRef> {
        self.into_iter()
    }

    /// Whether the set is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The number of permissions in the set
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this set holds the given permission
    #[inline]
    #[must_use]
    pub fn contains(&self, permission: &PermissionRef) -> bool {
        self.0.contains(permission)
    }

    /// Whether this set holds every permission in `required`
    #[inline]
    #[must_use]
    pub fn contains_all(&self, required: &PermissionSet) -> bool {
        self.0.is_superset(&required.0)
    }
}

impl IntoIterator for PermissionSet {
    type Item = Permission;
    type IntoIter = <AHashSet<Permission> as IntoIterator>::IntoIter;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// An iterator over a set of borrowed permissions
#[derive(Clone, Debug)]
pub struct Iter<'a> {
    iter: hash_set::Iter<'a, Permission>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a PermissionRef;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|x| x.as_ref())
    }
}

impl<'a> IntoIterator for &'a PermissionSet {
    type Item = &'a PermissionRef;
    type IntoIter = Iter<'a>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        Self::IntoIter {
            iter: self.0.iter(),
        }
    }
}

impl<S> Extend<S> for PermissionSet
where
    S: Into<Permission>,
{
    #[inline]
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = S>,
    {
        self.0.extend(iter.into_iter().map(Into::into))
    }
}

impl<S> FromIterator<S> for PermissionSet
where
    S: Into<Permission>,
{
    #[inline]
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = S>,
    {
        let mut set = Self::empty();
        set.extend(iter);
        set
    }
}

impl TryFrom<&'_ str> for PermissionSet {
    type Error = InvalidPermission;

    #[inline]
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.split_whitespace()
            .map(|s| Permission::new(s.to_owned()))
            .collect()
    }
}

impl TryFrom<String> for PermissionSet {
    type Error = InvalidPermission;

    #[inline]
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::try_from(s.as_str())
    }
}

impl FromStr for PermissionSet {
    type Err = InvalidPermission;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

/// Indicates that the type carries a granted permission set
pub trait HasPermissions {
    /// The permissions granted to the underlying token, generally found in
    /// the `permissions` or `scope` claim
    fn permissions(&self) -> &PermissionSet;
}

impl HasPermissions for PermissionSet {
    #[inline]
    fn permissions(&self) -> &PermissionSet {
        self
    }
}

/// A convenience claims structure for callers that only care about the
/// basic claims and the granted permission set
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClaimsWithPermissions {
    /// The basic claims
    #[serde(flatten)]
    pub basic: jwt::BasicClaims,

    /// The `permissions` claim
    #[serde(default)]
    pub permissions: PermissionSet,
}

impl jwt::CoreClaims for ClaimsWithPermissions {
    #[inline]
    fn nbf(&self) -> Option<UnixTime> {
        self.basic.nbf()
    }

    #[inline]
    fn exp(&self) -> Option<UnixTime> {
        self.basic.exp()
    }

    #[inline]
    fn aud(&self) -> &jwt::Audiences {
        self.basic.aud()
    }

    #[inline]
    fn iss(&self) -> Option<&jwt::IssuerRef> {
        self.basic.iss()
    }

    #[inline]
    fn sub(&self) -> Option<&jwt::SubjectRef> {
        self.basic.sub()
    }
}

impl HasPermissions for ClaimsWithPermissions {
    #[inline]
    fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }
}

/// Construct a [`PermissionSet`] from a list of permission literals
///
/// # Panics
///
/// Panics if any of the provided literals is not a valid [`Permission`].
///
/// ```
/// use trellis_oauth2::permissions;
///
/// let set = permissions!["post:plants", "post:observations"];
/// assert_eq!(set.len(), 2);
/// ```
#[macro_export]
macro_rules! permissions {
    ($($perm:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut set = $crate::PermissionSet::empty();
        $(
            set.insert(
                $perm
                    .parse::<$crate::Permission>()
                    .expect("invalid permission literal"),
            );
        )*
        set
    }};
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;
    use trellis::jwt::CoreClaims as _;

    #[test]
    fn owned_handles_valid() {
        let x = Permission::new("post:plants".to_owned()).unwrap();
        assert_eq!(x.as_str(), "post:plants");
    }

    #[test]
    fn owned_rejects_empty() {
        let x = Permission::new("".to_owned());
        assert!(matches!(x, Err(InvalidPermission::EmptyString)));
    }

    #[test]
    fn owned_rejects_space() {
        let x = Permission::new("post: plants".to_owned());
        assert!(matches!(x, Err(InvalidPermission::InvalidByte { .. })));
    }

    #[test]
    fn owned_rejects_quote() {
        let x = Permission::new("post:\"plants\"".to_owned());
        assert!(matches!(x, Err(InvalidPermission::InvalidByte { .. })));
    }

    #[test]
    fn owned_rejects_backslash() {
        let x = Permission::new("post:\\plants".to_owned());
        assert!(matches!(x, Err(InvalidPermission::InvalidByte { .. })));
    }

    #[test]
    fn owned_rejects_non_ascii() {
        let x = Permission::new("post:plantas¿".to_owned());
        assert!(matches!(x, Err(InvalidPermission::InvalidByte { .. })));
    }

    #[test]
    fn ref_handles_valid() {
        let x = PermissionRef::from_str("edit_or_delete:plants").unwrap();
        assert_eq!(x.as_str(), "edit_or_delete:plants");
    }

    #[test]
    fn set_parses_space_delimited_string() -> Result<()> {
        let set: PermissionSet = "post:plants edit_or_delete:plants".parse()?;
        assert_eq!(set.len(), 2);
        assert!(set.contains(PermissionRef::from_str("post:plants")?));
        Ok(())
    }

    #[test]
    fn set_deserializes_from_array_claim() -> Result<()> {
        let claims: ClaimsWithPermissions = serde_json::from_str(
            r#"{
                "iss": "authority",
                "sub": "auth0|123",
                "permissions": ["post:plants", "post:observations"]
            }"#,
        )?;

        assert_eq!(claims.permissions().len(), 2);
        assert_eq!(claims.sub().map(|s| s.as_str()), Some("auth0|123"));
        Ok(())
    }

    #[test]
    fn set_deserializes_from_string_claim() -> Result<()> {
        let set: PermissionSet = serde_json::from_str(r#""post:plants post:observations""#)?;
        assert_eq!(set.len(), 2);
        Ok(())
    }

    #[test]
    fn missing_permissions_claim_is_empty() -> Result<()> {
        let claims: ClaimsWithPermissions =
            serde_json::from_str(r#"{ "iss": "authority" }"#)?;
        assert!(claims.permissions().is_empty());
        Ok(())
    }

    #[test]
    fn contains_all_honors_superset_semantics() {
        let held = permissions!["post:plants", "post:observations"];
        assert!(held.contains_all(&permissions!["post:plants"]));
        assert!(!held.contains_all(&permissions!["edit_or_delete:plants"]));
        assert!(held.contains_all(&PermissionSet::empty()));
    }
}
