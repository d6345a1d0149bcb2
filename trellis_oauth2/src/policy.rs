use thiserror::Error;

use crate::PermissionSet;

/// Indicates the requester held insufficient permissions to be granted
/// access to a controlled resource
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Error)]
#[error("insufficient permissions")]
pub struct InsufficientPermissions;

/// An access policy evaluated against a token's granted permission set
///
/// A policy is a set of alternatives. Within an alternative, the token must
/// hold _every_ listed permission; across alternatives, satisfying _any_ one
/// grants access. A policy with no alternatives denies all requests, and an
/// alternative requiring no permissions allows all requests, which is how
/// read-only endpoints are expressed.
///
/// # Examples
///
/// ## Require a single permission
/// ```
/// use trellis_oauth2::{permissions, PermissionPolicy, PermissionSet};
///
/// let policy = PermissionPolicy::allow_one(permissions!["post:plants"]);
///
/// assert!(policy.evaluate(&permissions!["post:plants", "post:observations"]).is_ok());
/// assert!(policy.evaluate(&permissions!["post:observations"]).is_err());
/// ```
///
/// ## Allow any request
/// ```
/// use trellis_oauth2::{PermissionPolicy, PermissionSet};
///
/// let policy = PermissionPolicy::allow_any();
/// assert!(policy.evaluate(&PermissionSet::empty()).is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct PermissionPolicy {
    inner: PolicyInner,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum PolicyInner {
    DenyAll,
    AllowAny,
    AllowOne(PermissionSet),
    AllowMany(Vec<PermissionSet>),
}

impl Default for PermissionPolicy {
    #[inline]
    fn default() -> Self {
        Self::deny_all()
    }
}

impl PermissionPolicy {
    /// Constructs a policy with no permissible alternatives, denying all
    /// requests
    #[inline]
    pub const fn deny_all() -> Self {
        Self {
            inner: PolicyInner::DenyAll,
        }
    }

    /// Constructs a policy that requires no permissions, allowing all
    /// requests bearing a valid token
    #[inline]
    pub const fn allow_any() -> Self {
        Self {
            inner: PolicyInner::AllowAny,
        }
    }

    /// Constructs a policy that requires all of this set of permissions
    #[inline]
    pub const fn allow_one(permissions: PermissionSet) -> Self {
        Self {
            inner: PolicyInner::AllowOne(permissions),
        }
    }

    /// Adds an alternate allowable permission set
    #[inline]
    pub fn or_allow(self, permissions: PermissionSet) -> Self {
        if permissions.is_empty() {
            Self::allow_any()
        } else {
            match self.inner {
                PolicyInner::AllowAny => Self::allow_any(),
                PolicyInner::DenyAll => Self::allow_one(permissions),
                PolicyInner::AllowOne(existing) => Self {
                    inner: PolicyInner::AllowMany(vec![existing, permissions]),
                },
                PolicyInner::AllowMany(mut sets) => {
                    sets.push(permissions);
                    Self {
                        inner: PolicyInner::AllowMany(sets),
                    }
                }
            }
        }
    }

    /// Adds an alternate allowable permission set in place
    pub fn allow(&mut self, permissions: PermissionSet) {
        let this = std::mem::take(self);
        *self = this.or_allow(permissions);
    }

    /// Constructs a policy requiring the space-delimited permissions in the
    /// given string
    ///
    /// # Panics
    ///
    /// Panics if the provided string is not a valid [`PermissionSet`].
    pub fn allow_one_from_static(permissions: &'static str) -> Self {
        match permissions.parse::<PermissionSet>() {
            Ok(permissions) => Self::allow_one(permissions),
            Err(err) => panic!("{}: permissions = {}", err, permissions),
        }
    }

    /// Adds an alternate allowable permission set from a string
    ///
    /// # Panics
    ///
    /// Panics if the provided string is not a valid [`PermissionSet`].
    pub fn or_allow_from_static(self, permissions: &'static str) -> Self {
        match permissions.parse::<PermissionSet>() {
            Ok(permissions) => self.or_allow(permissions),
            Err(err) => panic!("{}: permissions = {}", err, permissions),
        }
    }

    /// Evaluates whether the held permissions satisfy this policy
    ///
    /// # Errors
    ///
    /// Returns [`InsufficientPermissions`] if no alternative is satisfied by
    /// the held set.
    pub fn evaluate(&self, held: &PermissionSet) -> Result<(), InsufficientPermissions> {
        let allowed = match &self.inner {
            PolicyInner::DenyAll => false,
            PolicyInner::AllowAny => true,
            PolicyInner::AllowOne(required) => held.contains_all(required),
            PolicyInner::AllowMany(alternatives) => {
                alternatives.iter().any(|required| held.contains_all(required))
            }
        };

        if allowed {
            Ok(())
        } else {
            Err(InsufficientPermissions)
        }
    }

    const fn is_allow_all(&self) -> bool {
        matches!(self.inner, PolicyInner::AllowAny)
    }
}

impl Extend<PermissionSet> for PermissionPolicy {
    #[inline]
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = PermissionSet>,
    {
        for permissions in iter {
            self.allow(permissions);

            if self.is_allow_all() {
                break;
            }
        }
    }
}

impl FromIterator<PermissionSet> for PermissionPolicy {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = PermissionSet>,
    {
        let mut policy = Self::deny_all();
        policy.extend(iter);
        policy
    }
}

impl From<PermissionSet> for PermissionPolicy {
    #[inline]
    fn from(permissions: PermissionSet) -> Self {
        Self::allow_one(permissions)
    }
}

/// Construct a policy from a list of permission-set alternatives
///
/// ```
/// use trellis_oauth2::{permissions, policy};
///
/// let policy = policy![
///     permissions!["admin"],
///     permissions!["post:plants", "post:observations"],
/// ];
/// ```
///
/// This is equivalent to the following:
///
/// ```
/// use trellis_oauth2::{permissions, PermissionPolicy};
///
/// let policy = PermissionPolicy::deny_all()
///     .or_allow(permissions!["admin"])
///     .or_allow(permissions!["post:plants", "post:observations"]);
/// ```
#[macro_export]
macro_rules! policy {
    ($($permissions:expr),* $(,)?) => {
        $crate::PermissionPolicy::deny_all()
        $(
            .or_allow($permissions)
        )*
    };
}

#[cfg(test)]
mod tests {
    use crate::permissions;

    use super::*;

    #[test]
    fn deny_all_denies_everything() {
        let policy = PermissionPolicy::deny_all();
        assert!(policy.evaluate(&permissions!["admin"]).is_err());
        assert!(policy.evaluate(&PermissionSet::empty()).is_err());
    }

    #[test]
    fn allow_any_allows_empty_grants() {
        let policy = PermissionPolicy::allow_any();
        assert!(policy.evaluate(&PermissionSet::empty()).is_ok());
    }

    #[test]
    fn requires_every_permission_in_an_alternative() {
        let policy = PermissionPolicy::allow_one(permissions!["post:plants"]);

        assert!(policy.evaluate(&permissions!["post:observations"]).is_err());
        assert!(policy
            .evaluate(&permissions!["post:plants", "post:observations"])
            .is_ok());
    }

    #[test]
    fn empty_requirement_always_allows() {
        let policy = PermissionPolicy::allow_one(PermissionSet::empty());
        assert!(policy.evaluate(&PermissionSet::empty()).is_ok());
    }

    #[test]
    fn alternatives_are_evaluated_independently() {
        let policy = policy![
            permissions!["admin"],
            permissions!["special", "user"],
        ];

        assert!(policy.evaluate(&permissions!["admin"]).is_ok());
        assert!(policy.evaluate(&permissions!["user"]).is_err());
        assert!(policy.evaluate(&permissions!["special", "user"]).is_ok());
    }

    #[test]
    fn empty_alternative_upgrades_to_allow_any() {
        let policy = PermissionPolicy::deny_all().or_allow(PermissionSet::empty());
        assert!(policy.evaluate(&PermissionSet::empty()).is_ok());
    }
}
