//! The local user record created on first login

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use trellis::jwt::Subject;
use trellis_clock::UnixTime;

/// A local user's generated primary key
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The provided name does not match any known role
#[derive(Debug, Error)]
#[error("'{role}' does not match any known role")]
pub struct UnknownRole {
    role: String,
}

/// The closed set of roles a local user may hold
///
/// [`Role::Public`] is the least-privileged role and is the one granted
/// during provisioning. Promotion to [`Role::Admin`] is an administrative
/// action outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Full administrative access
    Admin,
    /// Ordinary, least-privileged access
    Public,
}

impl Role {
    /// The role's canonical name, as stored and as sent to the provider
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Public => "Public",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Admin" => Ok(Self::Admin),
            "Public" => Ok(Self::Public),
            other => Err(UnknownRole {
                role: other.to_string(),
            }),
        }
    }
}

/// A provisioned local user
///
/// Created exactly once per external subject; the row's identity fields and
/// role are never rewritten by provisioning after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUser {
    /// The generated local primary key
    pub id: UserId,
    /// The external subject this row was provisioned for; unique
    pub subject: Subject,
    /// Display name, captured from the provider profile at first login
    pub name: String,
    /// Username or email, captured from the provider profile at first login
    pub username: String,
    /// The user's current role
    pub role: Role,
    /// When the row was created
    pub created_at: UnixTime,
}

/// A candidate row for an identity not yet provisioned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    /// The external subject to provision
    pub subject: Subject,
    /// Display name from the provider profile
    pub name: String,
    /// Username or email from the provider profile
    pub username: String,
    /// The role the row is created with
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_its_name() {
        for role in [Role::Admin, Role::Public] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!("Gardener".parse::<Role>().is_err());
    }
}
