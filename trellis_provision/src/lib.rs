//! First-login provisioning of local users against an external identity
//! provider
//!
//! The first time a given external identity completes a login, three things
//! must happen exactly once, in order: the provider asserts the identity's
//! profile, the provider grants the identity the default (least-privileged)
//! role, and a local user row is created keyed by the external subject. The
//! [`ProvisioningService`] orchestrates those steps so that
//!
//! * a repeat login returns the existing row untouched, with no provider
//!   traffic at all;
//! * a failed role grant creates no local row;
//! * concurrent first logins, even from independent processes, converge
//!   on a single row, with the losers adopting the winner's row.
//!
//! The seams are traits: [`UserStore`] for persistence (the uniqueness
//! constraint lives there), [`RoleAdministrator`] for the provider's
//! administrative API, and [`ProfileSource`] for the provider's profile
//! endpoint. [`ManagementApiClient`] and [`UserInfoClient`] are the HTTP
//! implementations; [`InMemoryUserStore`] is the in-process store.

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

#[cfg(feature = "reqwest")]
pub mod provider;
mod provision;
mod session;
mod store;
mod user;

#[cfg(feature = "reqwest")]
pub use provider::{
    AccessToken, AccessTokenRef, ManagementApiClient, ProviderConfigError, RoleId, RoleIdRef,
    RoleMapping, UserInfoClient, DEFAULT_REQUEST_TIMEOUT,
};
pub use provision::{
    Profile, ProfileFetchError, ProfileSource, ProvisioningError, ProvisioningService,
    RoleAdministrator, RoleAssignmentError,
};
pub use session::SessionContext;
pub use store::{InMemoryUserStore, InsertOutcome, StoreError, UserStore};
pub use user::{LocalUser, NewUser, Role, UnknownRole, UserId};
