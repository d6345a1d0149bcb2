//! First-login provisioning, idempotent and race-safe
//!
//! The first time an external identity is seen, it must be granted the
//! default role on the provider side and recorded locally. Both effects
//! happen on the login callback path, where two tabs or two processes can
//! race, so the orchestration leans on two rules:
//!
//! * the provider-side role grant is a precondition of the local row; if
//!   the grant fails, no row is created;
//! * the local insert is an atomic insert-if-absent, and a loser of the
//!   race adopts the winner's row instead of writing its own.

use std::error::Error as StdError;

use async_trait::async_trait;
use thiserror::Error;
use trellis::jwt::SubjectRef;

use crate::{
    store::{InsertOutcome, StoreError, UserStore},
    user::{LocalUser, NewUser, Role},
};

/// The provider's administrative API rejected or never received the role
/// assignment
#[derive(Debug, Error)]
#[error("role assignment failed")]
pub struct RoleAssignmentError {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

impl RoleAssignmentError {
    /// Wraps the underlying cause of the failure
    pub fn new(source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// The identity's profile could not be retrieved from the provider
#[derive(Debug, Error)]
#[error("profile fetch failed")]
pub struct ProfileFetchError {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

impl ProfileFetchError {
    /// Wraps the underlying cause of the failure
    pub fn new(source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// The profile the provider asserts for an authenticated identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Display name
    pub name: String,
    /// Username or email
    pub username: String,
    /// Avatar URL, if the provider published one
    pub picture: Option<String>,
}

/// A collaborator that can retrieve an identity's profile from the provider
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Fetches the profile asserted for the given subject
    ///
    /// # Errors
    ///
    /// Returns an error if the profile cannot be retrieved or does not
    /// belong to the subject.
    async fn fetch_profile(&self, subject: &SubjectRef) -> Result<Profile, ProfileFetchError>;
}

/// A collaborator that can attach a role to an identity at the provider
///
/// Role assignment must be assumed at-most-once: implementations and
/// callers must not retry an assignment that may already have taken effect.
#[async_trait]
pub trait RoleAdministrator: Send + Sync {
    /// Attaches the given role to the subject on the provider side
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects or never acknowledges the
    /// assignment.
    async fn assign_role(&self, subject: &SubjectRef, role: Role)
        -> Result<(), RoleAssignmentError>;
}

/// Provisioning could not complete; no partial user was left behind
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// The identity's profile could not be retrieved
    #[error("unable to fetch the identity's profile")]
    ProfileFetch(#[from] ProfileFetchError),

    /// The provider-side role grant failed, so no local row was created
    #[error("unable to assign the default role to the identity")]
    RoleAssignment(#[from] RoleAssignmentError),

    /// The local store failed
    #[error("user store failure")]
    Store(#[from] StoreError),
}

/// Orchestrates get-or-create of local users on login callbacks
///
/// [`ensure_user`][Self::ensure_user] is idempotent: a subject that already
/// has a row gets that row back untouched, with no provider traffic. Only a
/// never-seen subject incurs the profile fetch, the role grant, and the
/// insert.
#[derive(Debug)]
pub struct ProvisioningService<S, R> {
    store: S,
    roles: R,
    default_role: Role,
}

impl<S, R> ProvisioningService<S, R>
where
    S: UserStore,
    R: RoleAdministrator,
{
    /// Constructs a provisioning service granting [`Role::Public`], the
    /// least-privileged role, to new users
    pub fn new(store: S, roles: R) -> Self {
        Self {
            store,
            roles,
            default_role: Role::Public,
        }
    }

    /// The backing user store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the local user for the subject, creating one if this is the
    /// first time the subject has been seen
    ///
    /// # Errors
    ///
    /// Returns an error if the profile fetch, the provider-side role grant,
    /// or the local store fails. A failed grant leaves no local row behind.
    #[tracing::instrument(skip_all, fields(user.subject = %subject))]
    pub async fn ensure_user<P>(
        &self,
        subject: &SubjectRef,
        profiles: &P,
    ) -> Result<LocalUser, ProvisioningError>
    where
        P: ProfileSource,
    {
        if let Some(existing) = self.store.find_by_subject(subject).await? {
            tracing::debug!(user.id = %existing.id, "user already provisioned");
            return Ok(existing);
        }

        let profile = match profiles.fetch_profile(subject).await {
            Ok(profile) => profile,
            Err(err) => {
                tracing::warn!(error = %err, "provisioning failed fetching profile");
                return Err(err.into());
            }
        };

        if let Err(err) = self.roles.assign_role(subject, self.default_role).await {
            tracing::warn!(error = %err, "provisioning failed assigning default role");
            return Err(err.into());
        }

        let candidate = NewUser {
            subject: subject.to_owned(),
            name: profile.name,
            username: profile.username,
            role: self.default_role,
        };

        match self.store.insert_if_absent(candidate).await? {
            InsertOutcome::Created(user) => {
                tracing::info!(user.id = %user.id, user.role = %user.role, "provisioned new user");
                Ok(user)
            }
            InsertOutcome::Existing(user) => {
                tracing::debug!(user.id = %user.id, "lost provisioning race; adopting existing row");
                Ok(user)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use trellis::jwt::Subject;

    use super::*;
    use crate::store::InMemoryUserStore;

    #[derive(Debug, Default)]
    struct CountingAdmin {
        calls: AtomicUsize,
    }

    impl CountingAdmin {
        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RoleAdministrator for CountingAdmin {
        async fn assign_role(
            &self,
            _subject: &SubjectRef,
            _role: Role,
        ) -> Result<(), RoleAssignmentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Debug)]
    struct FailingAdmin;

    #[async_trait]
    impl RoleAdministrator for FailingAdmin {
        async fn assign_role(
            &self,
            _subject: &SubjectRef,
            _role: Role,
        ) -> Result<(), RoleAssignmentError> {
            Err(RoleAssignmentError::new("administrative API returned 503"))
        }
    }

    #[derive(Debug)]
    struct StaticProfiles;

    #[async_trait]
    impl ProfileSource for StaticProfiles {
        async fn fetch_profile(
            &self,
            subject: &SubjectRef,
        ) -> Result<Profile, ProfileFetchError> {
            Ok(Profile {
                name: "Rosa Chan".to_string(),
                username: format!("{subject}@example.com"),
                picture: None,
            })
        }
    }

    fn subject() -> Subject {
        Subject::from("auth0|123")
    }

    #[tokio::test]
    async fn first_login_creates_user_with_default_role() {
        let service = ProvisioningService::new(InMemoryUserStore::new(), CountingAdmin::default());

        let user = service
            .ensure_user(&subject(), &StaticProfiles)
            .await
            .expect("provisioning should succeed");

        assert_eq!(user.role, Role::Public);
        assert_eq!(user.subject, subject());
        assert_eq!(user.name, "Rosa Chan");
        assert_eq!(service.store().user_count(), 1);
    }

    #[tokio::test]
    async fn ensure_user_is_idempotent() {
        let service = ProvisioningService::new(InMemoryUserStore::new(), CountingAdmin::default());

        let first = service
            .ensure_user(&subject(), &StaticProfiles)
            .await
            .unwrap();
        let second = service
            .ensure_user(&subject(), &StaticProfiles)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(service.store().user_count(), 1);
        assert_eq!(service.roles.call_count(), 1);
    }

    #[tokio::test]
    async fn failed_role_grant_leaves_no_user_behind() {
        let service = ProvisioningService::new(InMemoryUserStore::new(), FailingAdmin);

        let err = service
            .ensure_user(&subject(), &StaticProfiles)
            .await
            .expect_err("provisioning should fail");

        assert!(matches!(err, ProvisioningError::RoleAssignment(_)));
        assert_eq!(service.store().user_count(), 0);
    }

    #[tokio::test]
    async fn existing_user_is_never_rewritten() {
        let store = InMemoryUserStore::new();
        store
            .insert_if_absent(NewUser {
                subject: subject(),
                name: "Original Name".to_string(),
                username: "original@example.com".to_string(),
                role: Role::Admin,
            })
            .await
            .unwrap();

        let service = ProvisioningService::new(store, CountingAdmin::default());

        let user = service
            .ensure_user(&subject(), &StaticProfiles)
            .await
            .unwrap();

        assert_eq!(user.role, Role::Admin);
        assert_eq!(user.name, "Original Name");
        assert_eq!(service.roles.call_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_first_logins_create_exactly_one_user() {
        let service = Arc::new(ProvisioningService::new(
            InMemoryUserStore::new(),
            CountingAdmin::default(),
        ));

        const WORKERS: usize = 8;

        let mut handles = Vec::with_capacity(WORKERS);
        for _ in 0..WORKERS {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service.ensure_user(&subject(), &StaticProfiles).await
            }));
        }

        let mut ids = Vec::with_capacity(WORKERS);
        for handle in handles {
            let user = handle
                .await
                .expect("task should not panic")
                .expect("provisioning should succeed");
            ids.push(user.id);
        }

        assert_eq!(service.store().user_count(), 1);
        assert!(ids.windows(2).all(|w| w[0] == w[1]));

        let role_calls = service.roles.call_count();
        assert!((1..=WORKERS).contains(&role_calls));
    }
}
