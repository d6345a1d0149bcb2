//! Persistence seam for local user records
//!
//! The store is the only component trusted to uphold the "at most one row
//! per external subject" invariant, because concurrent first logins may be
//! served by independent processes. Implementations back
//! [`insert_if_absent`][UserStore::insert_if_absent] with a uniqueness
//! constraint (or an equivalent atomic primitive) rather than a
//! check-then-insert sequence.

use std::{
    collections::{hash_map::Entry, HashMap},
    error::Error as StdError,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use trellis::jwt::{Subject, SubjectRef};
use trellis_clock::{Clock, System};

use crate::user::{LocalUser, NewUser, UserId};

/// The underlying persistence layer failed
#[derive(Debug, thiserror::Error)]
#[error("user store error")]
pub struct StoreError {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

impl StoreError {
    /// Wraps the underlying cause of the failure
    pub fn new(source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// The outcome of an atomic insert-if-absent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The candidate row was inserted
    Created(LocalUser),

    /// A row for the subject already existed; this is that row, unchanged
    Existing(LocalUser),
}

impl InsertOutcome {
    /// The stored row, whether it was just created or already present
    #[must_use]
    pub fn into_user(self) -> LocalUser {
        match self {
            Self::Created(user) | Self::Existing(user) => user,
        }
    }
}

/// Lookup and creation of local user records, keyed by external subject
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Finds the user provisioned for the given external subject
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying persistence layer fails.
    async fn find_by_subject(&self, subject: &SubjectRef)
        -> Result<Option<LocalUser>, StoreError>;

    /// Inserts the candidate row unless a row for its subject already exists
    ///
    /// This operation is atomic with respect to concurrent callers: of N
    /// racing inserts for the same subject, exactly one creates a row and
    /// the rest observe that row via [`InsertOutcome::Existing`].
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying persistence layer fails.
    async fn insert_if_absent(&self, candidate: NewUser) -> Result<InsertOutcome, StoreError>;
}

#[derive(Debug, Default)]
struct Inner {
    by_subject: HashMap<Subject, LocalUser>,
    next_id: i64,
}

/// An in-process user store
///
/// The reference implementation of the store contract, also used as the
/// test double. The map entry takes the place of a database uniqueness
/// constraint on the subject column.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    inner: Mutex<Inner>,
}

impl InMemoryUserStore {
    /// Constructs an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of provisioned users
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.lock().by_subject.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_subject(
        &self,
        subject: &SubjectRef,
    ) -> Result<Option<LocalUser>, StoreError> {
        Ok(self.lock().by_subject.get(subject).cloned())
    }

    async fn insert_if_absent(&self, candidate: NewUser) -> Result<InsertOutcome, StoreError> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        match inner.by_subject.entry(candidate.subject.clone()) {
            Entry::Occupied(entry) => Ok(InsertOutcome::Existing(entry.get().clone())),
            Entry::Vacant(entry) => {
                inner.next_id += 1;
                let user = LocalUser {
                    id: UserId(inner.next_id),
                    subject: candidate.subject,
                    name: candidate.name,
                    username: candidate.username,
                    role: candidate.role,
                    created_at: System.now(),
                };
                let user = entry.insert(user).clone();
                Ok(InsertOutcome::Created(user))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::Role;

    fn candidate(subject: &str) -> NewUser {
        NewUser {
            subject: Subject::from(subject),
            name: "Rosa Chan".to_string(),
            username: "rosa@example.com".to_string(),
            role: Role::Public,
        }
    }

    #[tokio::test]
    async fn second_insert_returns_the_first_row() {
        let store = InMemoryUserStore::new();

        let first = store
            .insert_if_absent(candidate("auth0|123"))
            .await
            .unwrap();
        let InsertOutcome::Created(first) = first else {
            panic!("first insert should create");
        };

        let mut other = candidate("auth0|123");
        other.name = "Someone Else".to_string();
        let second = store.insert_if_absent(other).await.unwrap();

        match second {
            InsertOutcome::Existing(user) => {
                assert_eq!(user.id, first.id);
                assert_eq!(user.name, "Rosa Chan");
            }
            InsertOutcome::Created(_) => panic!("second insert must not create"),
        }

        assert_eq!(store.user_count(), 1);
    }

    #[tokio::test]
    async fn ids_are_distinct_across_subjects() {
        let store = InMemoryUserStore::new();

        let a = store
            .insert_if_absent(candidate("auth0|a"))
            .await
            .unwrap()
            .into_user();
        let b = store
            .insert_if_absent(candidate("auth0|b"))
            .await
            .unwrap()
            .into_user();

        assert_ne!(a.id, b.id);

        let found = store
            .find_by_subject(SubjectRef::from_str("auth0|a"))
            .await
            .unwrap()
            .expect("user should be found");
        assert_eq!(found.id, a.id);
    }
}
