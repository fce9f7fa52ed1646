//! Identity collaborator.
//!
//! The scorer asks an [`Identity`] for the current user before every
//! operation and refuses to touch the store without one.

use std::sync::{Arc, RwLock};

use crate::model::UserId;

/// Source of the authenticated user.
pub trait Identity: Send + Sync {
    /// The signed-in user, or `None` when nobody is authenticated.
    fn current_user(&self) -> Option<UserId>;
}

/// A fixed user, for single-user embedding and tests.
impl Identity for UserId {
    fn current_user(&self) -> Option<UserId> {
        Some(*self)
    }
}

/// Shared, mutable sign-in state.
///
/// Clones share the same session, so signing out through one handle
/// immediately affects every scorer holding another.
#[derive(Clone, Default)]
pub struct Session {
    user: Arc<RwLock<Option<UserId>>>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A session with `user` already signed in.
    #[must_use]
    pub fn signed_in(user: UserId) -> Self {
        let session = Self::new();
        session.sign_in(user);
        session
    }

    pub fn sign_in(&self, user: UserId) {
        *self.user.write().expect("session lock poisoned") = Some(user);
        tracing::debug!(%user, "signed in");
    }

    pub fn sign_out(&self) {
        let previous = self.user.write().expect("session lock poisoned").take();
        tracing::debug!(user = ?previous, "signed out");
    }
}

impl Identity for Session {
    fn current_user(&self) -> Option<UserId> {
        *self.user.read().expect("session lock poisoned")
    }
}
