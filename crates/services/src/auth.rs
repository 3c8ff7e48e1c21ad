use std::sync::{Arc, PoisonError, RwLock};

use course_core::model::UserId;

/// Supplies the signed-in user, if any.
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<UserId>;
}

/// Mutable sign-in state shared between the auth wrapper and services.
#[derive(Clone, Default)]
pub struct SessionAuth {
    user: Arc<RwLock<Option<UserId>>>,
}

impl SessionAuth {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn signed_in(user: UserId) -> Self {
        Self {
            user: Arc::new(RwLock::new(Some(user))),
        }
    }

    pub fn sign_in(&self, user: UserId) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = Some(user);
    }

    pub fn sign_out(&self) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl AuthProvider for SessionAuth {
    fn current_user(&self) -> Option<UserId> {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_sign_in_state() {
        let auth = SessionAuth::anonymous();
        let view = auth.clone();
        assert!(view.current_user().is_none());

        auth.sign_in(UserId::new("u1"));
        assert_eq!(view.current_user(), Some(UserId::new("u1")));

        view.sign_out();
        assert!(auth.current_user().is_none());
    }
}
