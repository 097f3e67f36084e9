use parking_lot::RwLock;

use crate::domain::UserId;

/// Resolves the user on whose behalf the current call runs
pub trait IdentityResolver: Send + Sync {
    fn current_actor(&self) -> Option<UserId>;
}

/// Holds the signed-in user for a single client session
#[derive(Debug, Default)]
pub struct StaticIdentity {
    current: RwLock<Option<UserId>>,
}

impl StaticIdentity {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: impl Into<UserId>) -> Self {
        Self {
            current: RwLock::new(Some(user_id.into())),
        }
    }

    pub fn sign_in(&self, user_id: impl Into<UserId>) {
        *self.current.write() = Some(user_id.into());
    }

    pub fn sign_out(&self) {
        *self.current.write() = None;
    }
}

impl IdentityResolver for StaticIdentity {
    fn current_actor(&self) -> Option<UserId> {
        self.current.read().clone()
    }
}
