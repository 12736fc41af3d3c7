//! User identity contract consumed by the sync engine.

use std::sync::RwLock;

/// Sentinel id returned while no user is signed in. Guest users have no
/// stable identity and are excluded from every sync entry point.
pub const GUEST_USER_ID: &str = "guest";

/// True when `user_id` is the guest sentinel (or empty, which some auth
/// layers hand back transiently during sign-out).
pub fn is_guest_id(user_id: &str) -> bool {
    user_id.is_empty() || user_id == GUEST_USER_ID
}

/// Authentication seam: returns the current stable user id or the guest
/// sentinel. Implemented by the application shell.
pub trait IdentityProvider: Send + Sync {
    fn current_user_id(&self) -> String;
}

/// Fixed identity, useful for embedding and tests.
pub struct StaticIdentity(pub String);

impl IdentityProvider for StaticIdentity {
    fn current_user_id(&self) -> String {
        self.0.clone()
    }
}

/// Switchable identity for shells that sign users in and out at runtime.
#[derive(Default)]
pub struct SharedIdentity {
    current: RwLock<String>,
}

impl SharedIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(user_id.into()),
        }
    }

    pub fn signed_out() -> Self {
        Self::new(GUEST_USER_ID)
    }

    pub fn set_user(&self, user_id: impl Into<String>) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = user_id.into();
    }

    pub fn sign_out(&self) {
        self.set_user(GUEST_USER_ID);
    }
}

impl IdentityProvider for SharedIdentity {
    fn current_user_id(&self) -> String {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
