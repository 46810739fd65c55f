//! Authentication state
//!
//! Session state lives in a single notifier node owned by [`AuthController`].
//! Every transition replaces the whole [`AuthState`] snapshot through `set`;
//! nothing mutates a snapshot in place, so watchers always observe a coherent
//! state.
//!
//! The credential check itself is a collaborator: the controller only drives
//! the `anonymous -> loading -> authenticated | anonymous` machine around it.
//! An invalid credential pair is an outcome, not an error.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::{
    AsyncValue, FamilyKey, GraphError, OperationFailure, ProviderContainer, ProviderKey,
};

/// Immutable session snapshot. Replaced wholesale on every transition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthState {
    pub is_authenticated: bool,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub is_loading: bool,
}

impl AuthState {
    /// Snapshot for a credential check in flight.
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            ..Self::default()
        }
    }

    /// Snapshot for an established session.
    pub fn authenticated(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            is_authenticated: true,
            user_id: Some(user_id.into()),
            user_name: Some(user_name.into()),
            is_loading: false,
        }
    }
}

/// Identity returned by a successful credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: String,
    pub name: String,
}

/// Collaborator-supplied credential check. `None` means invalid credentials.
pub type CredentialCheck =
    Arc<dyn Fn(&str, &str) -> BoxFuture<'static, Option<AuthenticatedUser>> + Send + Sync>;

/// Outcome of a login attempt. Not an error; callers render a retry message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    LoggedIn,
    InvalidCredentials,
}

/// Named-operation mutation interface over the auth notifier node.
pub struct AuthController {
    container: ProviderContainer,
    key: ProviderKey<AuthState>,
    check: CredentialCheck,
}

impl AuthController {
    /// Register the auth notifier node in `container` and wrap it.
    pub fn register(container: &ProviderContainer, check: CredentialCheck) -> Self {
        let key = container.notifier(AuthState::default());
        Self {
            container: container.clone(),
            key,
            check,
        }
    }

    /// Key of the auth node, for watchers such as the router host.
    pub fn state_key(&self) -> ProviderKey<AuthState> {
        self.key
    }

    /// Current session snapshot.
    pub fn current(&self) -> Result<AuthState, GraphError> {
        self.container.read(self.key)
    }

    /// Run the credential check. The auth node passes through `is_loading`
    /// and settles on either an authenticated snapshot or back to the
    /// anonymous default.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, GraphError> {
        self.container.set(self.key, AuthState::loading())?;
        let checked = (self.check)(email, password).await;
        match checked {
            Some(user) => {
                debug!(user_id = %user.id, "login succeeded");
                self.container
                    .set(self.key, AuthState::authenticated(user.id, user.name))?;
                Ok(LoginOutcome::LoggedIn)
            }
            None => {
                debug!("login rejected: invalid credentials");
                self.container.set(self.key, AuthState::default())?;
                Ok(LoginOutcome::InvalidCredentials)
            }
        }
    }

    /// Reset the session to the anonymous default, immediately.
    pub fn logout(&self) -> Result<(), GraphError> {
        debug!("logout");
        self.container.set(self.key, AuthState::default())
    }
}

/// Demonstration credential check: accepts exactly
/// `("test@test.com", "password")`. A real application supplies its own.
pub fn demo_credential_check() -> CredentialCheck {
    let check: CredentialCheck = Arc::new(|email: &str, password: &str| {
        let accepted = email == "test@test.com" && password == "password";
        async move {
            accepted.then(|| AuthenticatedUser {
                id: "123".to_string(),
                name: "test".to_string(),
            })
        }
        .boxed()
    });
    check
}

/// Collaborator-supplied user lookup, e.g. a profile fetch by ID.
pub type UserLookup =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<String, OperationFailure>> + Send + Sync>;

/// Register the family-keyed async user-name node: one independent lookup per
/// distinct user ID.
pub fn user_lookup_family(
    container: &ProviderContainer,
    fetch: UserLookup,
) -> FamilyKey<String, AsyncValue<String>> {
    container.family_async_computation(move |user_id: String| fetch(user_id))
}
