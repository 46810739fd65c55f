//! Guarded Navigation
//!
//! [`RouteRules::decide`] is a pure, total function from (target path, auth
//! snapshot) to a [`NavigationDecision`]. It holds no state of its own: the
//! session it observes moves `anonymous -> authenticated -> anonymous`, and
//! the decision is recomputed from scratch on every call.
//!
//! [`RouterHost`] is the stateful adapter around it. It consults the guard on
//! every navigation attempt and, because it watches the auth node, re-decides
//! the *current* location the instant authentication changes, so a rendered
//! protected screen is evicted reactively rather than on the next navigation.
//!
//! Protected paths are matched by plain prefix, so nested routes inherit a
//! parent's protection. There is no word-boundary check: `/profile2` matches
//! a `/profile` rule. Known edge case, intentionally left as-is.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::AuthState;
use crate::graph::{GraphError, ProviderContainer, ProviderKey, SubscriptionId};

/// Outcome of consulting the guard. Computed, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavigationDecision {
    Allow,
    RedirectTo(String),
}

/// Static routing table: which prefixes require authentication, and where the
/// login and home screens live. Not runtime-configurable.
#[derive(Debug, Clone)]
pub struct RouteRules {
    pub protected_prefixes: Vec<String>,
    pub login_path: String,
    pub home_path: String,
}

impl Default for RouteRules {
    fn default() -> Self {
        Self {
            protected_prefixes: vec!["/profile".to_string(), "/settings".to_string()],
            login_path: "/login".to_string(),
            home_path: "/".to_string(),
        }
    }
}

impl RouteRules {
    /// Decide whether navigating to `target` is allowed under `auth`.
    ///
    /// The two redirect rules are mutually exclusive by construction: the
    /// first requires an anonymous session, the second an authenticated one.
    pub fn decide(&self, target: &str, auth: &AuthState) -> NavigationDecision {
        let protected = self
            .protected_prefixes
            .iter()
            .any(|prefix| target.starts_with(prefix.as_str()));

        if protected && !auth.is_authenticated {
            return NavigationDecision::RedirectTo(format!(
                "{}?redirect={}",
                self.login_path,
                encode_path(target)
            ));
        }
        if auth.is_authenticated && target == self.login_path {
            return NavigationDecision::RedirectTo(self.home_path.clone());
        }
        NavigationDecision::Allow
    }
}

/// Percent-encode a path for use as a query value, keeping `/` readable.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Stateful navigation host: current location, the rules, and a live watch on
/// the auth node.
pub struct RouterHost {
    container: ProviderContainer,
    rules: Arc<RouteRules>,
    auth_key: ProviderKey<AuthState>,
    location: Arc<RwLock<String>>,
    subscription: SubscriptionId,
}

impl RouterHost {
    /// Mount the host at the rules' home path. `on_redirect` fires whenever a
    /// change to the auth node forces the current location to move, which is
    /// how a revoked session evicts an already-rendered protected screen.
    pub fn mount<F>(
        container: &ProviderContainer,
        rules: RouteRules,
        auth_key: ProviderKey<AuthState>,
        on_redirect: F,
    ) -> Result<Self, GraphError>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let rules = Arc::new(rules);
        let location = Arc::new(RwLock::new(rules.home_path.clone()));

        let watcher_rules = rules.clone();
        let watcher_location = location.clone();
        let (_, subscription) = container.watch(auth_key, move |auth: &AuthState| {
            let current = watcher_location.read().clone();
            if let NavigationDecision::RedirectTo(path) = watcher_rules.decide(&current, auth) {
                debug!(from = %current, to = %path, "auth change evicted current location");
                *watcher_location.write() = path.clone();
                on_redirect(&path);
            }
        })?;

        Ok(Self {
            container: container.clone(),
            rules,
            auth_key,
            location,
            subscription,
        })
    }

    /// Where the host currently points.
    pub fn location(&self) -> String {
        self.location.read().clone()
    }

    /// Attempt a navigation. The returned decision is for `target`; on a
    /// redirect the host moves to the redirect path instead.
    pub fn navigate(&self, target: &str) -> Result<NavigationDecision, GraphError> {
        let auth = self.container.read(self.auth_key)?;
        let decision = self.rules.decide(target, &auth);
        match &decision {
            NavigationDecision::Allow => {
                debug!(%target, "navigation allowed");
                *self.location.write() = target.to_string();
            }
            NavigationDecision::RedirectTo(path) => {
                debug!(%target, redirect = %path, "navigation redirected");
                *self.location.write() = path.clone();
            }
        }
        Ok(decision)
    }
}

impl Drop for RouterHost {
    fn drop(&mut self) {
        let _ = self.container.unwatch(self.auth_key, self.subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anonymous() -> AuthState {
        AuthState::default()
    }

    fn signed_in() -> AuthState {
        AuthState::authenticated("123", "test")
    }

    #[test]
    fn protected_path_redirects_anonymous_visitors() {
        let rules = RouteRules::default();
        assert_eq!(
            rules.decide("/profile", &anonymous()),
            NavigationDecision::RedirectTo("/login?redirect=/profile".to_string())
        );
    }

    #[test]
    fn nested_route_inherits_parent_protection() {
        let rules = RouteRules::default();
        assert_eq!(
            rules.decide("/settings/profile", &anonymous()),
            NavigationDecision::RedirectTo("/login?redirect=/settings/profile".to_string())
        );
    }

    #[test]
    fn login_page_redirects_authenticated_visitors_home() {
        let rules = RouteRules::default();
        assert_eq!(
            rules.decide("/login", &signed_in()),
            NavigationDecision::RedirectTo("/".to_string())
        );
    }

    #[test]
    fn public_path_is_allowed_for_everyone() {
        let rules = RouteRules::default();
        assert_eq!(rules.decide("/counter", &anonymous()), NavigationDecision::Allow);
        assert_eq!(rules.decide("/counter", &signed_in()), NavigationDecision::Allow);
    }

    #[test]
    fn protected_path_is_allowed_once_authenticated() {
        let rules = RouteRules::default();
        assert_eq!(rules.decide("/profile", &signed_in()), NavigationDecision::Allow);
    }

    #[test]
    fn anonymous_visitor_may_open_the_login_page() {
        let rules = RouteRules::default();
        assert_eq!(rules.decide("/login", &anonymous()), NavigationDecision::Allow);
    }

    // Documents the plain-prefix edge case: /profile2 is treated as protected
    // because it shares the /profile prefix.
    #[test]
    fn prefix_match_has_no_word_boundary() {
        let rules = RouteRules::default();
        assert_eq!(
            rules.decide("/profile2", &anonymous()),
            NavigationDecision::RedirectTo("/login?redirect=/profile2".to_string())
        );
    }

    #[test]
    fn redirect_target_is_query_encoded_per_segment() {
        let rules = RouteRules::default();
        assert_eq!(
            rules.decide("/settings/a b", &anonymous()),
            NavigationDecision::RedirectTo("/login?redirect=/settings/a%20b".to_string())
        );
    }

    #[test]
    fn decision_serializes_for_host_transports() {
        let decision = NavigationDecision::RedirectTo("/login".to_string());
        let json = serde_json::to_string(&decision).unwrap();
        let back: NavigationDecision = serde_json::from_str(&json).unwrap();
        assert_eq!(back, decision);
    }
}
