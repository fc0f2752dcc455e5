use async_trait::async_trait;
use uuid::Uuid;

use crate::config::Config;
use crate::domain::session::Session;
use crate::domain::state::SupervisorState;

/// Provider-specific session discovery: list recent sessions and match
/// a feature tag embedded as the first line of the initial prompt.
/// Concrete providers are out of scope for the core; this trait is the
/// seam a real provider wrapper would implement.
#[async_trait]
pub trait SessionDiscovery: Send + Sync {
    async fn discover(&self, provider: &str, feature_id: &str) -> Option<String>;
}

/// The default discovery strategy when no provider-specific lookup is
/// wired in: nothing is discovered, so dispatch starts fresh.
pub struct NoopSessionDiscovery;

#[async_trait]
impl SessionDiscovery for NoopSessionDiscovery {
    async fn discover(&self, _provider: &str, _feature_id: &str) -> Option<String> {
        None
    }
}

/// The outcome of resolving a session for one dispatch: whether a
/// session id was found, and whether it is newly started (which gates
/// feature-tag injection).
pub struct ResolvedSession {
    pub session_id: Option<String>,
    pub is_new: bool,
}

/// Resolves the session to use for `feature_id`, applying the
/// rotation policy first: explicit override → existing
/// `active_sessions[feature]` (if not due for rotation) → provider
/// discovery → none (start fresh).
pub async fn resolve(
    state: &mut SupervisorState,
    config: &Config,
    provider: &str,
    feature_id: &str,
    explicit_override: Option<&str>,
    discovery: &dyn SessionDiscovery,
) -> ResolvedSession {
    if let Some(session_id) = explicit_override {
        return ResolvedSession { session_id: Some(session_id.to_string()), is_new: false };
    }

    if let Some(session) = state.active_sessions.get(feature_id) {
        let limit = context_limit_for(provider, config);
        if !session.needs_rotation(limit) {
            return ResolvedSession { session_id: Some(session.session_id.clone()), is_new: false };
        }
        state.active_sessions.remove(feature_id);
    }

    if let Some(discovered) = discovery.discover(provider, feature_id).await {
        state.active_sessions.insert(feature_id.to_string(), Session::new(discovered.clone(), provider));
        return ResolvedSession { session_id: Some(discovered), is_new: false };
    }

    ResolvedSession { session_id: None, is_new: true }
}

/// The provider's context-window limit: a direct per-provider entry if
/// configured, else the `"medium"` bucket, else a hard-coded default.
#[must_use]
pub fn context_limit_for(provider: &str, config: &Config) -> u64 {
    config
        .provider_context_limits
        .get(provider)
        .or_else(|| config.provider_context_limits.get("medium"))
        .copied()
        .unwrap_or(250_000)
}

/// Generates a session id for a successful dispatch that echoed none
/// and had none to reuse — a fallback that should be rare in practice
/// since real providers return a session id on success.
#[must_use]
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Wraps a freshly started session's initial prompt with the feature
/// tag so later discovery can match it.
#[must_use]
pub fn inject_feature_tag(prompt: &str, feature_id: &str) -> String {
    format!("[Feature: {feature_id}]\n\n{prompt}")
}

/// Records a successful dispatch against the session map: creates the
/// session on first use, updates it otherwise.
pub fn record_success(state: &mut SupervisorState, feature_id: &str, provider: &str, session_id: String, reused: bool, tokens: u64) {
    let session = state
        .active_sessions
        .entry(feature_id.to_string())
        .or_insert_with(|| Session::new(session_id.clone(), provider));
    session.session_id = session_id;
    session.record_success(reused, tokens);
}

pub fn record_error(state: &mut SupervisorState, feature_id: &str) {
    if let Some(session) = state.active_sessions.get_mut(feature_id) {
        session.record_error();
    }
}
