use serde::{Deserialize, Serialize};

/// A provider-held conversational continuation, keyed externally by
/// feature id. Sessions are referenced by key, not by pointer: callers
/// look the session up in the `active_sessions` map each time rather
/// than holding a reference across iterations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub provider: String,
    pub last_use: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub consecutive_errors: u32,
    #[serde(default)]
    pub cumulative_tokens: u64,
}

/// Maximum consecutive provider errors before a session is dropped and a
/// fresh one started.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 5;

impl Session {
    #[must_use]
    pub fn new(session_id: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            provider: provider.into(),
            last_use: chrono::Utc::now(),
            consecutive_errors: 0,
            cumulative_tokens: 0,
        }
    }

    /// Whether this session must be rotated before the next dispatch,
    /// given the provider's context-window limit in tokens.
    #[must_use]
    pub fn needs_rotation(&self, context_limit: u64) -> bool {
        self.cumulative_tokens > context_limit || self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS
    }

    /// Records a successful dispatch: resets the error counter, bumps
    /// the token estimate if the same session id was reused, and stamps
    /// `last_use`.
    pub fn record_success(&mut self, reused: bool, tokens: u64) {
        self.consecutive_errors = 0;
        if reused {
            self.cumulative_tokens += tokens;
        }
        self.last_use = chrono::Utc::now();
    }

    pub fn record_error(&mut self) {
        self.consecutive_errors += 1;
        self.last_use = chrono::Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotates_on_token_overflow() {
        let mut session = Session::new("sid-1", "claude");
        session.cumulative_tokens = 400_000;
        assert!(session.needs_rotation(350_000));
    }

    #[test]
    fn rotates_on_error_cap() {
        let mut session = Session::new("sid-1", "claude");
        for _ in 0..5 {
            session.record_error();
        }
        assert!(session.needs_rotation(u64::MAX));
    }

    #[test]
    fn success_resets_error_counter() {
        let mut session = Session::new("sid-1", "claude");
        session.record_error();
        session.record_error();
        session.record_success(true, 100);
        assert_eq!(session.consecutive_errors, 0);
        assert_eq!(session.cumulative_tokens, 100);
    }

    #[test]
    fn success_without_reuse_does_not_accumulate_tokens() {
        let mut session = Session::new("sid-1", "claude");
        session.record_success(false, 500);
        assert_eq!(session.cumulative_tokens, 0);
    }
}
