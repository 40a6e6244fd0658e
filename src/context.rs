//! Request-scoped context.
//!
//! A [`RequestContext`] is built once per inbound request and handed by
//! reference to every tool invocation of that request's agent runs. There is
//! no process-wide cell: two requests handled concurrently each carry their
//! own value down their own call chain.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Timezone used when the caller does not supply one.
pub const DEFAULT_TIMEZONE: &str = "US/Pacific";

/// User id used when the caller does not supply one.
pub const DEFAULT_USER_ID: &str = "guest";

/// Values that identify a single user request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Stable for the lifetime of one user request; keys audit records.
    pub correlation_id: String,
    pub timezone: String,
    pub session_id: String,
    pub user_id: String,
}

impl RequestContext {
    /// Build a context, generating ids for anything the caller left out.
    pub fn new(
        correlation_id: Option<String>,
        timezone: Option<String>,
        session_id: Option<String>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            correlation_id: non_empty(correlation_id).unwrap_or_else(new_id),
            timezone: non_empty(timezone).unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
            session_id: non_empty(session_id).unwrap_or_else(new_id),
            user_id: non_empty(user_id).unwrap_or_else(|| DEFAULT_USER_ID.to_string()),
        }
    }

    /// The correlation id, or a fresh one when this context carries none.
    pub fn correlation_id_or_new(&self) -> String {
        if self.correlation_id.is_empty() {
            new_id()
        } else {
            self.correlation_id.clone()
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(None, None, None, None)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_values() {
        let ctx = RequestContext::new(None, None, Some(String::new()), None);
        assert_eq!(ctx.timezone, "US/Pacific");
        assert_eq!(ctx.user_id, "guest");
        assert!(Uuid::parse_str(&ctx.correlation_id).is_ok());
        assert!(Uuid::parse_str(&ctx.session_id).is_ok());
    }

    #[test]
    fn test_explicit_values_are_kept() {
        let ctx = RequestContext::new(
            Some("req-1".to_string()),
            Some("Europe/Oslo".to_string()),
            Some("sess-1".to_string()),
            Some("alice".to_string()),
        );
        assert_eq!(ctx.correlation_id, "req-1");
        assert_eq!(ctx.timezone, "Europe/Oslo");
        assert_eq!(ctx.session_id, "sess-1");
        assert_eq!(ctx.user_id, "alice");
        assert_eq!(ctx.correlation_id_or_new(), "req-1");
    }

    #[test]
    fn test_empty_correlation_id_falls_back() {
        let mut ctx = RequestContext::default();
        ctx.correlation_id.clear();
        let generated = ctx.correlation_id_or_new();
        assert!(!generated.is_empty());
    }
}
