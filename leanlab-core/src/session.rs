//! Session context passed explicitly to everything that talks to the backend.

use std::fmt;

/// Backend location and bearer credential for one application session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionContext {
    base_url: String,
    token: Option<String>,
}

impl SessionContext {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let token = token.filter(|t| !t.trim().is_empty());
        Self { base_url, token }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Absolute URL for an API path such as `/api/quantconnect/run-backtest/`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

// Keeps the token out of logs.
impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let s = SessionContext::new("http://localhost:8000/", None);
        assert_eq!(
            s.endpoint("/api/quantconnect/run-backtest/"),
            "http://localhost:8000/api/quantconnect/run-backtest/"
        );
    }

    #[test]
    fn blank_token_treated_as_absent() {
        let s = SessionContext::new("http://x", Some("  ".into()));
        assert!(s.token().is_none());
    }

    #[test]
    fn debug_redacts_token() {
        let s = SessionContext::new("http://x", Some("secret".into()));
        let dbg = format!("{s:?}");
        assert!(!dbg.contains("secret"));
        assert!(dbg.contains("redacted"));
    }
}
