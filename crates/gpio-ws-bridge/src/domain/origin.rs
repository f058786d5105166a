//! Origin policies: decide whether a connection request may proceed.
//!
//! Browsers send an `Origin` header with every WebSocket upgrade request.  The
//! policy is consulted before the handshake completes; a rejected request never
//! becomes a connection.
//!
//! Policies are pure predicates with no side effects, so they are shared as
//! `Arc<dyn OriginPolicy>` across every session task.

/// Decides whether a request with the given declared origin is acceptable.
///
/// `origin` is `None` when the client did not send an `Origin` header (common
/// for non-browser clients).
pub trait OriginPolicy: Send + Sync {
    /// Returns `true` if the request may be upgraded to a connection.
    fn is_allowed(&self, origin: Option<&str>) -> bool;
}

/// Accepts every origin, including requests without one.
///
/// This is the default policy.  It defeats the cross-origin protection built
/// into browsers and must not be used for deployments reachable from
/// untrusted pages.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllOrigins;

impl OriginPolicy for AllowAllOrigins {
    fn is_allowed(&self, _origin: Option<&str>) -> bool {
        true
    }
}

/// Accepts only origins that exactly match one of the configured entries
/// (ASCII case-insensitive).  Requests without an `Origin` header are rejected.
#[derive(Debug, Clone)]
pub struct AllowListOrigins {
    allowed: Vec<String>,
}

impl AllowListOrigins {
    /// Creates a policy from a list of origins such as `http://localhost:3000`.
    ///
    /// Trailing slashes are ignored so `http://host/` and `http://host` match.
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed = origins
            .into_iter()
            .map(|o| normalize(&o.into()))
            .filter(|o| !o.is_empty())
            .collect();
        Self { allowed }
    }

    /// The normalised allow-list.
    pub fn origins(&self) -> &[String] {
        &self.allowed
    }
}

impl OriginPolicy for AllowListOrigins {
    fn is_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            Some(origin) => {
                let origin = normalize(origin);
                self.allowed.iter().any(|a| *a == origin)
            }
            None => false,
        }
    }
}

fn normalize(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all_accepts_any_origin() {
        let policy = AllowAllOrigins;
        assert!(policy.is_allowed(Some("http://evil.example")));
        assert!(policy.is_allowed(Some("")));
    }

    #[test]
    fn test_allow_all_accepts_missing_origin() {
        assert!(AllowAllOrigins.is_allowed(None));
    }

    #[test]
    fn test_allow_list_accepts_listed_origin() {
        let policy = AllowListOrigins::new(["http://localhost:3000"]);
        assert!(policy.is_allowed(Some("http://localhost:3000")));
    }

    #[test]
    fn test_allow_list_rejects_unlisted_origin() {
        let policy = AllowListOrigins::new(["http://localhost:3000"]);
        assert!(!policy.is_allowed(Some("http://localhost:4000")));
    }

    #[test]
    fn test_allow_list_rejects_missing_origin() {
        let policy = AllowListOrigins::new(["http://localhost:3000"]);
        assert!(!policy.is_allowed(None));
    }

    #[test]
    fn test_allow_list_ignores_case_and_trailing_slash() {
        // Arrange
        let policy = AllowListOrigins::new(["HTTP://Dashboard.local/"]);

        // Act / Assert
        assert!(policy.is_allowed(Some("http://dashboard.local")));
        assert_eq!(policy.origins(), ["http://dashboard.local".to_string()]);
    }

    #[test]
    fn test_allow_list_drops_blank_entries() {
        let policy = AllowListOrigins::new(["", "  "]);
        assert!(policy.origins().is_empty());
        assert!(!policy.is_allowed(Some("")));
    }
}
