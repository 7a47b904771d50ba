//! Access policy for protected key prefixes

use crate::key::ObjectKey;
use tracing::debug;

/// Outcome of an access policy check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    Denied,
}

/// Rejects keys that live under a protected namespace
///
/// A key is protected when it starts with one of the configured prefixes
/// immediately followed by `/`. `private/a.png` is denied for prefix
/// `private`, `privateer.png` is not.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    protected_prefixes: Vec<String>,
}

impl AccessPolicy {
    /// Create a policy from a list of prefixes
    ///
    /// Trailing slashes on the configured prefixes are ignored.
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let protected_prefixes = prefixes
            .into_iter()
            .map(|p| p.as_ref().trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();
        AccessPolicy { protected_prefixes }
    }

    /// Check whether `key` may be served
    pub fn check(&self, key: &ObjectKey) -> AccessDecision {
        let key = key.as_str();
        for prefix in &self.protected_prefixes {
            let protected = key
                .strip_prefix(prefix.as_str())
                .map(|rest| rest.starts_with('/'))
                .unwrap_or(false);
            if protected {
                debug!("Access denied: key={} matches protected prefix={}", key, prefix);
                return AccessDecision::Denied;
            }
        }
        AccessDecision::Allowed
    }

    pub fn protected_prefixes(&self) -> &[String] {
        &self.protected_prefixes
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        AccessPolicy::new(["private"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> ObjectKey {
        ObjectKey::parse(raw).unwrap()
    }

    #[test]
    fn test_private_prefix_denied() {
        let policy = AccessPolicy::default();
        assert_eq!(policy.check(&key("private/secret.txt")), AccessDecision::Denied);
        assert_eq!(policy.check(&key("private/a/b/c.png")), AccessDecision::Denied);
    }

    #[test]
    fn test_public_keys_allowed() {
        let policy = AccessPolicy::default();
        assert_eq!(policy.check(&key("products/sofa.jpg")), AccessDecision::Allowed);
        assert_eq!(policy.check(&key("public/private/a.png")), AccessDecision::Allowed);
    }

    #[test]
    fn test_prefix_requires_separator() {
        let policy = AccessPolicy::default();
        assert_eq!(policy.check(&key("privateer.png")), AccessDecision::Allowed);
        assert_eq!(policy.check(&key("private")), AccessDecision::Allowed);
    }

    #[test]
    fn test_leading_slash_cannot_bypass() {
        let policy = AccessPolicy::default();
        assert_eq!(policy.check(&key("//private/secret.txt")), AccessDecision::Denied);
        assert_eq!(policy.check(&key("%2Fprivate%2Fsecret.txt")), AccessDecision::Denied);
    }

    #[test]
    fn test_dot_segments_cannot_bypass() {
        let policy = AccessPolicy::default();
        assert_eq!(policy.check(&key("./private/secret.txt")), AccessDecision::Denied);
        assert_eq!(policy.check(&key("%2E/private/secret.txt")), AccessDecision::Denied);
    }

    #[test]
    fn test_multiple_prefixes_and_trailing_slash() {
        let policy = AccessPolicy::new(["private/", "invoices"]);
        assert_eq!(policy.protected_prefixes(), &["private".to_string(), "invoices".to_string()]);
        assert_eq!(policy.check(&key("invoices/2024/1.pdf")), AccessDecision::Denied);
        assert_eq!(policy.check(&key("private/x")), AccessDecision::Denied);
        assert_eq!(policy.check(&key("catalog/x")), AccessDecision::Allowed);
    }

    #[test]
    fn test_empty_policy_allows_everything() {
        let policy = AccessPolicy::new(Vec::<String>::new());
        assert_eq!(policy.check(&key("private/secret.txt")), AccessDecision::Allowed);
    }
}
