use serde::{Deserialize, Serialize};
use std::fmt;

use super::{StateStore, StoreError};
use crate::workflow::types::WorkflowState;

/// Identifier of an isolated workflow partition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceId(String);

impl NamespaceId {
    /// `None` for blank input; callers fall back to the default namespace.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory-safe form of the id.
    ///
    /// `[A-Za-z0-9_-]` pass through and every other byte becomes `%XX`, so
    /// the mapping is reversible, distinct ids never share a directory, and
    /// no id can name `.`, `..` or contain a separator.
    pub fn encoded(&self) -> String {
        let mut out = String::with_capacity(self.0.len());
        for byte in self.0.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                out.push(byte as char);
            } else {
                out.push_str(&format!("%{byte:02X}"));
            }
        }
        out
    }

    pub fn decode(encoded: &str) -> Option<Self> {
        let bytes = encoded.as_bytes();
        let mut decoded = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'%' => {
                    let hex = encoded.get(i + 1..i + 3)?;
                    decoded.push(u8::from_str_radix(hex, 16).ok()?);
                    i += 3;
                }
                b if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' => {
                    decoded.push(b);
                    i += 1;
                }
                _ => return None,
            }
        }
        String::from_utf8(decoded).ok().and_then(|s| Self::new(&s))
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Picks the namespace for a call: explicit override, then the environment,
/// then the configured default. Never fails.
#[derive(Debug, Clone)]
pub struct NamespaceResolver {
    default: NamespaceId,
    env_var: String,
}

pub const DEFAULT_NAMESPACE: &str = "default";

impl Default for NamespaceResolver {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE, "PIPELINE_GATE_NAMESPACE")
    }
}

impl NamespaceResolver {
    pub fn new(default: &str, env_var: &str) -> Self {
        let default = NamespaceId::new(default).unwrap_or_else(|| NamespaceId(DEFAULT_NAMESPACE.into()));
        Self {
            default,
            env_var: env_var.to_string(),
        }
    }

    pub fn default_namespace(&self) -> &NamespaceId {
        &self.default
    }

    pub fn resolve(&self, explicit: Option<&str>) -> NamespaceId {
        let from_env = std::env::var(&self.env_var).ok();
        self.resolve_with(explicit, from_env.as_deref())
    }

    /// Deterministic core of [`resolve`](Self::resolve).
    pub fn resolve_with(&self, explicit: Option<&str>, from_env: Option<&str>) -> NamespaceId {
        explicit
            .and_then(NamespaceId::new)
            .or_else(|| from_env.and_then(NamespaceId::new))
            .unwrap_or_else(|| self.default.clone())
    }

    /// Idempotently create the namespace's record in `INITIAL`.
    pub fn ensure_exists(
        &self,
        store: &dyn StateStore,
        namespace: &NamespaceId,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool, StoreError> {
        let created = store.ensure_exists(namespace, &WorkflowState::new(namespace.as_str(), now))?;
        if created {
            tracing::info!(namespace = %namespace, "Created namespace record");
        }
        Ok(created)
    }

    pub fn list_all(&self, store: &dyn StateStore) -> Result<Vec<NamespaceId>, StoreError> {
        store.list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_override_wins_over_environment() {
        let resolver = NamespaceResolver::default();
        let ns = resolver.resolve_with(Some("feature-x"), Some("from-env"));
        assert_eq!(ns.as_str(), "feature-x");
    }

    #[test]
    fn environment_used_when_no_override() {
        let resolver = NamespaceResolver::default();
        assert_eq!(resolver.resolve_with(None, Some("from-env")).as_str(), "from-env");
        assert_eq!(resolver.resolve_with(Some("  "), Some("from-env")).as_str(), "from-env");
    }

    #[test]
    fn absence_of_input_yields_default() {
        let resolver = NamespaceResolver::new("main", "UNUSED");
        assert_eq!(resolver.resolve_with(None, None).as_str(), "main");
        assert_eq!(resolver.resolve_with(Some(""), Some("")).as_str(), "main");
    }

    #[test]
    fn encoding_is_reversible_and_path_safe() {
        for raw in ["simple", "with space", "../escape", "a/b", "a%2Fb", "ünï", ".", "a_b-c"] {
            let ns = NamespaceId::new(raw).unwrap();
            let encoded = ns.encoded();
            assert!(!encoded.contains('/'));
            assert!(!encoded.contains('.'));
            assert_eq!(NamespaceId::decode(&encoded), Some(ns));
        }
    }

    #[test]
    fn distinct_ids_never_share_an_encoding() {
        let a = NamespaceId::new("a/b").unwrap().encoded();
        let b = NamespaceId::new("a_b").unwrap().encoded();
        let c = NamespaceId::new("a%2Fb").unwrap().encoded();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn decode_rejects_foreign_directory_names() {
        assert!(NamespaceId::decode(".hidden").is_none());
        assert!(NamespaceId::decode("bad%zz").is_none());
        assert!(NamespaceId::decode("").is_none());
    }
}
