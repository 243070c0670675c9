//! Deterministic entity identifiers
//!
//! Every row id is `sha256("{source}:{key}")` truncated to 16 hex chars. Child
//! keys embed the parent id plus a local discriminator, so the whole entity
//! tree can be re-derived from raw input alone.

use sha2::{Digest, Sha256};

const ID_LEN: usize = 16;

pub fn gen_id(source: &str, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b":");
    hasher.update(key.as_bytes());
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(ID_LEN);
    hex
}

/// Id of a child entity: parent id joined with a discriminator
pub fn child_id(source: &str, parent: &str, discriminator: impl std::fmt::Display) -> String {
    gen_id(source, &format!("{}:{}", parent, discriminator))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_shape() {
        let id = gen_id("test", "123");
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_id_is_deterministic() {
        let path = "/Users/test/.claude/projects/-test/session-abc.jsonl";
        assert_eq!(gen_id("claude-code", path), gen_id("claude-code", path));
    }

    #[test]
    fn test_id_namespaced_by_source() {
        assert_ne!(gen_id("claude", "x"), gen_id("chatgpt", "x"));
    }

    #[test]
    fn test_matches_plain_digest_prefix() {
        let full = hex::encode(Sha256::digest(b"a:b"));
        assert_eq!(gen_id("a", "b"), &full[..16]);
    }

    #[test]
    fn test_child_id_composes_parent() {
        let parent = gen_id("codex", "session-1");
        assert_eq!(
            child_id("codex", &parent, 3),
            gen_id("codex", &format!("{}:3", parent))
        );
        assert_ne!(child_id("codex", &parent, 3), child_id("codex", &parent, 4));
    }
}
