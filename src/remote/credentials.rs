//! Browser-session credentials
//!
//! Cookie maps are read per browser profile from a YAML file:
//!
//! ```yaml
//! safari:
//!   chatgpt.com:
//!     __Secure-next-auth.session-token: "..."
//!   .claude.ai:
//!     sessionKey: "..."
//! chrome:
//!   claude.ai:
//!     sessionKey: "..."
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::Cookies;
use crate::error::{Result, SyncError};

/// Source of per-domain cookie maps, keyed by browser profile
pub trait CredentialProvider: Send + Sync {
    /// Cookies applicable to `domain`. Empty when the profile has none.
    fn cookies_for(&self, domain: &str, profile: &str) -> Result<Cookies>;

    /// Every cookie domain the profile knows about
    fn domains(&self, profile: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
struct Profiles(BTreeMap<String, BTreeMap<String, Cookies>>);

/// YAML-backed credential provider. Re-reads the file on every lookup so a
/// long-running watch loop sees refreshed sessions.
#[derive(Debug, Clone)]
pub struct CookieFile {
    path: PathBuf,
}

impl CookieFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Profiles> {
        if !self.path.exists() {
            return Ok(Profiles::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Profiles::default());
        }
        serde_yaml::from_str(&content).map_err(|e| SyncError::parse(self.path.display().to_string(), e))
    }
}

/// `cookie_domain` covers `domain` when equal or a parent domain
fn covers(cookie_domain: &str, domain: &str) -> bool {
    let cookie_domain = cookie_domain.trim_start_matches('.').to_ascii_lowercase();
    let domain = domain.trim_start_matches('.').to_ascii_lowercase();
    domain == cookie_domain || domain.ends_with(&format!(".{}", cookie_domain))
}

impl CredentialProvider for CookieFile {
    fn cookies_for(&self, domain: &str, profile: &str) -> Result<Cookies> {
        let profiles = self.load()?;
        let mut cookies = Cookies::new();
        if let Some(domains) = profiles.0.get(profile) {
            for (cookie_domain, values) in domains {
                if covers(cookie_domain, domain) {
                    cookies.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
        }
        Ok(cookies)
    }

    fn domains(&self, profile: &str) -> Result<Vec<String>> {
        Ok(self
            .load()?
            .0
            .get(profile)
            .map(|d| d.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const YAML: &str = r#"
safari:
  .openai.com:
    cf_clearance: abc
  chatgpt.com:
    session: s1
chrome:
  claude.ai:
    sessionKey: k1
"#;

    #[test]
    fn test_cookies_for_matches_parent_domains() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cookies.yaml");
        std::fs::write(&path, YAML).unwrap();
        let file = CookieFile::new(&path);

        let cookies = file.cookies_for("chat.openai.com", "safari").unwrap();
        assert_eq!(cookies.get("cf_clearance").map(String::as_str), Some("abc"));
        assert!(!cookies.contains_key("session"));

        assert_eq!(file.cookies_for("chatgpt.com", "safari").unwrap().len(), 1);
        assert!(file.cookies_for("claude.ai", "safari").unwrap().is_empty());
        assert_eq!(file.cookies_for("claude.ai", "chrome").unwrap()["sessionKey"], "k1");
        assert!(file.cookies_for("claude.ai", "firefox").unwrap().is_empty());
    }

    #[test]
    fn test_domains_and_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cookies.yaml");
        std::fs::write(&path, YAML).unwrap();
        assert_eq!(CookieFile::new(&path).domains("chrome").unwrap(), vec!["claude.ai".to_string()]);

        let missing = CookieFile::new(dir.path().join("absent.yaml"));
        assert!(missing.cookies_for("claude.ai", "safari").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cookies.yaml");
        std::fs::write(&path, "safari: [not, a, map]").unwrap();
        assert!(matches!(
            CookieFile::new(&path).cookies_for("claude.ai", "safari"),
            Err(SyncError::Parse { .. })
        ));
    }

    #[test]
    fn test_covers() {
        assert!(covers(".claude.ai", "claude.ai"));
        assert!(covers("openai.com", "chat.openai.com"));
        assert!(!covers("ai.com", "openai.com"));
    }
}
