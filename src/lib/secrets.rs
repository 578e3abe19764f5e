//! §4.5 Secrets store: a read-only hostname -> token mapping loaded once
//! from a JSON object. Never logged.

use crate::util::errors::{ErrorKind, Res};
use failure::ResultExt;
use serde_json;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct Secrets {
    tokens: HashMap<String, String>,
}

impl Secrets {
    /// An empty secrets store, used when no secrets file is configured.
    pub fn empty() -> Self {
        Secrets {
            tokens: HashMap::new(),
        }
    }

    /// Loads the secrets file at `path`. A missing file is not an error —
    /// it just means no host has a token (mirrors the cache's "absence is
    /// not an error" semantics in spec.md §4.1).
    pub fn load(path: &Path) -> Res<Self> {
        if !path.exists() {
            return Ok(Self::empty());
        }

        let raw = fs::read_to_string(path)
            .context(ErrorKind::Io(format!("reading secrets file at {}", path.display())))?;
        let tokens: HashMap<String, String> = serde_json::from_str(&raw)
            .map_err(|e| ErrorKind::InvalidManifest(format!("secrets file: {}", e)))?;

        Ok(Secrets { tokens })
    }

    /// Looks up the token for `hostname`, if any.
    pub fn find(&self, hostname: &str) -> Option<&str> {
        self.tokens.get(hostname).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_empty() {
        let secrets = Secrets::load(Path::new("/nonexistent/path/secrets.json")).unwrap();
        assert_eq!(secrets.find("example.com"), None);
    }

    #[test]
    fn loads_tokens_by_host() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        let mut f = fs::File::create(&path).unwrap();
        write!(f, r#"{{"example.com": "TOKEN"}}"#).unwrap();

        let secrets = Secrets::load(&path).unwrap();
        assert_eq!(secrets.find("example.com"), Some("TOKEN"));
        assert_eq!(secrets.find("other.com"), None);
    }
}
