//! Virtual style modules.
//!
//! Compiled CSS never touches disk. Each stylesheet is stored under its
//! normalized path and served through an id the host resolves and loads like
//! any other module; the path is recovered from the id text alone.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::{PluginError, PluginResult};

pub const VIRTUAL_MODULE_PREFIX: &str = "virtual:auto-css-modules";

/// Hosts mark ids they should not touch with a leading NUL.
pub const RESOLVED_MARKER: char = '\0';

const TOKEN_LEN: usize = 8;

/// Compiled CSS keyed by normalized style path, served through virtual ids of
/// the form `virtual:auto-css-modules/<token>/<normalized path>`.
#[derive(Debug, Default)]
pub struct VirtualModuleRegistry {
    entries: RwLock<HashMap<String, String>>,
}

impl VirtualModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write wins.
    pub fn register(&self, normalized_path: &str, css: impl Into<String>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalized_path.to_string(), css.into());
    }

    /// The id for `normalized_path` with its currently registered content.
    pub fn generate_id(&self, normalized_path: &str) -> String {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        virtual_id(normalized_path, entries.get(normalized_path).map(String::as_str))
    }

    pub fn resolve_content(&self, id: &str) -> PluginResult<String> {
        let path =
            decode_id(id).ok_or_else(|| PluginError::VirtualModuleNotFound(id.to_string()))?;
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| PluginError::VirtualModuleNotFound(path.to_string()))
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// The token hashes the path together with `css`, so the id is reproducible
/// and changes whenever the stylesheet does.
pub fn virtual_id(normalized_path: &str, css: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_path.as_bytes());
    if let Some(css) = css {
        hasher.update([0u8]);
        hasher.update(css.as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    format!(
        "{}/{}/{}",
        VIRTUAL_MODULE_PREFIX,
        &digest[..TOKEN_LEN],
        normalized_path
    )
}

pub fn is_virtual_id(id: &str) -> bool {
    id.strip_prefix(RESOLVED_MARKER)
        .unwrap_or(id)
        .starts_with(VIRTUAL_MODULE_PREFIX)
}

/// Path-resolution hook: claim our ids and mark them as resolved.
pub fn resolve_id(id: &str) -> Option<String> {
    if id.starts_with(VIRTUAL_MODULE_PREFIX) {
        Some(format!("{}{}", RESOLVED_MARKER, id))
    } else {
        None
    }
}

/// Recover the normalized style path from a bare or resolved virtual id.
pub fn decode_id(id: &str) -> Option<&str> {
    let id = id.strip_prefix(RESOLVED_MARKER).unwrap_or(id);
    let rest = id.strip_prefix(VIRTUAL_MODULE_PREFIX)?.strip_prefix('/')?;
    let (token, path) = rest.split_once('/')?;
    if token.is_empty() || path.is_empty() {
        return None;
    }
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_round_trip() {
        let registry = VirtualModuleRegistry::new();
        registry.register("/src/Card.css", ".a{}");
        registry.register("/src/Card.css", ".b{}");
        registry.register("/src/Other.css", ".c{}");

        let id = registry.generate_id("/src/Card.css");
        assert_eq!(registry.resolve_content(&id).unwrap(), ".b{}");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_id_format() {
        let registry = VirtualModuleRegistry::new();
        registry.register("/src/Card.css", ".a{}");
        let id = registry.generate_id("/src/Card.css");

        assert!(id.starts_with("virtual:auto-css-modules/"));
        assert!(id.ends_with("//src/Card.css"));
        let token = id
            .trim_start_matches("virtual:auto-css-modules/")
            .split('/')
            .next()
            .unwrap();
        assert_eq!(token.len(), 8);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_ids_are_reproducible_and_track_content() {
        let registry = VirtualModuleRegistry::new();
        registry.register("src/Card.css", ".a{}");
        let first = registry.generate_id("src/Card.css");
        assert_eq!(first, registry.generate_id("src/Card.css"));

        registry.register("src/Card.css", ".a{color:red}");
        let second = registry.generate_id("src/Card.css");
        assert_ne!(first, second);

        // Both ids decode to the same entry.
        assert_eq!(registry.resolve_content(&first).unwrap(), ".a{color:red}");
        assert_eq!(registry.resolve_content(&second).unwrap(), ".a{color:red}");
    }

    #[test]
    fn test_id_is_known_before_registration() {
        let id = virtual_id("src/Card.css", Some(".a{}"));
        let registry = VirtualModuleRegistry::new();
        assert!(registry.resolve_content(&id).is_err());

        registry.register("src/Card.css", ".a{}");
        assert_eq!(registry.generate_id("src/Card.css"), id);
    }

    #[test]
    fn test_decode_is_pure() {
        assert_eq!(
            decode_id("virtual:auto-css-modules/abcd1234//a/b.css"),
            Some("/a/b.css")
        );
        assert_eq!(
            decode_id("\0virtual:auto-css-modules/abcd1234/C:/a/b.css"),
            Some("C:/a/b.css")
        );
        assert_eq!(decode_id("virtual:auto-css-modules/abcd1234"), None);
        assert_eq!(decode_id("virtual:auto-css-modules//a.css"), None);
        assert_eq!(decode_id("/src/Card.css"), None);
    }

    #[test]
    fn test_unregistered_path_is_not_found() {
        let registry = VirtualModuleRegistry::new();
        let id = registry.generate_id("/src/Missing.css");
        let err = registry.resolve_content(&id).unwrap_err();
        assert!(matches!(err, PluginError::VirtualModuleNotFound(ref p) if p == "/src/Missing.css"));

        let err = registry.resolve_content("/src/Card.css").unwrap_err();
        assert!(matches!(err, PluginError::VirtualModuleNotFound(_)));
    }

    #[test]
    fn test_resolve_id_claims_prefix() {
        assert_eq!(
            resolve_id("virtual:auto-css-modules/abcd1234//a.css"),
            Some("\0virtual:auto-css-modules/abcd1234//a.css".to_string())
        );
        assert_eq!(resolve_id("./Card.css"), None);
        assert!(is_virtual_id("\0virtual:auto-css-modules/abcd1234//a.css"));
        assert!(!is_virtual_id("/src/a.css"));
    }
}
