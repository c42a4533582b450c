//! Named browser extension resolution.
//!
//! Extensions are referenced by id. An id resolves to an explicit path from
//! configuration when one is mapped, otherwise to `<extensions_root>/<id>`.
//! The default relay-companion extension is provisioned from a bundled
//! template on first use. Missing or manifest-less extensions are a fatal
//! configuration error, raised before any browser is launched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use webhands_protocols::TransportError;

/// Id of the bundled relay-companion extension.
pub const DEFAULT_EXTENSION_ID: &str = "tab-relay";

const TEMPLATE_MANIFEST: &str = include_str!("templates/extension/manifest.json");
const TEMPLATE_BACKGROUND: &str = include_str!("templates/extension/background.js");

/// Resolve every requested extension id to a validated directory.
pub fn resolve_extensions(
    ids: &[String],
    explicit_paths: &HashMap<String, PathBuf>,
    extensions_root: &Path,
) -> Result<Vec<PathBuf>, TransportError> {
    ids.iter()
        .map(|id| resolve_one(id, explicit_paths, extensions_root))
        .collect()
}

fn resolve_one(
    id: &str,
    explicit_paths: &HashMap<String, PathBuf>,
    extensions_root: &Path,
) -> Result<PathBuf, TransportError> {
    let dir = match explicit_paths.get(id) {
        Some(path) => path.clone(),
        None => extensions_root.join(id),
    };

    if !dir.exists() && id == DEFAULT_EXTENSION_ID && !explicit_paths.contains_key(id) {
        provision_default(&dir)?;
    }

    if !dir.is_dir() {
        return Err(TransportError::Config(format!(
            "extension '{}' not found at {}",
            id,
            dir.display()
        )));
    }

    let manifest = dir.join("manifest.json");
    if !manifest.is_file() {
        return Err(TransportError::Config(format!(
            "extension '{}' at {} has no manifest.json",
            id,
            dir.display()
        )));
    }

    debug!(id = %id, dir = %dir.display(), "extension resolved");
    Ok(dir)
}

/// Write the bundled template into place.
fn provision_default(dir: &Path) -> Result<(), TransportError> {
    info!(dir = %dir.display(), "provisioning bundled relay extension");
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join("manifest.json"), TEMPLATE_MANIFEST)?;
    std::fs::write(dir.join("background.js"), TEMPLATE_BACKGROUND)?;
    Ok(())
}

/// Default extensions root: `~/.webhands/extensions`.
pub fn default_extensions_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".webhands")
        .join("extensions")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_extension_is_provisioned() {
        let root = TempDir::new().unwrap();
        let dirs = resolve_extensions(
            &[DEFAULT_EXTENSION_ID.to_string()],
            &HashMap::new(),
            root.path(),
        )
        .unwrap();
        assert_eq!(dirs.len(), 1);
        assert!(dirs[0].join("manifest.json").is_file());
        assert!(dirs[0].join("background.js").is_file());

        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dirs[0].join("manifest.json")).unwrap())
                .unwrap();
        assert_eq!(manifest["manifest_version"], 3);
    }

    #[test]
    fn test_unknown_extension_fails() {
        let root = TempDir::new().unwrap();
        let err = resolve_extensions(&["missing".to_string()], &HashMap::new(), root.path())
            .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_extension_without_manifest_fails() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("broken")).unwrap();
        let err = resolve_extensions(&["broken".to_string()], &HashMap::new(), root.path())
            .unwrap_err();
        assert!(err.to_string().contains("manifest.json"));
    }

    #[test]
    fn test_explicit_path_mapping() {
        let root = TempDir::new().unwrap();
        let custom = TempDir::new().unwrap();
        std::fs::write(custom.path().join("manifest.json"), "{}").unwrap();

        let mut explicit = HashMap::new();
        explicit.insert("mine".to_string(), custom.path().to_path_buf());

        let dirs =
            resolve_extensions(&["mine".to_string()], &explicit, root.path()).unwrap();
        assert_eq!(dirs[0], custom.path());
    }

    #[test]
    fn test_explicit_path_is_not_provisioned() {
        // An explicitly mapped default id must exist; we never scaffold over
        // a user-provided path.
        let root = TempDir::new().unwrap();
        let mut explicit = HashMap::new();
        explicit.insert(
            DEFAULT_EXTENSION_ID.to_string(),
            root.path().join("user-supplied"),
        );
        assert!(resolve_extensions(
            &[DEFAULT_EXTENSION_ID.to_string()],
            &explicit,
            root.path()
        )
        .is_err());
    }
}
