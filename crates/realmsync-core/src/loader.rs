//! Desired realm documents from the import directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::model::DesiredRealm;
use crate::settings::ManagedRealm;
use crate::{Error, Result};

/// Reads `<import_dir>/<realm file>` documents. Performs no network I/O.
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    dir: PathBuf,
}

impl DocumentLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, realm: &ManagedRealm) -> PathBuf {
        self.dir.join(&realm.file)
    }

    /// Loads the desired document for `realm`.
    ///
    /// Returns `Ok(None)` when the document does not exist. Read and parse
    /// failures are [`Error::MalformedDocument`].
    pub fn load(&self, realm: &ManagedRealm) -> Result<Option<DesiredRealm>> {
        let path = self.path_for(realm);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::malformed(&path, e.to_string())),
        };

        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| Error::malformed(&path, e.to_string()))?;
        let desired =
            DesiredRealm::from_value(&realm.name, value).map_err(|reason| Error::malformed(&path, reason))?;

        if !desired.ignored_fields().is_empty() {
            tracing::debug!(
                realm = %realm.name,
                fields = ?desired.ignored_fields(),
                "document fields outside the managed allow-list are ignored"
            );
        }
        Ok(Some(desired))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CollectionKind;

    fn realm() -> ManagedRealm {
        ManagedRealm::new("kairos-dev", "kairos-").unwrap()
    }

    #[test]
    fn test_missing_document_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loader = DocumentLoader::new(dir.path());
        assert!(loader.load(&realm()).unwrap().is_none());
    }

    #[test]
    fn test_load_document() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("kairos-dev-realm.json"),
            r#"{"realm": "kairos-dev", "enabled": true, "authenticationFlows": [{"alias": "browser"}]}"#,
        )
        .unwrap();

        let desired = DocumentLoader::new(dir.path()).load(&realm()).unwrap().unwrap();
        assert_eq!(desired.name(), "kairos-dev");
        assert_eq!(
            desired.collection(CollectionKind::AuthenticationFlows).map(<[_]>::len),
            Some(1)
        );
    }

    #[test]
    fn test_parse_failure_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("kairos-dev-realm.json"), "{ not json").unwrap();

        let err = DocumentLoader::new(dir.path()).load(&realm()).unwrap_err();
        match err {
            Error::MalformedDocument { path, .. } => {
                assert!(path.ends_with("kairos-dev-realm.json"));
            }
            other => panic!("expected MalformedDocument, got {other:?}"),
        }
    }

    #[test]
    fn test_realm_name_mismatch_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("kairos-dev-realm.json"), r#"{"realm": "kairos-prod"}"#).unwrap();

        let err = DocumentLoader::new(dir.path()).load(&realm()).unwrap_err();
        assert!(matches!(err, Error::MalformedDocument { .. }));
        assert!(err.to_string().contains("kairos-prod"));
    }
}
