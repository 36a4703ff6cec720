//! Library sources read from a directory of `.cql` files.

use super::{LibrarySource, LibrarySourceProvider, ProviderError};
use crate::identifier::{compare_versions, VersionedIdentifier};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Looks up `{id}-{version}.cql`, then `{id}.cql`, in one directory.
///
/// Without a requested version the highest `{id}-*.cql` wins.
#[derive(Debug, Clone)]
pub struct DirectoryLibraryProvider {
    root: PathBuf,
}

impl DirectoryLibraryProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Versions of `id` present as `{id}-{version}.cql`
    fn versions(&self, id: &str) -> Result<Vec<String>, ProviderError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ProviderError::Io {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let prefix = format!("{}-", id);
        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ProviderError::Io {
                path: self.root.clone(),
                source,
            })?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(version) = file_name
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_suffix(".cql"))
            {
                versions.push(version.to_string());
            }
        }
        Ok(versions)
    }

    fn read(&self, path: &Path) -> Result<Option<String>, ProviderError> {
        match std::fs::read(path) {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| ProviderError::InvalidUtf8 {
                    origin: path.display().to_string(),
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ProviderError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

impl LibrarySourceProvider for DirectoryLibraryProvider {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn library_source(
        &self,
        identifier: &VersionedIdentifier,
    ) -> Result<Option<LibrarySource>, ProviderError> {
        let version = match &identifier.version {
            Some(version) => Some(version.clone()),
            None => self
                .versions(&identifier.id)?
                .into_iter()
                .max_by(|a, b| compare_versions(a, b)),
        };

        let mut candidates = Vec::with_capacity(2);
        if let Some(version) = &version {
            candidates.push((
                self.root.join(format!("{}-{}.cql", identifier.id, version)),
                Some(version.clone()),
            ));
        }
        candidates.push((self.root.join(format!("{}.cql", identifier.id)), identifier.version.clone()));

        for (path, found_version) in candidates {
            trace!(path = %path.display(), "Checking library file");
            if let Some(text) = self.read(&path)? {
                let resolved = VersionedIdentifier {
                    version: found_version,
                    ..identifier.clone()
                };
                return Ok(Some(LibrarySource::new(
                    resolved,
                    text,
                    path.display().to_string(),
                )));
            }
        }
        Ok(None)
    }
}
