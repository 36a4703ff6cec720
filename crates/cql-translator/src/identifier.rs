//! Versioned library identifiers

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Identity of a library: `(id, version, system)`.
///
/// Two identifiers that differ only in `system` name different libraries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedIdentifier {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Namespace URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl VersionedIdentifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: None,
            system: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Copy of this identifier qualified with `system`
    pub fn qualified(&self, system: impl Into<String>) -> Self {
        self.clone().with_system(system)
    }

    /// An identifier is usable for resolution once it has a non-blank id
    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty()
    }

    /// True if `other` names the same library ignoring the namespace
    pub fn same_library(&self, other: &VersionedIdentifier) -> bool {
        self.id == other.id && self.version == other.version
    }
}

impl fmt::Display for VersionedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(system) = &self.system {
            write!(f, "{}/", system.trim_end_matches('/'))?;
        }
        f.write_str(&self.id)?;
        if let Some(version) = &self.version {
            write!(f, "|{}", version)?;
        }
        Ok(())
    }
}

/// Order two version strings segment by segment.
///
/// Numeric segments compare numerically, others lexically; a version that
/// extends another (`1.0.1` vs `1.0`) sorts after it.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split(['.', '-']);
    let mut right = b.split(['.', '-']);

    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (Some(l), Some(r)) => {
                let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => l.cmp(r),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_distinguishes_identity() {
        let plain = VersionedIdentifier::new("FHIRHelpers").with_version("4.0.1");
        let namespaced = plain.qualified("http://hl7.org/fhir");

        assert_ne!(plain, namespaced);
        assert!(plain.same_library(&namespaced));
    }

    #[test]
    fn test_display() {
        let id = VersionedIdentifier::new("FHIRHelpers")
            .with_version("4.0.1")
            .with_system("http://hl7.org/fhir");
        assert_eq!(id.to_string(), "http://hl7.org/fhir/FHIRHelpers|4.0.1");
        assert_eq!(VersionedIdentifier::new("Base").to_string(), "Base");
    }

    #[test]
    fn test_blank_id_is_invalid() {
        assert!(!VersionedIdentifier::new("  ").is_valid());
        assert!(VersionedIdentifier::new("Base").is_valid());
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.0", "1.0.1"), Ordering::Less);
        assert_eq!(compare_versions("4.0.1", "4.0.1"), Ordering::Equal);
        assert_eq!(compare_versions("1.0.0-beta", "1.0.0-alpha"), Ordering::Greater);
    }
}
