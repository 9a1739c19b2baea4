//! Descriptor registry.
//!
//! A descriptor document lives at `{descriptors_dir}/{language}.toml`:
//!
//! ```toml
//! format-version = 1
//!
//! [descriptors.py310]
//! base-version = "3.10"
//! implementation = "cpython"
//! features = ["debug"]
//! providers = ["prebuilt", "build-from-source"]
//! ```
//!
//! Documents are parsed once per registry and kept for its lifetime.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::Language;
use crate::error::{DescriptorError, DevbootError, Result};

pub const DESCRIPTOR_FORMAT_VERSION: u32 = 1;

/// A named language definition from a descriptor document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Definition {
    pub language: Language,
    pub name: String,
    pub base_version: String,
    pub implementation: String,
    /// Feature names in document order
    pub features: Vec<String>,
    /// Allowed provider names; tried in registration order, empty means every provider
    pub providers: Vec<String>,
}

impl Definition {
    pub fn new(
        language: Language,
        name: impl Into<String>,
        base_version: impl Into<String>,
        implementation: impl Into<String>,
    ) -> Self {
        Self {
            language,
            name: name.into(),
            base_version: base_version.into(),
            implementation: implementation.into(),
            features: Vec::new(),
            providers: Vec::new(),
        }
    }

    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = features.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_providers<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.providers = providers.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct DefinitionEntry {
    base_version: String,
    implementation: String,
    #[serde(default)]
    features: Vec<String>,
    #[serde(default)]
    providers: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct DescriptorDocument {
    #[allow(dead_code)]
    format_version: i64,
    #[serde(default, alias = "versions")]
    descriptors: BTreeMap<String, DefinitionEntry>,
}

/// Parse a descriptor document's content.
///
/// The format version is checked before anything else in the document.
pub fn parse_document(
    language: Language,
    path: &Path,
    content: &str,
) -> Result<BTreeMap<String, Definition>> {
    let invalid = |message: String| {
        DevbootError::Descriptor(Box::new(DescriptorError::InvalidDocument {
            path: path.to_path_buf(),
            message,
        }))
    };

    let table: toml::Table = toml::from_str(content).map_err(|e| invalid(e.message().to_string()))?;

    match table.get("format-version") {
        Some(toml::Value::Integer(found)) if *found == i64::from(DESCRIPTOR_FORMAT_VERSION) => {}
        Some(toml::Value::Integer(found)) => {
            return Err(DevbootError::Descriptor(Box::new(
                DescriptorError::UnsupportedFormatVersion {
                    path: path.to_path_buf(),
                    found: *found,
                    expected: DESCRIPTOR_FORMAT_VERSION,
                },
            )));
        }
        Some(other) => {
            return Err(invalid(format!(
                "format-version must be an integer, found {}",
                other.type_str()
            )))
        }
        None => return Err(invalid("missing format-version".to_string())),
    }

    let document: DescriptorDocument = toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| invalid(e.message().to_string()))?;

    let mut definitions = BTreeMap::new();
    for (name, entry) in document.descriptors {
        language.validate_version(&entry.base_version).map_err(|e| {
            DevbootError::Descriptor(Box::new(DescriptorError::InvalidBaseVersion {
                name: name.clone(),
                base_version: entry.base_version.clone(),
                error: e.to_string(),
            }))
        })?;
        if entry.implementation.trim().is_empty() {
            return Err(invalid(format!("descriptor {name} has an empty implementation")));
        }

        definitions.insert(
            name.clone(),
            Definition {
                language,
                name,
                base_version: entry.base_version,
                implementation: entry.implementation,
                features: entry.features,
                providers: entry.providers,
            },
        );
    }

    Ok(definitions)
}

/// Named definitions per language, loaded lazily from the descriptors directory
#[derive(Debug)]
pub struct DescriptorRegistry {
    descriptors_dir: PathBuf,
    documents: HashMap<Language, OnceCell<BTreeMap<String, Definition>>>,
}

impl DescriptorRegistry {
    pub fn new(descriptors_dir: impl Into<PathBuf>) -> Self {
        Self {
            descriptors_dir: descriptors_dir.into(),
            documents: Language::ALL
                .iter()
                .map(|language| (*language, OnceCell::new()))
                .collect(),
        }
    }

    pub fn document_path(&self, language: Language) -> PathBuf {
        self.descriptors_dir.join(format!("{}.toml", language.name()))
    }

    fn definitions(&self, language: Language) -> Result<&BTreeMap<String, Definition>> {
        let cell = self.documents.get(&language).ok_or_else(|| {
            DevbootError::Descriptor(Box::new(DescriptorError::UnknownLanguage {
                name: language.name().to_string(),
                available: Language::ALL.iter().map(|l| l.name().to_string()).collect(),
            }))
        })?;

        cell.get_or_try_init(|| {
            let path = self.document_path(language);
            if !path.is_file() {
                return Err(DevbootError::Descriptor(Box::new(
                    DescriptorError::DocumentNotFound {
                        language: language.name().to_string(),
                        path,
                    },
                )));
            }
            let content = std::fs::read_to_string(&path)?;
            let definitions = parse_document(language, &path, &content)?;
            debug!(
                language = language.name(),
                path = %path.display(),
                count = definitions.len(),
                "Loaded descriptor document"
            );
            Ok(definitions)
        })
    }

    pub fn get_definition(&self, language: Language, name: &str) -> Result<Definition> {
        let definitions = self.definitions(language)?;
        definitions.get(name).cloned().ok_or_else(|| {
            DevbootError::Descriptor(Box::new(DescriptorError::DefinitionNotFound {
                language: language.name().to_string(),
                name: name.to_string(),
                available: definitions.keys().cloned().collect(),
            }))
        })
    }

    /// All definitions of a language, keyed by name
    pub fn list_definitions(&self, language: Language) -> Result<BTreeMap<String, Definition>> {
        Ok(self.definitions(language)?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    const DOCUMENT: &str = r#"
format-version = 1

[descriptors.py310]
base-version = "3.10"
implementation = "cpython"
features = ["debug", "address-sanitizer"]
providers = ["build-from-source"]

[descriptors.pypy]
base-version = "3.10"
implementation = "pypy"
"#;

    fn registry_with(content: &str) -> (TempDir, DescriptorRegistry) {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("python.toml"), content).unwrap();
        let registry = DescriptorRegistry::new(temp.path());
        (temp, registry)
    }

    #[test]
    fn test_get_definition() {
        let (_temp, registry) = registry_with(DOCUMENT);
        let definition = registry.get_definition(Language::Python, "py310").unwrap();

        assert_eq!(definition.base_version, "3.10");
        assert_eq!(definition.implementation, "cpython");
        assert_eq!(definition.features, vec!["debug", "address-sanitizer"]);
        assert_eq!(definition.providers, vec!["build-from-source"]);
    }

    #[test]
    fn test_defaults_are_empty() {
        let (_temp, registry) = registry_with(DOCUMENT);
        let definition = registry.get_definition(Language::Python, "pypy").unwrap();
        assert!(definition.features.is_empty());
        assert!(definition.providers.is_empty());
    }

    #[test]
    fn test_unknown_name_lists_available() {
        let (_temp, registry) = registry_with(DOCUMENT);
        let error = registry.get_definition(Language::Python, "py999").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert!(error.user_message(false).contains("Available: py310, pypy"));
    }

    #[test]
    fn test_versions_alias() {
        let content = "format-version = 1\n[versions.legacy]\nbase-version = \"3.8\"\nimplementation = \"cpython\"\n";
        let (_temp, registry) = registry_with(content);
        assert!(registry.get_definition(Language::Python, "legacy").is_ok());
    }

    #[test]
    fn test_format_version_checked_first() {
        let content = "format-version = 2\n[something-else]\nshape = \"different\"\n";
        let (_temp, registry) = registry_with(content);
        let error = registry.list_definitions(Language::Python).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidData);
        assert!(error.to_string().contains("format-version 2"));
    }

    #[test]
    fn test_missing_format_version() {
        let (_temp, registry) = registry_with("[descriptors]\n");
        let error = registry.list_definitions(Language::Python).unwrap_err();
        assert!(error.to_string().contains("missing format-version"));
    }

    #[test]
    fn test_invalid_base_version() {
        let content = "format-version = 1\n[descriptors.bad]\nbase-version = \"three\"\nimplementation = \"cpython\"\n";
        let (_temp, registry) = registry_with(content);
        let error = registry.get_definition(Language::Python, "bad").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_missing_document() {
        let temp = TempDir::new().unwrap();
        let registry = DescriptorRegistry::new(temp.path());
        let error = registry.list_definitions(Language::Python).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_document_is_cached() {
        let (temp, registry) = registry_with(DOCUMENT);
        assert_eq!(registry.list_definitions(Language::Python).unwrap().len(), 2);

        std::fs::remove_file(temp.path().join("python.toml")).unwrap();
        assert_eq!(registry.list_definitions(Language::Python).unwrap().len(), 2);
    }
}
