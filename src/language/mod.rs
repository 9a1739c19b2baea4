// Language runtime resolution for devboot
// Descriptors name a runtime request; providers install it; records remember
// which provider produced which concrete version on which platform.

pub mod descriptor;
pub mod feature;
pub mod provider;
pub mod python;
pub mod records;
pub mod resolver;

use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

use crate::error::{DescriptorError, DevbootError, Result};
use crate::platform::PlatformId;

pub use descriptor::{Definition, DescriptorRegistry, DESCRIPTOR_FORMAT_VERSION};
pub use feature::{Feature, FeatureSet};
pub use provider::{
    InstallOutcome, InstallRequest, Installation, Provider, ProviderEnvironment, ProviderRegistry,
};
pub use records::{Record, RecordLock, RecordStore, RECORD_FORMAT_VERSION};
pub use resolver::{installation_dir_name, Resolver, UpdateOutcome};

/// Languages devboot knows how to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
}

impl Language {
    pub const ALL: &'static [Language] = &[Language::Python];

    pub fn name(&self) -> &'static str {
        match self {
            Language::Python => "python",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|language| language.name() == name)
            .ok_or_else(|| {
                DevbootError::Descriptor(Box::new(DescriptorError::UnknownLanguage {
                    name: name.to_string(),
                    available: Self::ALL.iter().map(|l| l.name().to_string()).collect(),
                }))
            })
    }

    /// Check a version string against this language's version rule
    pub fn validate_version(&self, version: &str) -> Result<()> {
        match self {
            Language::Python => python::version::parse(version).map(|_| ()),
        }
    }

    /// Order two concrete versions under this language's rule
    pub fn compare_versions(&self, left: &str, right: &str) -> Result<Ordering> {
        match self {
            Language::Python => python::version::compare(left, right),
        }
    }

    /// True iff `candidate` is strictly newer than `current`
    pub fn is_newer(&self, candidate: &str, current: &str) -> Result<bool> {
        Ok(self.compare_versions(candidate, current)? == Ordering::Greater)
    }

    /// Look up a feature of this language by name
    pub fn feature(&self, name: &str) -> Option<Feature> {
        match self {
            Language::Python => python::PythonFeature::from_name(name).map(Feature::Python),
        }
    }

    pub fn feature_names(&self) -> Vec<String> {
        match self {
            Language::Python => python::PythonFeature::ALL
                .iter()
                .map(|feature| feature.name().to_string())
                .collect(),
        }
    }

    /// Registry of this language's built-in providers, in registration order
    pub fn builtin_providers(&self, host: &PlatformId) -> ProviderRegistry {
        match self {
            Language::Python => python::builtin_providers(host),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
