// Installation features: optional modifiers that change how a runtime is
// built (provider environment) and what ends up installed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::python::PythonFeature;
use super::{Definition, ProviderEnvironment};
use crate::error::{DescriptorError, DevbootError, ResolutionError, Result};
use crate::platform::PlatformId;

/// Directory inside an installation holding one marker per applied feature
pub const FEATURE_MARKER_DIR: &str = ".devboot/features";

/// A feature of some language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Python(PythonFeature),
}

impl Feature {
    pub fn name(&self) -> &'static str {
        match self {
            Feature::Python(feature) => feature.name(),
        }
    }

    /// Labels providers match on, e.g. `configure`
    pub fn compatibility_labels(&self) -> &'static [&'static str] {
        match self {
            Feature::Python(feature) => feature.compatibility_labels(),
        }
    }

    /// Two features sharing any of these cannot be combined
    pub fn mutex_labels(&self) -> &'static [&'static str] {
        match self {
            Feature::Python(feature) => feature.mutex_labels(),
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.compatibility_labels().contains(&label)
    }

    pub fn check_descriptor_support(&self, definition: &Definition, platform: &PlatformId) -> bool {
        match self {
            Feature::Python(feature) => feature.check_descriptor_support(definition, platform),
        }
    }

    pub fn modify_provider_environment(&self, env: &mut ProviderEnvironment) {
        match self {
            Feature::Python(feature) => feature.modify_provider_environment(env),
        }
    }

    /// Post-install changes; safe to run more than once
    pub fn modify_installation(&self, location: &Path) -> Result<()> {
        let marker = feature_marker(location, self.name());
        if let Some(parent) = marker.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&marker, format!("{}\n", self.name()))?;

        match self {
            Feature::Python(feature) => feature.modify_installation(location),
        }
    }
}

pub fn feature_marker(location: &Path, name: &str) -> PathBuf {
    location.join(FEATURE_MARKER_DIR).join(name)
}

/// The supported subset of a definition's features, in document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    features: Vec<Feature>,
}

impl FeatureSet {
    /// Instantiate a definition's features for a platform.
    ///
    /// Unknown names are NotFound. Features that do not support the
    /// definition are skipped. A feature whose mutex labels intersect those
    /// already taken fails the whole set.
    pub fn instantiate(definition: &Definition, platform: &PlatformId) -> Result<Self> {
        let mut features: Vec<Feature> = Vec::new();
        let mut taken: BTreeMap<&'static str, &'static str> = BTreeMap::new();

        for name in &definition.features {
            let feature = definition.language.feature(name).ok_or_else(|| {
                DevbootError::Descriptor(Box::new(DescriptorError::UnknownFeature {
                    language: definition.language.name().to_string(),
                    name: name.clone(),
                    available: definition.language.feature_names(),
                }))
            })?;

            if features.contains(&feature) {
                continue;
            }
            if !feature.check_descriptor_support(definition, platform) {
                debug!(
                    feature = feature.name(),
                    descriptor = %definition.name,
                    %platform,
                    "Skipping feature unsupported by descriptor"
                );
                continue;
            }

            let shared: Vec<&'static str> = feature
                .mutex_labels()
                .iter()
                .copied()
                .filter(|label| taken.contains_key(label))
                .collect();
            if let Some(first_label) = shared.first() {
                return Err(DevbootError::Resolution(Box::new(
                    ResolutionError::FeatureConflict {
                        first: taken[first_label].to_string(),
                        second: feature.name().to_string(),
                        labels: shared.iter().map(|label| label.to_string()).collect(),
                    },
                )));
            }

            for label in feature.mutex_labels() {
                taken.insert(label, feature.name());
            }
            features.push(feature);
        }

        Ok(Self { features })
    }

    pub fn get(&self, name: &str) -> Option<&Feature> {
        self.features.iter().find(|feature| feature.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Names in document order
    pub fn names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name().to_string()).collect()
    }

    /// Names sorted, as used in installation locations
    pub fn sorted_names(&self) -> Vec<String> {
        let mut names = self.names();
        names.sort();
        names
    }

    /// A copy of `base` with every feature's changes applied
    pub fn provider_environment(&self, base: &ProviderEnvironment) -> ProviderEnvironment {
        let mut env = base.clone();
        for feature in &self.features {
            feature.modify_provider_environment(&mut env);
        }
        env
    }

    pub fn modify_installation(&self, location: &Path) -> Result<()> {
        for feature in &self.features {
            feature.modify_installation(location)?;
        }
        Ok(())
    }
}
