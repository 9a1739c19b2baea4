// Provider capability interface and the ordered provider registry

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{Definition, Feature, FeatureSet, Language, Record};
use crate::context::Context;
use crate::error::{DescriptorError, DevbootError, Result};
use crate::platform::PlatformId;

/// Environment variables handed to a provider's build or install step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEnvironment {
    vars: BTreeMap<String, String>,
}

impl ProviderEnvironment {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Append a whitespace-separated flag unless it is already present
    pub fn append_flag(&mut self, key: &str, flag: &str) {
        let value = self.vars.entry(key.to_string()).or_default();
        if value.split_whitespace().any(|existing| existing == flag) {
            return;
        }
        if !value.is_empty() {
            value.push(' ');
        }
        value.push_str(flag);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.vars.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn into_vars(self) -> BTreeMap<String, String> {
        self.vars
    }
}

/// Everything a provider needs to install one record
#[derive(Debug, Clone)]
pub struct InstallRequest<'a> {
    pub definition: &'a Definition,
    pub record: &'a Record,
    pub features: &'a FeatureSet,
    pub platform: &'a PlatformId,
    /// Target directory; absent or empty when the provider is called
    pub location: &'a Path,
    /// Provider environment with feature changes applied
    pub environment: &'a ProviderEnvironment,
}

/// A completed installation on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Installation {
    pub descriptor: String,
    pub provider: String,
    pub implementation: String,
    pub base_version: String,
    pub implementation_version: String,
    pub features: Vec<String>,
    pub platform: String,
    pub location: PathBuf,
}

impl Installation {
    /// Interpreter entry point inside the installation
    pub fn executable(&self) -> PathBuf {
        if self.platform.starts_with("windows-") {
            self.location.join("python.exe")
        } else {
            self.location.join("bin").join("python")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed(Installation),
    AlreadySatisfied(Installation),
}

impl InstallOutcome {
    pub fn installation(&self) -> &Installation {
        match self {
            InstallOutcome::Installed(installation)
            | InstallOutcome::AlreadySatisfied(installation) => installation,
        }
    }

    pub fn into_installation(self) -> Installation {
        match self {
            InstallOutcome::Installed(installation)
            | InstallOutcome::AlreadySatisfied(installation) => installation,
        }
    }
}

/// A named strategy for installing a language runtime
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    fn supports_platform(&self, platform: &PlatformId) -> bool;

    fn supports_base_version(&self, definition: &Definition) -> bool;

    fn supports_implementation(&self, implementation: &str) -> bool;

    fn supports_feature(&self, feature: &Feature) -> bool;

    /// All four predicates at once
    fn check_support(
        &self,
        definition: &Definition,
        features: &FeatureSet,
        platform: &PlatformId,
    ) -> bool {
        self.supports_platform(platform)
            && self.supports_base_version(definition)
            && self.supports_implementation(&definition.implementation)
            && features.iter().all(|feature| self.supports_feature(feature))
    }

    /// Environment before features are applied
    fn base_environment(&self) -> ProviderEnvironment {
        ProviderEnvironment::default()
    }

    /// Newest concrete version this provider can install for the definition
    async fn discover_current_version(
        &self,
        ctx: &Context,
        definition: &Definition,
        platform: &PlatformId,
    ) -> Result<String>;

    async fn form_version_record(
        &self,
        ctx: &Context,
        definition: &Definition,
        platform: &PlatformId,
    ) -> Result<Record> {
        let version = self
            .discover_current_version(ctx, definition, platform)
            .await?;
        Ok(Record::new(version, self.name()))
    }

    /// Populate `request.location`; the caller owns markers and cleanup
    async fn install(&self, ctx: &Context, request: &InstallRequest<'_>) -> Result<()>;
}

impl std::fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Provider").field(&self.name()).finish()
    }
}

/// Providers of one language, in registration order
#[derive(Clone)]
pub struct ProviderRegistry {
    language: Language,
    providers: Vec<Arc<dyn Provider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("language", &self.language)
            .field("providers", &self.names())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            providers: Vec::new(),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Register a provider; a provider of the same name is replaced in place
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        match self
            .providers
            .iter()
            .position(|existing| existing.name() == provider.name())
        {
            Some(index) => self.providers[index] = provider,
            None => self.providers.push(provider),
        }
    }

    pub fn with(mut self, provider: Arc<dyn Provider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers
            .iter()
            .find(|provider| provider.name() == name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.providers.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Providers a definition may use, in registration order.
    ///
    /// An empty provider list means every registered provider. Listed names
    /// must all be registered.
    pub fn candidates(&self, definition: &Definition) -> Result<Vec<Arc<dyn Provider>>> {
        for name in &definition.providers {
            if self.get(name).is_none() {
                return Err(DevbootError::Descriptor(Box::new(
                    DescriptorError::UnknownProvider {
                        language: self.language.name().to_string(),
                        name: name.clone(),
                        available: self.names(),
                    },
                )));
            }
        }

        Ok(self
            .providers
            .iter()
            .filter(|provider| {
                definition.providers.is_empty()
                    || definition.providers.iter().any(|name| name == provider.name())
            })
            .cloned()
            .collect())
    }
}
