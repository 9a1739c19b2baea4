// Provider resolution: supportable providers, version records, installs and
// update checks for one language

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

use super::{
    Definition, FeatureSet, InstallOutcome, InstallRequest, Installation, Provider,
    ProviderRegistry, Record, RecordStore,
};
use crate::context::Context;
use crate::error::{DevbootError, ProviderFailure, ResolutionError, Result};
use crate::logging::utils::{provider_span, resolution_span};
use crate::platform::PlatformId;

/// Marker written into a completed installation
pub const INSTALLATION_MARKER: &str = ".devboot-installation.toml";

/// Result of an update check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated { previous: Record, current: Record },
    UpToDate(Record),
}

impl UpdateOutcome {
    pub fn record(&self) -> &Record {
        match self {
            UpdateOutcome::Updated { current, .. } => current,
            UpdateOutcome::UpToDate(record) => record,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct InstallationMarker {
    installed_at: String,
    installation: Installation,
}

/// Directory name of an installation.
///
/// `{implementation}-{base}--{implementation_version}--{features}--{platform}`
/// with empty components and their separators left out. Features are sorted
/// and joined with `+`.
pub fn installation_dir_name(
    implementation: &str,
    base_version: &str,
    implementation_version: &str,
    features: &[String],
    platform: &PlatformId,
) -> String {
    let head = [implementation, base_version]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("-");

    let mut sorted = features.to_vec();
    sorted.sort();
    sorted.dedup();
    let features = sorted.join("+");
    let platform = platform.to_string();

    [head.as_str(), implementation_version, features.as_str(), platform.as_str()]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("--")
}

pub fn is_installed(location: &Path) -> bool {
    location.join(INSTALLATION_MARKER).is_file()
}

/// Resolves definitions of one language against its providers and records
pub struct Resolver<'a> {
    ctx: &'a Context,
    registry: &'a ProviderRegistry,
    records: RecordStore,
}

impl<'a> Resolver<'a> {
    pub fn new(ctx: &'a Context, registry: &'a ProviderRegistry) -> Self {
        let language = registry.language();
        Self {
            ctx,
            registry,
            records: RecordStore::new(ctx.config().records_dir_for(language.name())),
        }
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Candidate providers for which every predicate holds, registration order
    pub fn supportable_providers(
        &self,
        definition: &Definition,
        platform: &PlatformId,
    ) -> Result<Vec<Arc<dyn Provider>>> {
        let features = FeatureSet::instantiate(definition, platform)?;
        self.supportable_with(definition, &features, platform)
    }

    fn supportable_with(
        &self,
        definition: &Definition,
        features: &FeatureSet,
        platform: &PlatformId,
    ) -> Result<Vec<Arc<dyn Provider>>> {
        Ok(self
            .registry
            .candidates(definition)?
            .into_iter()
            .filter(|provider| {
                let supported = provider.check_support(definition, features, platform);
                if !supported {
                    debug!(provider = provider.name(), descriptor = %definition.name, "Provider does not support descriptor");
                }
                supported
            })
            .collect())
    }

    pub fn is_supportable(&self, definition: &Definition, platform: &PlatformId) -> Result<bool> {
        Ok(!self.supportable_providers(definition, platform)?.is_empty())
    }

    fn no_supportable_provider(definition: &Definition, platform: &PlatformId) -> DevbootError {
        DevbootError::Resolution(Box::new(ResolutionError::NoSupportableProvider {
            descriptor: definition.name.clone(),
            platform: platform.to_string(),
        }))
    }

    /// Newest version the first supportable provider offers
    pub async fn discover_current_version(
        &self,
        definition: &Definition,
        platform: &PlatformId,
    ) -> Result<String> {
        let provider = self
            .supportable_providers(definition, platform)?
            .into_iter()
            .next()
            .ok_or_else(|| Self::no_supportable_provider(definition, platform))?;
        provider
            .discover_current_version(self.ctx, definition, platform)
            .await
    }

    /// Form a record from the first supportable provider whose probe succeeds
    pub async fn form_version_record(
        &self,
        definition: &Definition,
        platform: &PlatformId,
    ) -> Result<Record> {
        let features = FeatureSet::instantiate(definition, platform)?;
        self.form_with(definition, &features, platform).await
    }

    async fn form_with(
        &self,
        definition: &Definition,
        features: &FeatureSet,
        platform: &PlatformId,
    ) -> Result<Record> {
        let providers = self.supportable_with(definition, features, platform)?;
        let mut last_error = None;

        for provider in providers {
            match provider
                .form_version_record(self.ctx, definition, platform)
                .instrument(provider_span(provider.name()))
                .await
            {
                Ok(record) => return Ok(record),
                Err(error) => {
                    warn!(provider = provider.name(), error = %error, "Version discovery failed");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Self::no_supportable_provider(definition, platform)))
    }

    /// The platform's record, formed and stored on first use
    pub async fn get_or_create_record(
        &self,
        definition: &Definition,
        platform: &PlatformId,
    ) -> Result<Record> {
        let features = FeatureSet::instantiate(definition, platform)?;
        self.records
            .get_or_create(&definition.name, platform, || {
                self.form_with(definition, &features, platform)
            })
            .await
    }

    pub fn installation_location(
        &self,
        provider: &str,
        definition: &Definition,
        record: &Record,
        features: &FeatureSet,
        platform: &PlatformId,
    ) -> PathBuf {
        let dir_name = installation_dir_name(
            &definition.implementation,
            &definition.base_version,
            &record.implementation_version,
            &features.sorted_names(),
            platform,
        );
        self.ctx
            .config()
            .installations_root(definition.language.name(), provider)
            .join(dir_name)
    }

    fn describe(
        &self,
        provider: &str,
        definition: &Definition,
        record: &Record,
        features: &FeatureSet,
        platform: &PlatformId,
    ) -> Installation {
        Installation {
            descriptor: definition.name.clone(),
            provider: provider.to_string(),
            implementation: definition.implementation.clone(),
            base_version: definition.base_version.clone(),
            implementation_version: record.implementation_version.clone(),
            features: features.sorted_names(),
            platform: platform.to_string(),
            location: self.installation_location(provider, definition, record, features, platform),
        }
    }

    /// Existing installation of the recorded version, if any
    pub fn locate(
        &self,
        definition: &Definition,
        platform: &PlatformId,
    ) -> Result<Option<Installation>> {
        let Some(record) = self.records.get(&definition.name, platform)? else {
            return Ok(None);
        };
        let features = FeatureSet::instantiate(definition, platform)?;
        Ok(self
            .supportable_with(definition, &features, platform)?
            .iter()
            .map(|provider| self.describe(provider.name(), definition, &record, &features, platform))
            .find(|installation| is_installed(&installation.location)))
    }

    /// Install the recorded version with the first provider that succeeds
    pub async fn install(
        &self,
        definition: &Definition,
        platform: &PlatformId,
    ) -> Result<InstallOutcome> {
        let span = resolution_span(
            definition.language.name(),
            &definition.name,
            &platform.to_string(),
        );
        self.install_inner(definition, platform).instrument(span).await
    }

    async fn install_inner(
        &self,
        definition: &Definition,
        platform: &PlatformId,
    ) -> Result<InstallOutcome> {
        let features = FeatureSet::instantiate(definition, platform)?;
        let providers = self.supportable_with(definition, &features, platform)?;
        if providers.is_empty() {
            return Err(Self::no_supportable_provider(definition, platform));
        }

        let record = self
            .records
            .get_or_create(&definition.name, platform, || {
                self.form_with(definition, &features, platform)
            })
            .await?;

        let planned: Vec<_> = providers
            .into_iter()
            .map(|provider| {
                let installation =
                    self.describe(provider.name(), definition, &record, &features, platform);
                (provider, installation)
            })
            .collect();

        if let Some((provider, installation)) = planned
            .iter()
            .find(|(_, installation)| is_installed(&installation.location))
        {
            info!(
                provider = provider.name(),
                location = %installation.location.display(),
                "Already installed"
            );
            return Ok(InstallOutcome::AlreadySatisfied(installation.clone()));
        }

        let mut failures = Vec::new();
        for (provider, installation) in planned {
            let attempt = self
                .install_with(provider.as_ref(), definition, &record, &features, platform, &installation)
                .instrument(provider_span(provider.name()))
                .await;

            match attempt {
                Ok(()) => {
                    info!(
                        provider = provider.name(),
                        version = %record.implementation_version,
                        location = %installation.location.display(),
                        "Installed"
                    );
                    return Ok(InstallOutcome::Installed(installation));
                }
                Err(error) => {
                    warn!(provider = provider.name(), error = %error, "Provider failed to install");
                    remove_partial(&installation.location);
                    failures.push(ProviderFailure {
                        provider: provider.name().to_string(),
                        message: error.to_string(),
                    });
                }
            }
        }

        Err(DevbootError::Resolution(Box::new(
            ResolutionError::AllProvidersFailed {
                descriptor: definition.name.clone(),
                failures,
            },
        )))
    }

    async fn install_with(
        &self,
        provider: &dyn Provider,
        definition: &Definition,
        record: &Record,
        features: &FeatureSet,
        platform: &PlatformId,
        installation: &Installation,
    ) -> Result<()> {
        let location = installation.location.as_path();
        if location.exists() {
            debug!(location = %location.display(), "Removing incomplete installation");
            std::fs::remove_dir_all(location)?;
        }
        if let Some(parent) = location.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let environment = features.provider_environment(&provider.base_environment());
        let request = InstallRequest {
            definition,
            record,
            features,
            platform,
            location,
            environment: &environment,
        };
        provider.install(self.ctx, &request).await?;

        if !location.is_dir() {
            return Err(DevbootError::Resolution(Box::new(
                ResolutionError::InstallationFailed {
                    provider: provider.name().to_string(),
                    message: format!("{} was not created", location.display()),
                },
            )));
        }
        features.modify_installation(location)?;
        write_marker(installation)
    }

    /// Look for a strictly newer version, first provider to offer one wins
    pub async fn update(
        &self,
        definition: &Definition,
        platform: &PlatformId,
    ) -> Result<UpdateOutcome> {
        let span = resolution_span(
            definition.language.name(),
            &definition.name,
            &platform.to_string(),
        );
        self.update_inner(definition, platform).instrument(span).await
    }

    async fn update_inner(
        &self,
        definition: &Definition,
        platform: &PlatformId,
    ) -> Result<UpdateOutcome> {
        let features = FeatureSet::instantiate(definition, platform)?;
        let candidates = self.registry.candidates(definition)?;
        let lock = self.records.lock(&definition.name)?;

        let current = self
            .records
            .get_or_create_locked(&lock, &definition.name, platform, || {
                self.form_with(definition, &features, platform)
            })
            .await?;

        for provider in candidates {
            if !provider.check_support(definition, &features, platform) {
                debug!(provider = provider.name(), "Skipping unsupported provider");
                continue;
            }

            let probed = provider
                .discover_current_version(self.ctx, definition, platform)
                .instrument(provider_span(provider.name()))
                .await;
            let version = match probed {
                Ok(version) => version,
                Err(error) => {
                    warn!(provider = provider.name(), error = %error, "Update probe failed");
                    continue;
                }
            };

            match definition
                .language
                .is_newer(&version, &current.implementation_version)
            {
                Ok(true) => {
                    let record = Record::new(version, provider.name());
                    self.records
                        .replace_locked(&lock, &definition.name, platform, record.clone())?;
                    info!(
                        previous = %current.implementation_version,
                        current = %record.implementation_version,
                        provider = provider.name(),
                        "Updated record"
                    );
                    return Ok(UpdateOutcome::Updated {
                        previous: current,
                        current: record,
                    });
                }
                Ok(false) => {
                    debug!(provider = provider.name(), %version, "No newer version");
                }
                Err(error) => {
                    warn!(provider = provider.name(), error = %error, "Ignoring unparseable version");
                }
            }
        }

        Ok(UpdateOutcome::UpToDate(current))
    }
}

fn write_marker(installation: &Installation) -> Result<()> {
    let marker = InstallationMarker {
        installed_at: chrono::Utc::now().to_rfc3339(),
        installation: installation.clone(),
    };
    let content = toml::to_string_pretty(&marker).map_err(|e| {
        DevbootError::Resolution(Box::new(ResolutionError::InstallationFailed {
            provider: installation.provider.clone(),
            message: format!("Failed to write installation marker: {e}"),
        }))
    })?;
    std::fs::write(installation.location.join(INSTALLATION_MARKER), content)?;
    Ok(())
}

fn remove_partial(location: &Path) {
    if location.exists() {
        if let Err(e) = std::fs::remove_dir_all(location) {
            warn!(location = %location.display(), error = %e, "Failed to remove partial installation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installation_dir_name() {
        let platform = PlatformId::new("linux", "64", "x86_64");
        let name = installation_dir_name(
            "refimpl",
            "3.10",
            "3.10.9",
            &["instrumented".to_string()],
            &platform,
        );
        assert_eq!(name, "refimpl-3.10--3.10.9--instrumented--linux-64--x86_64");

        let segments: Vec<&str> = name.splitn(4, "--").collect();
        assert_eq!(segments[2], "instrumented");
        assert!(name.ends_with("--linux-64--x86_64"));
    }

    #[test]
    fn test_features_sorted_and_empty_parts_omitted() {
        let platform = PlatformId::new("darwin", "64", "aarch64");
        let name = installation_dir_name(
            "cpython",
            "3.13",
            "3.13.0",
            &["free-threading".to_string(), "debug".to_string()],
            &platform,
        );
        assert_eq!(name, "cpython-3.13--3.13.0--debug+free-threading--darwin-64--aarch64");

        let bare = installation_dir_name("cpython", "3.12", "3.12.7", &[], &platform);
        assert_eq!(bare, "cpython-3.12--3.12.7--darwin-64--aarch64");
    }

    #[test]
    fn test_dir_name_is_deterministic() {
        let platform = PlatformId::new("linux", "64", "x86_64");
        let features = vec!["b".to_string(), "a".to_string()];
        assert_eq!(
            installation_dir_name("x", "1", "1.0", &features, &platform),
            installation_dir_name("x", "1", "1.0", &features, &platform)
        );
    }
}
