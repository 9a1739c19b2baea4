// Source builds through pyenv's python-build

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use super::features::LABEL_CONFIGURE;
use super::{version, CPYTHON, PYPY};
use crate::context::Context;
use crate::error::{DevbootError, ResolutionError, Result};
use crate::git::ToolCheckout;
use crate::language::{Definition, Feature, InstallRequest, Provider};
use crate::platform::PlatformId;
use crate::process::ProcessConfig;

pub const PROVIDER_NAME: &str = "build-from-source";
pub const PYENV_URL: &str = "https://github.com/pyenv/pyenv.git";
const PYENV_BRANCH: &str = "master";

const DEFINITIONS_TIMEOUT: Duration = Duration::from_secs(60);
const BUILD_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug, Clone)]
pub struct SourceBuildProvider {
    repository: String,
}

impl Default for SourceBuildProvider {
    fn default() -> Self {
        Self::with_repository(PYENV_URL)
    }
}

impl SourceBuildProvider {
    pub fn with_repository(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
        }
    }

    fn checkout(&self, ctx: &Context) -> ToolCheckout {
        ToolCheckout::new(
            self.repository.clone(),
            PYENV_BRANCH,
            ctx.config().tools_dir().join("pyenv"),
        )
    }

    pub fn python_build(checkout: &Path) -> PathBuf {
        checkout
            .join("plugins")
            .join("python-build")
            .join("bin")
            .join("python-build")
    }

    /// python-build definition name for a concrete version
    pub fn definition_name(definition: &Definition, implementation_version: &str) -> String {
        if definition.implementation == PYPY {
            format!("pypy{}-{}", definition.base_version, implementation_version)
        } else {
            implementation_version.to_string()
        }
    }

    async fn list_definitions(&self, ctx: &Context, checkout: &Path) -> Result<String> {
        let config = ProcessConfig::for_program(&Self::python_build(checkout))
            .with_args(["--definitions"])
            .with_timeout(DEFINITIONS_TIMEOUT);
        Ok(ctx.process().execute_checked(config).await?.stdout())
    }
}

/// Newest implementation version in a `python-build --definitions` listing
pub fn select_version(listing: &str, definition: &Definition) -> Option<String> {
    let lines = listing.lines().map(str::trim).filter(|line| !line.is_empty());

    if definition.implementation == PYPY {
        let base = version::parse(&definition.base_version).ok()?;
        let candidates: Vec<&str> = lines
            .filter_map(|line| line.strip_prefix("pypy"))
            .filter_map(|rest| rest.split_once('-'))
            .filter(|(language_version, _)| {
                version::parse(language_version)
                    .map(|parsed| version::matches_base(&base, &parsed))
                    .unwrap_or(false)
            })
            .map(|(_, implementation_version)| implementation_version)
            .collect();
        version::newest(candidates)
    } else {
        version::newest_matching(&definition.base_version, lines)
    }
}

#[async_trait]
impl Provider for SourceBuildProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supports_platform(&self, platform: &PlatformId) -> bool {
        platform.is_linux() || platform.is_darwin()
    }

    fn supports_base_version(&self, _definition: &Definition) -> bool {
        true
    }

    fn supports_implementation(&self, implementation: &str) -> bool {
        implementation == CPYTHON || implementation == PYPY
    }

    fn supports_feature(&self, feature: &Feature) -> bool {
        feature.has_label(LABEL_CONFIGURE)
    }

    async fn discover_current_version(
        &self,
        ctx: &Context,
        definition: &Definition,
        _platform: &PlatformId,
    ) -> Result<String> {
        let checkout = self.checkout(ctx).sync().await?;
        let listing = self.list_definitions(ctx, &checkout).await?;

        select_version(&listing, definition).ok_or_else(|| {
            DevbootError::Resolution(Box::new(ResolutionError::NoCandidateVersion {
                provider: PROVIDER_NAME.to_string(),
                implementation: definition.implementation.clone(),
                base_version: definition.base_version.clone(),
            }))
        })
    }

    async fn install(&self, ctx: &Context, request: &InstallRequest<'_>) -> Result<()> {
        let checkout = self.checkout(ctx).ensure().await?;
        let build_definition =
            Self::definition_name(request.definition, &request.record.implementation_version);

        info!(
            definition = %build_definition,
            location = %request.location.display(),
            "Building Python from source"
        );

        let config = ProcessConfig::for_program(&Self::python_build(&checkout))
            .with_args([
                OsString::from(&build_definition),
                request.location.as_os_str().to_os_string(),
            ])
            .with_environment(request.environment.clone().into_vars())
            .with_timeout(BUILD_TIMEOUT);
        ctx.process().execute_checked(config).await?;
        Ok(())
    }
}
