// Interpreters already present on PATH

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use super::interpreter::{probe_interpreter, InterpreterInfo};
use super::{symlink_file, PYPY};
use crate::context::Context;
use crate::error::{DevbootError, ResolutionError, Result};
use crate::language::{Definition, Feature, InstallRequest, Provider};
use crate::platform::PlatformId;

pub const PROVIDER_NAME: &str = "system";

/// Interpreters on the PATH of the host; other platforms are never supported
#[derive(Debug, Clone)]
pub struct SystemProvider {
    host: PlatformId,
}

impl SystemProvider {
    pub fn new(host: PlatformId) -> Self {
        Self { host }
    }

    /// Executable names tried in order
    pub fn candidate_names(definition: &Definition) -> Vec<String> {
        let stem = if definition.implementation == PYPY {
            "pypy"
        } else {
            "python"
        };
        vec![
            format!("{stem}{}", definition.base_version),
            format!("{stem}3"),
            stem.to_string(),
        ]
    }

    async fn find(
        &self,
        ctx: &Context,
        definition: &Definition,
    ) -> Result<(PathBuf, InterpreterInfo)> {
        for name in Self::candidate_names(definition) {
            let Ok(path) = which::which(&name) else {
                continue;
            };
            match probe_interpreter(ctx.process(), &path).await {
                Ok(info)
                    if info.implementation == definition.implementation
                        && info.matches_base(&definition.base_version) =>
                {
                    return Ok((path, info));
                }
                Ok(info) => {
                    debug!(
                        path = %path.display(),
                        implementation = %info.implementation,
                        version = %info.version,
                        "Interpreter does not match"
                    );
                }
                Err(error) => {
                    debug!(path = %path.display(), error = %error, "Interpreter probe failed");
                }
            }
        }

        Err(DevbootError::Resolution(Box::new(
            ResolutionError::NoCandidateVersion {
                provider: PROVIDER_NAME.to_string(),
                implementation: definition.implementation.clone(),
                base_version: definition.base_version.clone(),
            },
        )))
    }
}

#[async_trait]
impl Provider for SystemProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supports_platform(&self, platform: &PlatformId) -> bool {
        *platform == self.host && (platform.is_linux() || platform.is_darwin())
    }

    fn supports_base_version(&self, _definition: &Definition) -> bool {
        true
    }

    fn supports_implementation(&self, _implementation: &str) -> bool {
        true
    }

    fn supports_feature(&self, _feature: &Feature) -> bool {
        false
    }

    async fn discover_current_version(
        &self,
        ctx: &Context,
        definition: &Definition,
        _platform: &PlatformId,
    ) -> Result<String> {
        let (_, info) = self.find(ctx, definition).await?;
        Ok(info.implementation_version)
    }

    async fn install(&self, ctx: &Context, request: &InstallRequest<'_>) -> Result<()> {
        let (path, info) = self.find(ctx, request.definition).await?;
        if info.implementation_version != request.record.implementation_version {
            return Err(DevbootError::Resolution(Box::new(
                ResolutionError::InstallationFailed {
                    provider: PROVIDER_NAME.to_string(),
                    message: format!(
                        "{} is {}, recorded version is {}",
                        path.display(),
                        info.implementation_version,
                        request.record.implementation_version
                    ),
                },
            )));
        }

        let bin = request.location.join("bin");
        std::fs::create_dir_all(&bin)?;
        symlink_file(&info.executable, &bin.join("python"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;

    #[test]
    fn test_candidate_names() {
        let cpython = Definition::new(Language::Python, "py", "3.11", "cpython");
        assert_eq!(
            SystemProvider::candidate_names(&cpython),
            vec!["python3.11", "python3", "python"]
        );

        let pypy = Definition::new(Language::Python, "pp", "3.10", "pypy");
        assert_eq!(
            SystemProvider::candidate_names(&pypy),
            vec!["pypy3.10", "pypy3", "pypy"]
        );
    }

    #[test]
    fn test_support_matrix() {
        let linux = PlatformId::new("linux", "64", "x86_64");
        let provider = SystemProvider::new(linux.clone());
        assert!(provider.supports_platform(&linux));
        assert!(!provider.supports_platform(&PlatformId::new("darwin", "64", "aarch64")));
        assert!(!provider.supports_platform(&PlatformId::new("linux", "64", "aarch64")));

        let darwin = PlatformId::new("darwin", "64", "aarch64");
        assert!(SystemProvider::new(darwin.clone()).supports_platform(&darwin));

        let windows = PlatformId::new("windows", "64", "x86_64");
        assert!(!SystemProvider::new(windows.clone()).supports_platform(&windows));
        assert!(provider.supports_implementation("anything"));
        assert!(!provider.supports_feature(&Feature::Python(super::super::PythonFeature::Debug)));
    }
}
