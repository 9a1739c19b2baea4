// Python support: version rule, build features and the built-in providers

pub mod features;
pub mod interpreter;
pub mod source;
pub mod standalone;
pub mod system;
pub mod venv;
pub mod version;

use std::path::Path;
use std::sync::Arc;

pub use features::PythonFeature;
pub use interpreter::{abi_id, probe_interpreter, InterpreterInfo};
pub use source::SourceBuildProvider;
pub use standalone::StandaloneProvider;
pub use system::SystemProvider;
pub use venv::{create_virtualenv, VirtualEnv};

use super::{Language, Provider, ProviderRegistry};
use crate::error::Result;
use crate::platform::PlatformId;

pub const CPYTHON: &str = "cpython";
pub const PYPY: &str = "pypy";

/// Python providers shipped with devboot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinProvider {
    BuildFromSource,
    Prebuilt,
    System,
}

impl BuiltinProvider {
    /// Registration order
    pub const ALL: &'static [BuiltinProvider] = &[
        BuiltinProvider::BuildFromSource,
        BuiltinProvider::Prebuilt,
        BuiltinProvider::System,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinProvider::BuildFromSource => source::PROVIDER_NAME,
            BuiltinProvider::Prebuilt => standalone::PROVIDER_NAME,
            BuiltinProvider::System => system::PROVIDER_NAME,
        }
    }

    /// `host` is the platform devboot runs on
    pub fn instantiate(&self, host: &PlatformId) -> Arc<dyn Provider> {
        match self {
            BuiltinProvider::BuildFromSource => Arc::new(SourceBuildProvider::default()),
            BuiltinProvider::Prebuilt => Arc::new(StandaloneProvider),
            BuiltinProvider::System => Arc::new(SystemProvider::new(host.clone())),
        }
    }
}

pub fn builtin_providers(host: &PlatformId) -> ProviderRegistry {
    BuiltinProvider::ALL
        .iter()
        .fold(ProviderRegistry::new(Language::Python), |registry, builtin| {
            registry.with(builtin.instantiate(host))
        })
}

/// Symlink `link` to `target`
pub(crate) fn symlink_file(target: &Path, link: &Path) -> Result<()> {
    #[cfg(unix)]
    std::os::unix::fs::symlink(target, link)?;
    #[cfg(windows)]
    std::os::windows::fs::symlink_file(target, link)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registration_order() {
        let host = PlatformId::new("linux", "64", "x86_64");
        let registry = builtin_providers(&host);
        assert_eq!(
            registry.names(),
            vec!["build-from-source", "prebuilt", "system"]
        );
        for builtin in BuiltinProvider::ALL {
            assert_eq!(builtin.instantiate(&host).name(), builtin.name());
        }
    }
}
