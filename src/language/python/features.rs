// CPython build features realised through configure flags

use std::path::Path;

use super::version;
use crate::error::Result;
use crate::language::{Definition, ProviderEnvironment};
use crate::platform::PlatformId;

pub const CONFIGURE_OPTS_VAR: &str = "PYTHON_CONFIGURE_OPTS";

/// Realisable through configure flags of a source build
pub const LABEL_CONFIGURE: &str = "configure";
/// Changes the interpreter ABI
pub const LABEL_ABI: &str = "abi";

const MEMORY_INSTRUMENTATION: &str = "memory-instrumentation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PythonFeature {
    Debug,
    TraceRefs,
    Valgrind,
    AddressSanitizer,
    FreeThreading,
}

impl PythonFeature {
    pub const ALL: &'static [PythonFeature] = &[
        PythonFeature::Debug,
        PythonFeature::TraceRefs,
        PythonFeature::Valgrind,
        PythonFeature::AddressSanitizer,
        PythonFeature::FreeThreading,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PythonFeature::Debug => "debug",
            PythonFeature::TraceRefs => "trace-refs",
            PythonFeature::Valgrind => "valgrind",
            PythonFeature::AddressSanitizer => "address-sanitizer",
            PythonFeature::FreeThreading => "free-threading",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    pub fn compatibility_labels(&self) -> &'static [&'static str] {
        match self {
            PythonFeature::Debug | PythonFeature::TraceRefs | PythonFeature::FreeThreading => {
                &[LABEL_CONFIGURE, LABEL_ABI]
            }
            PythonFeature::Valgrind | PythonFeature::AddressSanitizer => &[LABEL_CONFIGURE],
        }
    }

    pub fn mutex_labels(&self) -> &'static [&'static str] {
        match self {
            PythonFeature::Valgrind | PythonFeature::AddressSanitizer => &[MEMORY_INSTRUMENTATION],
            _ => &[],
        }
    }

    fn configure_flag(&self) -> &'static str {
        match self {
            PythonFeature::Debug => "--with-pydebug",
            PythonFeature::TraceRefs => "--with-trace-refs",
            PythonFeature::Valgrind => "--with-valgrind",
            PythonFeature::AddressSanitizer => "--with-address-sanitizer",
            PythonFeature::FreeThreading => "--disable-gil",
        }
    }

    /// Lowest base version carrying the configure flag
    fn minimum_base(&self) -> Option<&'static str> {
        match self {
            PythonFeature::TraceRefs => Some("3.8"),
            PythonFeature::FreeThreading => Some("3.13"),
            _ => None,
        }
    }

    pub fn check_descriptor_support(&self, definition: &Definition, platform: &PlatformId) -> bool {
        if definition.implementation != super::CPYTHON {
            return false;
        }
        if *self == PythonFeature::Valgrind && !platform.is_linux() {
            return false;
        }
        match self.minimum_base() {
            Some(minimum) => matches!(
                version::compare(&definition.base_version, minimum),
                Ok(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
            ),
            None => true,
        }
    }

    pub fn modify_provider_environment(&self, env: &mut ProviderEnvironment) {
        env.append_flag(CONFIGURE_OPTS_VAR, self.configure_flag());
        if *self == PythonFeature::AddressSanitizer {
            // The build's own test run trips LeakSanitizer otherwise
            env.set("ASAN_OPTIONS", "detect_leaks=0");
        }
    }

    pub fn modify_installation(&self, location: &Path) -> Result<()> {
        if *self == PythonFeature::FreeThreading {
            link_free_threaded_python(location)?;
        }
        Ok(())
    }
}

/// Free-threaded builds install `python3.Xt`; point `bin/python` at it.
fn link_free_threaded_python(location: &Path) -> Result<()> {
    let bin = location.join("bin");
    let link = bin.join("python");
    if link.exists() || !bin.is_dir() {
        return Ok(());
    }

    let target = std::fs::read_dir(&bin)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| {
            name.strip_prefix("python3.")
                .and_then(|rest| rest.strip_suffix('t'))
                .map_or(false, |minor| minor.chars().all(|c| c.is_ascii_digit()))
        })
        .max();

    if let Some(target) = target {
        super::symlink_file(Path::new(&target), &link)?;
    }
    Ok(())
}
