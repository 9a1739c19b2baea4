// Interpreter introspection and ABI identifiers

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::version;
use crate::error::{DevbootError, ProcessError, ResolutionError, Result};
use crate::platform::PlatformId;
use crate::process::{ProcessConfig, ProcessManager};

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

const PROBE_SCRIPT: &str = r#"
import json, sys, sysconfig

def render(info):
    text = "%d.%d.%d" % (info[0], info[1], info[2])
    if info[3] != "final":
        text += {"alpha": "a", "beta": "b", "candidate": "rc"}[info[3]] + str(info[4])
    return text

print(json.dumps({
    "implementation": sys.implementation.name,
    "version": render(sys.version_info),
    "implementation_version": render(sys.implementation.version),
    "abiflags": getattr(sys, "abiflags", ""),
    "trace_refs": hasattr(sys, "getobjects"),
    "gil_disabled": bool(sysconfig.get_config_var("Py_GIL_DISABLED")),
    "executable": sys.executable,
}))
"#;

/// What an interpreter reports about itself
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InterpreterInfo {
    pub implementation: String,
    /// Python language version
    pub version: String,
    /// Version of the implementation itself (differs for PyPy)
    pub implementation_version: String,
    #[serde(default)]
    pub abiflags: String,
    #[serde(default)]
    pub trace_refs: bool,
    #[serde(default)]
    pub gil_disabled: bool,
    pub executable: PathBuf,
}

impl InterpreterInfo {
    /// ABI-relevant build variants, sorted
    pub fn abi_extras(&self) -> Vec<&'static str> {
        let mut extras = Vec::new();
        if self.abiflags.contains('d') {
            extras.push("debug");
        }
        if self.abiflags.contains('t') || self.gil_disabled {
            extras.push("free-threading");
        }
        if self.trace_refs {
            extras.push("trace-refs");
        }
        extras.sort_unstable();
        extras
    }

    /// Whether the language version falls under `base_version`
    pub fn matches_base(&self, base_version: &str) -> bool {
        match (version::parse(base_version), version::parse(&self.version)) {
            (Ok(base), Ok(found)) => version::matches_base(&base, &found),
            _ => false,
        }
    }
}

/// `{implementation}-{major}.{minor}[-{extras}]--{platform}`
pub fn abi_id(info: &InterpreterInfo, platform: &PlatformId) -> Result<String> {
    let parsed = version::parse(&info.version)?;
    let release = parsed.release();
    if release.len() < 2 {
        return Err(DevbootError::Resolution(Box::new(
            ResolutionError::InvalidVersion {
                version: info.version.clone(),
                error: "expected at least major.minor".to_string(),
            },
        )));
    }

    let mut id = format!("{}-{}.{}", info.implementation, release[0], release[1]);
    let extras = info.abi_extras();
    if !extras.is_empty() {
        id.push('-');
        id.push_str(&extras.join("+"));
    }
    id.push_str("--");
    id.push_str(&platform.to_string());
    Ok(id)
}

/// Run an interpreter and collect its `InterpreterInfo`
pub async fn probe_interpreter(process: &ProcessManager, python: &Path) -> Result<InterpreterInfo> {
    let config = ProcessConfig::for_program(python)
        .with_args(["-c", PROBE_SCRIPT])
        .with_env("PYTHONIOENCODING", "utf-8")
        .with_timeout(PROBE_TIMEOUT);
    let command = config.display_command();
    let result = process.execute_checked(config).await?;

    serde_json::from_slice(&result.stdout).map_err(|e| {
        DevbootError::Process(Box::new(ProcessError::OutputCaptureFailed {
            message: format!("Unexpected interpreter probe output: {e}"),
            command,
        }))
    })
}
