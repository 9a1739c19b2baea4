// Virtual environments on top of a resolved installation

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::Result;
use crate::process::{ProcessConfig, ProcessManager};

const VENV_TIMEOUT: Duration = Duration::from_secs(120);
const PIP_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const PYVENV_CFG: &str = "pyvenv.cfg";

/// A created virtual environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualEnv {
    pub path: PathBuf,
    pub python: PathBuf,
}

impl VirtualEnv {
    pub fn at(path: PathBuf) -> Self {
        let python = if cfg!(windows) {
            path.join("Scripts").join("python.exe")
        } else {
            path.join("bin").join("python")
        };
        Self { path, python }
    }

    pub fn exists(&self) -> bool {
        self.path.join(PYVENV_CFG).is_file()
    }
}

/// Create (or refresh) a virtual environment at `dest` and install requirements into it.
///
/// An existing directory is reused only when it already holds a virtual
/// environment; any other non-empty directory is left alone.
pub async fn create_virtualenv(
    process: &ProcessManager,
    interpreter: &Path,
    dest: &Path,
    requirements: &[PathBuf],
) -> Result<VirtualEnv> {
    let venv = VirtualEnv::at(dest.to_path_buf());

    if dest.is_dir() && !venv.exists() && dest.read_dir()?.next().is_some() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!(
                "{} exists and is not a virtual environment",
                dest.display()
            ),
        )
        .into());
    }

    info!(
        interpreter = %interpreter.display(),
        dest = %dest.display(),
        "Creating virtual environment"
    );
    let create = ProcessConfig::for_program(interpreter)
        .with_args([
            std::ffi::OsString::from("-m"),
            "venv".into(),
            dest.as_os_str().to_os_string(),
        ])
        .with_timeout(VENV_TIMEOUT);
    process.execute_checked(create).await?;

    for requirement in requirements {
        info!(requirements = %requirement.display(), "Installing requirements");
        let install = ProcessConfig::for_program(&venv.python)
            .with_args([
                std::ffi::OsString::from("-m"),
                "pip".into(),
                "install".into(),
                "-r".into(),
                requirement.as_os_str().to_os_string(),
            ])
            .with_env("PIP_DISABLE_PIP_VERSION_CHECK", "1")
            .with_timeout(PIP_TIMEOUT);
        process.execute_checked(install).await?;
    }

    Ok(venv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DevbootError;
    use tempfile::TempDir;

    #[test]
    fn test_venv_layout() {
        let venv = VirtualEnv::at(PathBuf::from("/work/.venv"));
        if cfg!(windows) {
            assert!(venv.python.ends_with("Scripts/python.exe"));
        } else {
            assert_eq!(venv.python, PathBuf::from("/work/.venv/bin/python"));
        }
        assert!(!venv.exists());
    }

    #[tokio::test]
    async fn test_refuses_foreign_directory() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("notes.txt"), "keep me").unwrap();

        let error = create_virtualenv(
            &ProcessManager::new(),
            Path::new("/nonexistent/python"),
            temp.path(),
            &[],
        )
        .await
        .unwrap_err();

        match error {
            DevbootError::Io(io) => assert_eq!(io.kind(), std::io::ErrorKind::AlreadyExists),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(temp.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_missing_interpreter_reported() {
        let temp = TempDir::new().unwrap();
        let result = create_virtualenv(
            &ProcessManager::new(),
            Path::new("/nonexistent/python"),
            &temp.path().join("venv"),
            &[],
        )
        .await;
        assert!(result.is_err());
    }
}
