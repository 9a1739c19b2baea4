// Virtual environment creation on top of a resolved interpreter

use std::path::{Path, PathBuf};

use super::Session;
use crate::error::Result;
use crate::language::python::{create_virtualenv, VirtualEnv};
use crate::language::InstallOutcome;

#[derive(Debug, Clone)]
pub struct VenvConfig {
    pub descriptor: String,
    pub dest: PathBuf,
    pub requirements: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct VenvResult {
    pub interpreter: InstallOutcome,
    pub venv: VirtualEnv,
}

pub async fn execute_venv_command(session: &Session, config: &VenvConfig) -> Result<VenvResult> {
    let definition = session.definition(&config.descriptor)?;
    let interpreter = session
        .resolver()
        .install(&definition, session.ctx.platform())
        .await?;

    let project_dir = &session.ctx.config().project_dir;
    let dest = anchor(project_dir, &config.dest);
    let requirements: Vec<PathBuf> = config
        .requirements
        .iter()
        .map(|path| anchor(project_dir, path))
        .collect();

    let venv = create_virtualenv(
        session.ctx.process(),
        &interpreter.installation().executable(),
        &dest,
        &requirements,
    )
    .await?;

    Ok(VenvResult { interpreter, venv })
}

fn anchor(project_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_project_relative() {
        assert_eq!(
            anchor(Path::new("/work"), Path::new(".venv")),
            PathBuf::from("/work/.venv")
        );
        assert_eq!(
            anchor(Path::new("/work"), Path::new("/tmp/env")),
            PathBuf::from("/tmp/env")
        );
    }
}
