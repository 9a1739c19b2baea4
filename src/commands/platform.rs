// Platform and ABI identifiers

use std::path::{Path, PathBuf};

use crate::context::Context;
use crate::error::{DevbootError, ProcessError, Result};
use crate::language::python::{abi_id, probe_interpreter};
use crate::process::find_program;

pub fn execute_platform_command(ctx: &Context) -> String {
    ctx.platform().to_string()
}

/// ABI identifier of `interpreter`, or of the first `python3` on PATH
pub async fn execute_abi_command(ctx: &Context, interpreter: Option<&Path>) -> Result<String> {
    let python = match interpreter {
        Some(path) => path.to_path_buf(),
        None => default_interpreter()?,
    };
    let info = probe_interpreter(ctx.process(), &python).await?;
    abi_id(&info, ctx.platform())
}

fn default_interpreter() -> Result<PathBuf> {
    find_program("python3")
        .or_else(|_| find_program("python"))
        .map_err(|_| {
            DevbootError::Process(Box::new(ProcessError::CommandNotFound {
                command: "python3".to_string(),
                suggestion: Some(
                    "Pass --interpreter with the path to a Python executable".to_string(),
                ),
            }))
        })
}
