//! Process helpers shared by the packagers

use crate::error::{StoreError, StoreResult};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Run `program` to completion, mapping a non-zero exit to its stderr
pub(crate) async fn run(program: &str, args: &[String], dir: Option<&Path>) -> StoreResult<()> {
    debug!("Executing: {} {:?}", program, args);

    let mut command = Command::new(program);
    command
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = dir {
        command.current_dir(dir);
    }

    let output = command
        .output()
        .await
        .map_err(|e| StoreError::command_failed(format!("{} {:?}", program, args), e))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(StoreError::command_exec(
            format!("{} {:?}", program, args),
            String::from_utf8_lossy(&output.stderr),
        ))
    }
}

/// Host architecture in OCI naming
pub fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    }
}
