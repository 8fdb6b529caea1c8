//! One-shot subprocess exchange shared by the exec and shell stores.

use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::StoreError;

/// Spawn `command`, feed it `input` on stdin and collect its output.
///
/// The child is killed if it outlives `timeout`.
pub(crate) async fn exchange(
    mut command: Command,
    input: Vec<u8>,
    timeout: Duration,
) -> Result<Output, StoreError> {
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let program = command.as_std().get_program().to_string_lossy().into_owned();
    let mut child = command
        .spawn()
        .map_err(|e| StoreError::Unavailable(format!("spawning {program}: {e}")))?;

    let run = async move {
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&input)
                .await
                .map_err(|e| StoreError::Plugin(format!("writing to {program}: {e}")))?;
        }
        child
            .wait_with_output()
            .await
            .map_err(|e| StoreError::Plugin(format!("waiting for {program}: {e}")))
    };

    tokio::time::timeout(timeout, run)
        .await
        .map_err(|_| StoreError::Unavailable(format!("plugin timed out after {}s", timeout.as_secs())))?
}

/// Trimmed stderr, or the exit status when stderr is empty.
pub(crate) fn failure_detail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        output.status.to_string()
    } else {
        stderr
    }
}
