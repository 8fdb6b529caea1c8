//! Shell store: a configured script run by `/bin/sh`.
//!
//! The request is passed as exported variables prepended to the script on
//! stdin, so the script needs no argument parsing:
//!
//! ```sh
//! STUNMESH_ACTION='set'
//! STUNMESH_KEY='37b7dcf2...'
//! STUNMESH_VALUE='91b30de0...'
//! export STUNMESH_ACTION STUNMESH_KEY STUNMESH_VALUE
//! <script>
//! ```
//!
//! Exit status 0 means success; on `get`, stdout is the value.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::process::{exchange, failure_detail};
use super::{Store, StoreError};

/// Shell used to run scripts.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Store backed by a shell script.
#[derive(Debug, Clone)]
pub struct ShellStore {
    shell: String,
    script: String,
    timeout: Duration,
}

/// Single-quote `value` for POSIX sh.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

impl ShellStore {
    /// Store running `script` with [`DEFAULT_SHELL`].
    pub fn new(script: impl Into<String>, timeout: Duration) -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            script: script.into(),
            timeout,
        }
    }

    fn render(&self, action: &str, key: &str, value: &str) -> String {
        format!(
            "STUNMESH_ACTION={}\nSTUNMESH_KEY={}\nSTUNMESH_VALUE={}\nexport STUNMESH_ACTION STUNMESH_KEY STUNMESH_VALUE\n{}\n",
            quote(action),
            quote(key),
            quote(value),
            self.script
        )
    }

    async fn run(&self, action: &str, key: &str, value: &str) -> Result<String, StoreError> {
        debug!(action, key, "shell store request");
        let input = self.render(action, key, value).into_bytes();
        let output = exchange(Command::new(&self.shell), input, self.timeout).await?;
        if !output.status.success() {
            return Err(StoreError::Unavailable(failure_detail(&output)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl Store for ShellStore {
    async fn get(&self, key: &str) -> Result<String, StoreError> {
        let value = self.run("get", key, "").await?;
        if value.is_empty() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.run("set", key, value).await.map(|_| ())
    }
}
