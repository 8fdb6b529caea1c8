//! Exec store: one subprocess per request, JSON over stdio.
//!
//! ```text
//! stdin : {"action":"set","key":"<40 hex>","value":"<envelope>"}
//! stdout: {"success":true}
//! stdin : {"action":"get","key":"<40 hex>"}
//! stdout: {"success":true,"value":"<envelope>"} | {"success":false,"error":"..."}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use super::process::{exchange, failure_detail};
use super::{Store, StoreError};

#[derive(Debug, Serialize)]
struct Request<'a> {
    action: &'a str,
    key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct Response {
    success: bool,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Store backed by an external program.
#[derive(Debug, Clone)]
pub struct ExecStore {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ExecStore {
    /// Store running `command args...` for every request.
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }

    async fn call(&self, request: Request<'_>) -> Result<Response, StoreError> {
        let input = serde_json::to_vec(&request).map_err(|e| StoreError::Plugin(e.to_string()))?;
        let mut command = Command::new(&self.command);
        command.args(&self.args);

        debug!(command = %self.command, action = request.action, key = request.key, "exec store request");
        let output = exchange(command, input, self.timeout).await?;
        if !output.status.success() {
            return Err(StoreError::Unavailable(failure_detail(&output)));
        }

        let response: Response = serde_json::from_slice(&output.stdout).map_err(|e| {
            StoreError::Plugin(format!("{}: unparseable reply: {e}", self.command))
        })?;
        if !response.success {
            return Err(StoreError::Unavailable(
                response.error.unwrap_or_else(|| "plugin reported failure".into()),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl Store for ExecStore {
    async fn get(&self, key: &str) -> Result<String, StoreError> {
        let response = self
            .call(Request {
                action: "get",
                key,
                value: None,
            })
            .await?;
        match response.value {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.call(Request {
            action: "set",
            key,
            value: Some(value),
        })
        .await
        .map(|_| ())
    }
}
