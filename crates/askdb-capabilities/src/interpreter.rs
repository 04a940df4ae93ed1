//! Analysis-script execution in a Python subprocess.
//!
//! Scripts are written to a scratch file and run with the configured
//! interpreter under a timeout and the session's cancellation token.
//! A non-zero exit becomes a normal capability failure carrying the
//! captured stderr.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use askdb_core::descriptor::{CapabilityDescriptor, ParameterSchema};
use askdb_core::outcome::{CapabilityPayload, FailureKind};
use askdb_core::text::strip_code_fence;

use crate::errors::CapabilityError;
use crate::traits::{require_str, Capability, InvocationContext};

/// The `run_python` capability.
pub struct RunPython {
    python_bin: String,
    timeout_ms: u64,
}

impl RunPython {
    /// Create the capability for the given interpreter binary.
    #[must_use]
    pub fn new(python_bin: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            python_bin: python_bin.into(),
            timeout_ms,
        }
    }
}

#[async_trait]
impl Capability for RunPython {
    fn name(&self) -> &str {
        "run_python"
    }

    fn failure_kind(&self) -> FailureKind {
        FailureKind::Code
    }

    fn timeout_ms(&self) -> Option<u64> {
        Some(self.timeout_ms)
    }

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: "run_python".into(),
            description: "Run a Python script for post-processing previously \
                          fetched data. The script must print its result to stdout."
                .into(),
            parameters: ParameterSchema::object(&[(
                "code",
                "string",
                "The Python script to execute",
            )]),
        }
    }

    #[instrument(skip_all, fields(request_id = %ctx.request_id))]
    async fn invoke(
        &self,
        arguments: &Map<String, Value>,
        ctx: &InvocationContext,
    ) -> Result<CapabilityPayload, CapabilityError> {
        let code = strip_code_fence(require_str(arguments, "code")?);
        if code.is_empty() {
            return Err(CapabilityError::Validation {
                message: "code is empty".into(),
            });
        }

        let script = tempfile::Builder::new()
            .prefix("askdb-script-")
            .suffix(".py")
            .tempfile()?;
        std::fs::write(script.path(), code)?;

        let start = Instant::now();
        let mut cmd = tokio::process::Command::new(&self.python_bin);
        let _ = cmd
            .arg(script.path())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        debug!(python = %self.python_bin, "spawning analysis script");
        let child = cmd.spawn().map_err(|e| CapabilityError::Process {
            message: format!("failed to spawn {}: {e}", self.python_bin),
        })?;

        let timeout = Duration::from_millis(self.timeout_ms);
        let output = tokio::select! {
            result = child.wait_with_output() => {
                result.map_err(|e| CapabilityError::Process {
                    message: format!("process wait failed: {e}"),
                })?
            }
            () = tokio::time::sleep(timeout) => {
                warn!(timeout_ms = self.timeout_ms, "analysis script timed out");
                return Err(CapabilityError::Timeout {
                    timeout_ms: self.timeout_ms,
                });
            }
            () = ctx.cancellation.cancelled() => {
                debug!("analysis script cancelled");
                return Err(CapabilityError::Cancelled);
            }
        };

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        debug!(exit_code = output.status.code(), duration_ms, "script completed");
        metrics::histogram!("askdb_script_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        if !output.status.success() {
            return Err(CapabilityError::Process {
                message: if stderr.trim().is_empty() {
                    format!("exit code {}", output.status.code().unwrap_or(-1))
                } else {
                    stderr.trim().to_string()
                },
            });
        }

        Ok(CapabilityPayload::ProcessOutput { stdout })
    }
}
