//! Shell command used as a status probe

use std::process::Stdio;

use converge_core::poll::{BoxError, Observation, Probe, ProbeResult};
use converge_core::provider::BoxFuture;
use converge_provider_ibm::PhaseProfile;
use converge_provider_ibm::status::{ABSENT_LABEL, classify};
use serde_json::Value as JsonValue;
use tokio::process::Command;

/// Runs a command on every probe; its output is the status
///
/// Without a field the whole trimmed stdout is the status. With a field,
/// stdout is parsed as JSON and the status is read at that JSON pointer.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
    field: Option<String>,
    absent_exit_code: Option<i32>,
    phase: Option<PhaseProfile>,
}

impl CommandProbe {
    pub fn new(command: &[String]) -> Result<Self, String> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| "No probe command given".to_string())?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            field: None,
            absent_exit_code: None,
            phase: None,
        })
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Treat this exit code as "the resource does not exist"
    pub fn with_absent_exit_code(mut self, code: i32) -> Self {
        self.absent_exit_code = Some(code);
        self
    }

    /// Map raw statuses through a wait profile phase
    pub fn with_phase(mut self, phase: PhaseProfile) -> Self {
        self.phase = Some(phase);
        self
    }

    async fn run(&self) -> ProbeResult<String> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("Failed to run {}: {}", self.program, e))?;

        if let (Some(absent), Some(code)) = (self.absent_exit_code, output.status.code())
            && absent == code
        {
            return Ok(Observation::absent(ABSENT_LABEL));
        }

        if !output.status.success() {
            return Err(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )
            .into());
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let raw = self.extract(&stdout)?;
        let label = match &self.phase {
            Some(phase) => classify(phase, &raw),
            None => raw,
        };
        Ok(Observation::present(label, stdout))
    }

    fn extract(&self, stdout: &str) -> Result<String, BoxError> {
        let Some(pointer) = &self.field else {
            return Ok(stdout.to_string());
        };
        let json: JsonValue = serde_json::from_str(stdout)?;
        match json.pointer(pointer) {
            Some(JsonValue::String(s)) => Ok(s.clone()),
            Some(JsonValue::Null) | None => Err(format!("No status at '{}'", pointer).into()),
            Some(other) => Ok(other.to_string()),
        }
    }
}

impl Probe for CommandProbe {
    type Value = String;

    fn probe(&mut self) -> BoxFuture<'_, ProbeResult<String>> {
        Box::pin(self.run())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use converge_provider_ibm::resources::{Phase, profile};

    fn sh(script: &str) -> CommandProbe {
        CommandProbe::new(&["sh".to_string(), "-c".to_string(), script.to_string()]).unwrap()
    }

    #[tokio::test]
    async fn stdout_is_the_status() {
        let observation = sh("echo ' active '").probe().await.unwrap();
        assert_eq!(observation.label, "active");
        assert_eq!(observation.value.as_deref(), Some("active"));
    }

    #[tokio::test]
    async fn status_from_json_field() {
        let mut probe = sh(r#"echo '{"id": "r-1", "lifecycle": {"state": "provisioning"}}'"#)
            .with_field("/lifecycle/state");
        let observation = probe.probe().await.unwrap();
        assert_eq!(observation.label, "provisioning");
    }

    #[tokio::test]
    async fn missing_json_field_is_an_error() {
        let mut probe = sh(r#"echo '{"id": "r-1"}'"#).with_field("/status");
        let err = probe.probe().await.unwrap_err();
        assert_eq!(err.to_string(), "No status at '/status'");
    }

    #[tokio::test]
    async fn absent_exit_code() {
        let mut probe = sh("exit 3").with_absent_exit_code(3);
        let observation = probe.probe().await.unwrap();
        assert!(observation.is_absent());
        assert_eq!(observation.label, ABSENT_LABEL);
    }

    #[tokio::test]
    async fn failing_command_is_an_error() {
        let err = sh("echo boom >&2; exit 1").probe().await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn phase_fallback_applies() {
        let phase = profile("container_cluster")
            .unwrap()
            .phase(Phase::Create)
            .unwrap()
            .clone();
        let observation = sh("echo deploying").with_phase(phase).probe().await.unwrap();
        assert_eq!(observation.label, "provisioning");
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandProbe::new(&[]).is_err());
    }
}
