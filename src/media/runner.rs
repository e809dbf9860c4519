use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{ConverterError, Result};
use super::{MediaCommand, ToolOutput, ToolRunner};

/// Spawns real processes through tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, command: &MediaCommand) -> Result<ToolOutput> {
        debug!("Executing {}: {}", command.description, command);

        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // dropping the wait future on timeout kills the child
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => ConverterError::ToolNotFound(command.program.clone()),
                _ => ConverterError::Io(e),
            })?;

        match timeout(command.timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = ToolOutput::from(output?);
                debug!("{} finished with {:?}", command.description, output.code);
                Ok(output)
            }
            Err(_) => Err(ConverterError::ToolTimeout {
                description: command.description.clone(),
                after: command.timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_missing_executable_is_reported_distinctly() {
        let cmd = MediaCommand::new(
            "/definitely/not/here/lame",
            "Encoder",
            Duration::from_secs(5),
        );

        let err = ProcessRunner::new().run(&cmd).await.unwrap_err();
        assert!(matches!(err, ConverterError::ToolNotFound(ref p) if p == "/definitely/not/here/lame"));
        assert_eq!(err.to_string(), "Executable not found: /definitely/not/here/lame");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_exit_code_and_streams() {
        let cmd = MediaCommand::new("sh", "Shell", Duration::from_secs(5))
            .arg("-c")
            .arg("echo out; echo err >&2; exit 3");

        let output = ProcessRunner::new().run(&cmd).await.unwrap();
        assert_eq!(output.code, Some(3));
        assert!(!output.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let cmd = MediaCommand::new("sh", "Sleeper", Duration::from_millis(200))
            .arg("-c")
            .arg("sleep 5");

        let started = std::time::Instant::now();
        let err = ProcessRunner::new().run(&cmd).await.unwrap_err();
        assert!(matches!(err, ConverterError::ToolTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
