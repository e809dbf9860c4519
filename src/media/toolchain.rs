use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{ConverterError, Result};
use super::{MediaCommand, ToolRunner};

/// The three external programs a conversion needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toolchain {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub lame: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
    Lame,
}

impl Tool {
    pub const ALL: [Tool; 3] = [Tool::Ffmpeg, Tool::Ffprobe, Tool::Lame];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
            Tool::Lame => "lame",
        }
    }

    /// Flag that makes the tool print something and exit 0
    fn self_test_flag(&self) -> &'static str {
        match self {
            Tool::Ffmpeg | Tool::Ffprobe => "-version",
            Tool::Lame => "--help",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Self-test result for one tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCheck {
    pub tool: Tool,
    pub path: String,
    /// Why the tool is unusable, `None` when it passed
    pub problem: Option<String>,
}

impl ToolCheck {
    pub fn is_ok(&self) -> bool {
        self.problem.is_none()
    }
}

impl Toolchain {
    pub fn path(&self, tool: Tool) -> &str {
        match tool {
            Tool::Ffmpeg => &self.ffmpeg,
            Tool::Ffprobe => &self.ffprobe,
            Tool::Lame => &self.lame,
        }
    }

    /// Run every tool with its version/help flag
    pub async fn self_test(&self, runner: &dyn ToolRunner, wait: Duration) -> Vec<ToolCheck> {
        let mut checks = Vec::with_capacity(Tool::ALL.len());

        for tool in Tool::ALL {
            let path = self.path(tool).to_string();
            let command = MediaCommand::new(&path, format!("{} self-test", tool), wait)
                .arg(tool.self_test_flag());

            let problem = match runner.run(&command).await {
                Ok(output) if output.success() => None,
                Ok(output) => Some(output.diagnostic()),
                Err(e) => Some(e.to_string()),
            };

            match &problem {
                None => info!("{} is available at {}", tool, path),
                Some(reason) => warn!("{} self-test failed ({}): {}", tool, path, reason),
            }

            checks.push(ToolCheck { tool, path, problem });
        }

        checks
    }

    /// Fail with the first unusable tool
    pub async fn verify(&self, runner: &dyn ToolRunner, wait: Duration) -> Result<()> {
        let checks = self.self_test(runner, wait).await;
        match checks.into_iter().find(|check| !check.is_ok()) {
            Some(ToolCheck { tool, path, problem }) => Err(ConverterError::ToolUnavailable {
                tool: format!("{} ({})", tool, path),
                reason: problem.unwrap_or_default(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MockToolRunner, ToolOutput};
    use std::ffi::OsString;

    fn toolchain() -> Toolchain {
        Toolchain {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            lame: "/opt/lame".to_string(),
        }
    }

    #[tokio::test]
    async fn test_all_tools_pass() {
        let mut runner = MockToolRunner::new();
        runner
            .expect_run()
            .times(3)
            .returning(|_| Ok(ToolOutput { code: Some(0), ..Default::default() }));

        let checks = toolchain().self_test(&runner, Duration::from_secs(1)).await;
        assert_eq!(checks.len(), 3);
        assert!(checks.iter().all(ToolCheck::is_ok));
        tokio_test::assert_ok!(toolchain().verify(&runner, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_self_test_flags_and_failures() {
        let mut runner = MockToolRunner::new();
        runner
            .expect_run()
            .withf(|cmd| cmd.program == "/opt/lame")
            .returning(|cmd| {
                assert_eq!(cmd.args, [OsString::from("--help")]);
                Err(ConverterError::ToolNotFound(cmd.program.clone()))
            });
        runner
            .expect_run()
            .withf(|cmd| cmd.program != "/opt/lame")
            .returning(|cmd| {
                assert_eq!(cmd.args, [OsString::from("-version")]);
                Ok(ToolOutput { code: Some(0), ..Default::default() })
            });

        let checks = toolchain().self_test(&runner, Duration::from_secs(1)).await;
        let lame = checks.iter().find(|c| c.tool == Tool::Lame).unwrap();
        assert_eq!(lame.problem.as_deref(), Some("Executable not found: /opt/lame"));

        let err = toolchain().verify(&runner, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ConverterError::ToolUnavailable { ref tool, .. } if tool.starts_with("lame")));
    }
}
