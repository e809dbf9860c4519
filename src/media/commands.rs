use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::process::Output;
use std::time::Duration;

use crate::config::{Bitrate, ToolTimeouts};
use crate::error::{ConverterError, Result};
use super::Toolchain;

/// Abstract external tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCommand {
    pub program: String,
    /// Kept as OS strings so non-UTF-8 file names reach the tool untouched
    pub args: Vec<OsString>,
    pub description: String,
    /// Bounded wait before the child is killed
    pub timeout: Duration,
}

impl MediaCommand {
    /// Create a new command
    pub fn new<S1: Into<String>, S2: Into<String>>(
        program: S1,
        description: S2,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            description: description.into(),
            timeout,
        }
    }

    /// Add an argument
    pub fn arg<S: Into<OsString>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").path(path)
    }

    /// Add a bare path argument (output files, lame's positional input)
    pub fn path<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().as_os_str())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Set container format
    pub fn format<S: Into<OsString>>(self, format: S) -> Self {
        self.arg("-f").arg(format)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<OsString>>(self, codec: S) -> Self {
        self.arg("-acodec").arg(codec)
    }
}

impl fmt::Display for MediaCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Captured result of a finished tool invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` when the process was terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit status followed by whatever each stream printed
    pub fn diagnostic(&self) -> String {
        let mut text = match self.code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        };

        for (label, stream) in [("stdout", &self.stdout), ("stderr", &self.stderr)] {
            let stream = stream.trim();
            if !stream.is_empty() {
                text.push_str(&format!("\n{}: {}", label, stream));
            }
        }

        text
    }

    /// Turn a non-zero exit into [`ConverterError::ToolFailed`]
    pub fn into_result(self, description: &str) -> Result<ToolOutput> {
        if self.success() {
            Ok(self)
        } else {
            Err(ConverterError::ToolFailed {
                description: description.to_string(),
                diagnostic: self.diagnostic(),
            })
        }
    }
}

impl From<Output> for ToolOutput {
    fn from(output: Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Builder for the invocations the converter makes
#[derive(Debug, Clone)]
pub struct MediaCommandBuilder {
    tools: Toolchain,
    timeouts: ToolTimeouts,
}

impl MediaCommandBuilder {
    pub fn new(tools: Toolchain, timeouts: ToolTimeouts) -> Self {
        Self { tools, timeouts }
    }

    /// `ffprobe -v quiet -print_format json -show_format <source>`
    pub fn probe<P: AsRef<Path>>(&self, source: P) -> MediaCommand {
        MediaCommand::new(&self.tools.ffprobe, "Metadata probe", self.timeouts.probe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .path(source)
    }

    /// `ffmpeg -y -i <source> -f wav -acodec pcm_s16le <intermediate>`
    pub fn decode<P: AsRef<Path>, Q: AsRef<Path>>(&self, source: P, intermediate: Q) -> MediaCommand {
        MediaCommand::new(&self.tools.ffmpeg, "Decoder", self.timeouts.decode)
            .overwrite()
            .input(source)
            .format("wav")
            .audio_codec("pcm_s16le")
            .path(intermediate)
    }

    /// `lame -b <kbps> <intermediate> <output>`
    pub fn encode<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        intermediate: P,
        output: Q,
        bitrate: Bitrate,
    ) -> MediaCommand {
        MediaCommand::new(&self.tools.lame, "Encoder", self.timeouts.encode)
            .arg("-b")
            .arg(bitrate.as_str())
            .path(intermediate)
            .path(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    fn builder() -> MediaCommandBuilder {
        MediaCommandBuilder::new(
            Toolchain {
                ffmpeg: "/usr/bin/ffmpeg".to_string(),
                ffprobe: "/usr/bin/ffprobe".to_string(),
                lame: "/usr/bin/lame".to_string(),
            },
            ToolTimeouts::default(),
        )
    }

    #[test]
    fn test_decode_command_line() {
        let cmd = builder().decode("/music/a.flac", "/tmp/x.wav");
        assert_eq!(
            cmd.to_string(),
            "/usr/bin/ffmpeg -y -i /music/a.flac -f wav -acodec pcm_s16le /tmp/x.wav"
        );
        assert_eq!(cmd.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_encode_command_line() {
        let cmd = builder().encode("/tmp/x.wav", "/out/A - B.mp3", Bitrate::Kbps192);
        assert_eq!(cmd.program, "/usr/bin/lame");
        assert_eq!(cmd.args, vec!["-b", "192", "/tmp/x.wav", "/out/A - B.mp3"]);
    }

    #[test]
    fn test_probe_command_line() {
        let cmd = builder().probe("/music/a.flac");
        assert_eq!(
            cmd.to_string(),
            "/usr/bin/ffprobe -v quiet -print_format json -show_format /music/a.flac"
        );
        assert_eq!(cmd.timeout, Duration::from_secs(30));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_paths_are_passed_through() {
        use std::os::unix::ffi::OsStrExt;

        let source = Path::new(OsStr::from_bytes(b"/music/caf\xe9.flac"));
        let cmd = builder().decode(source, "/tmp/x.wav");
        assert_eq!(cmd.args[2].as_os_str(), source.as_os_str());
        assert!(cmd.to_string().contains("caf\u{FFFD}.flac"));

        let cmd = builder().encode("/tmp/x.wav", source.with_extension("mp3"), Bitrate::Kbps320);
        assert_eq!(cmd.args[3].as_bytes(), b"/music/caf\xe9.mp3");
    }

    #[test]
    fn test_diagnostic_includes_both_streams() {
        let output = ToolOutput {
            code: Some(1),
            stdout: "partial\n".to_string(),
            stderr: "Invalid data found when processing input\n".to_string(),
        };

        let diagnostic = output.diagnostic();
        assert!(diagnostic.starts_with("exit status 1"));
        assert!(diagnostic.contains("stdout: partial"));
        assert!(diagnostic.contains("stderr: Invalid data found"));

        let err = output.into_result("Decoder").unwrap_err();
        assert!(err.to_string().starts_with("Decoder failed: exit status 1"));
    }
}
