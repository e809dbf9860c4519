// External tool plumbing
//
// Every process the converter starts goes through `ToolRunner`:
// - commands: command builders and captured output
// - runner: the tokio-based implementation with bounded waits
// - toolchain: tool paths and the executable self-test

pub mod commands;
pub mod runner;
pub mod toolchain;

use async_trait::async_trait;

pub use commands::*;
pub use runner::*;
pub use toolchain::*;

use crate::error::Result;

/// Runs external tools
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the command to completion within its timeout, capturing both streams.
    ///
    /// A non-zero exit is still `Ok`; callers decide what it means. Errors are
    /// reserved for a missing executable, a timeout, or an I/O failure.
    async fn run(&self, command: &MediaCommand) -> Result<ToolOutput>;
}
