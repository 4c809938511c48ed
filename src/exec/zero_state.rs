// src/exec/zero_state.rs

use std::path::Path;

use tracing::info;

use crate::errors::{BatchError, Result};
use crate::exec::process::{diagnostic, render_command, run_shell};
use crate::types::BoxFuture;

/// Writes a zero-valued copy of a routing state file.
pub trait ZeroStateWriter: Send + Sync {
    /// Read `template` and write the same structure with every discharge
    /// value set to zero at `dest`. `dest` may already exist and is replaced.
    fn write_zero_state<'a>(&'a self, template: &'a Path, dest: &'a Path)
    -> BoxFuture<'a, Result<()>>;
}

/// Shell-command implementation, `ncap2` by default.
#[derive(Debug, Clone)]
pub struct CommandZeroState {
    cmd: String,
}

impl CommandZeroState {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }
}

impl ZeroStateWriter for CommandZeroState {
    fn write_zero_state<'a>(
        &'a self,
        template: &'a Path,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let cmd = render_command(
                &self.cmd,
                &[
                    ("src", template.display().to_string()),
                    ("dest", dest.display().to_string()),
                ],
            );
            let output = run_shell(&cmd).await?;
            if !output.status.success() {
                return Err(BatchError::Compute {
                    unit: dest.display().to_string(),
                    diagnostic: format!("zero-state command failed: {}", diagnostic(&output)),
                });
            }
            info!(template = %template.display(), dest = %dest.display(), "wrote zero-valued state");
            Ok(())
        })
    }
}
