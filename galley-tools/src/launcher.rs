//! [`ToolLauncher`] renders the configured command templates and runs them
//! through the platform shell.

use std::process::{Command, ExitStatus};

use tera::Tera;

use crate::context::{DiffToolPaths, MergeToolPaths};
use crate::error::ToolError;

const MERGE_TEMPLATE: &str = "merge_tool";
const DIFF_TEMPLATE: &str = "diff_tool";

/// Outcome of one external tool invocation.
#[derive(Debug, Clone)]
pub struct ToolRun {
    pub command: String,
    pub status: ExitStatus,
}

/// Holds the compiled merge and diff command templates.
///
/// Templates are parsed once in [`ToolLauncher::new`], so a malformed
/// template is reported before any staged file is touched.
pub struct ToolLauncher {
    tera: Tera,
}

impl ToolLauncher {
    pub fn new(merge_template: &str, diff_template: &str) -> Result<Self, ToolError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (MERGE_TEMPLATE, merge_template),
            (DIFF_TEMPLATE, diff_template),
        ])?;
        Ok(Self { tera })
    }

    /// Render the merge command for the staged variants.
    pub fn render_merge(&self, paths: &MergeToolPaths) -> Result<String, ToolError> {
        let command = self.tera.render(MERGE_TEMPLATE, &paths.to_tera_context()?)?;
        non_empty(command, "merge")
    }

    /// Render the diff command for a local file and its remote copy.
    pub fn render_diff(&self, paths: &DiffToolPaths) -> Result<String, ToolError> {
        let command = self.tera.render(DIFF_TEMPLATE, &paths.to_tera_context()?)?;
        non_empty(command, "diff")
    }

    pub fn run_merge(&self, paths: &MergeToolPaths) -> Result<ToolRun, ToolError> {
        let command = self.render_merge(paths)?;
        run_shell(command)
    }

    pub fn run_diff(&self, paths: &DiffToolPaths) -> Result<ToolRun, ToolError> {
        let command = self.render_diff(paths)?;
        run_shell(command)
    }
}

fn non_empty(command: String, tool: &'static str) -> Result<String, ToolError> {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return Err(ToolError::EmptyCommand { tool });
    }
    Ok(trimmed.to_string())
}

/// Run `command` through `sh -c` (`cmd /C` on Windows), inheriting stdio.
///
/// A non-zero exit is not an error: diff tools exit 1 when files differ.
fn run_shell(command: String) -> Result<ToolRun, ToolError> {
    tracing::info!("executing: {command}");
    let mut shell = shell_command(&command);
    let status = match shell.status() {
        Ok(status) => status,
        Err(source) => return Err(ToolError::Launch { command, source }),
    };
    if !status.success() {
        tracing::debug!("`{command}` exited with {status}");
    }
    Ok(ToolRun { command, status })
}

#[cfg(not(windows))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
