//! stdio helpers for subprocess providers.

use indexmap::IndexMap;
use std::path::PathBuf;
use tokio::process::Command;

/// Build a configured `tokio::process::Command` for the subprocess transport.
pub(crate) fn build_stdio_command(
    command: &str,
    args: &[String],
    env: &IndexMap<String, String>,
    cwd: Option<&PathBuf>,
) -> Command {
    let mut cmd = Command::new(command);
    cmd.args(args);
    for (key, value) in env {
        cmd.env(key, value);
    }
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    cmd.kill_on_drop(true);
    cmd
}
