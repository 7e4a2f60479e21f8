//! Locating the external binaries the playback core drives.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::debug;

use crate::{Error, Result};

/// Get the path for the tool `name`.
///
/// A copy bundled in the project cache directory wins; otherwise the bare
/// name is returned and resolved through `PATH` when spawned.
pub fn locate(name: &str) -> PathBuf {
    directories::ProjectDirs::from("", "", "opendj")
        .map(|dirs| dirs.cache_dir().join(name))
        .filter(|path| path.is_file())
        .unwrap_or_else(|| PathBuf::from(name))
}

/// Run `tool version_flag` and fail with [`Error::ToolMissing`] unless it
/// exits successfully.
pub async fn check(tool: &Path, version_flag: &str) -> Result<()> {
    let output = Command::new(tool)
        .arg(version_flag)
        .output()
        .await
        .map_err(|e| Error::ToolMissing(format!("{}: {e}", tool.display())))?;

    if !output.status.success() {
        return Err(Error::ToolMissing(format!(
            "{} exited with {}",
            tool.display(),
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    debug!(
        "{} available: {}",
        tool.display(),
        stdout.lines().next().unwrap_or_default()
    );
    Ok(())
}

/// First non-empty line of a tool's diagnostic output.
pub fn first_line(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("Unknown error")
        .to_string()
}
