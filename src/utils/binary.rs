//! Simulation program resolution and validation.
//!
//! The configured program is either an explicit path or a bare command name
//! looked up on `PATH`, mirroring how a shell would find it.

use std::env;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Errors that can occur while resolving the simulation program
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Program not found: {path}")]
    NotFound { path: String },

    #[error("Program is not executable: {path}")]
    NotExecutable { path: String },

    #[error("Cannot determine home directory")]
    NoHomeDir,

    #[error("Program name is empty")]
    Empty,
}

fn home_dir() -> Result<PathBuf, CommandError> {
    env::var("HOME").map(PathBuf::from).map_err(|_| CommandError::NoHomeDir)
}

/// Resolve the program to run.
///
/// - Contains `/` or starts with `~`: explicit path, `~` expanded, relative
///   paths taken from `working_dir`.
/// - Otherwise: first executable match on `PATH`.
///
/// ```ignore
/// resolve_program("./waf", Path::new("/opt/ns-3")) -> /opt/ns-3/./waf
/// resolve_program("~/bin/sim", ..)                 -> /home/user/bin/sim
/// resolve_program("sh", ..)                        -> /bin/sh
/// ```
pub fn resolve_program(name_or_path: &str, working_dir: &Path) -> Result<PathBuf, CommandError> {
    if name_or_path.is_empty() {
        return Err(CommandError::Empty);
    }

    if let Some(rest) = name_or_path.strip_prefix("~/") {
        return Ok(home_dir()?.join(rest));
    }
    if name_or_path.contains('/') {
        let path = PathBuf::from(name_or_path);
        return Ok(if path.is_absolute() { path } else { working_dir.join(path) });
    }

    let search = env::var_os("PATH").unwrap_or_default();
    env::split_paths(&search)
        .map(|dir| dir.join(name_or_path))
        .find(|candidate| validate_program(candidate).is_ok())
        .ok_or_else(|| CommandError::NotFound {
            path: name_or_path.to_string(),
        })
}

/// Check that a program exists and has an execute bit set
pub fn validate_program(path: &Path) -> Result<(), CommandError> {
    let metadata = path.metadata().map_err(|_| CommandError::NotFound {
        path: path.display().to_string(),
    })?;

    if !metadata.is_file() || metadata.permissions().mode() & 0o111 == 0 {
        return Err(CommandError::NotExecutable {
            path: path.display().to_string(),
        });
    }

    Ok(())
}

/// Resolve and validate in one step
pub fn validate_program_spec(
    name_or_path: &str,
    working_dir: &Path,
) -> Result<PathBuf, CommandError> {
    let resolved = resolve_program(name_or_path, working_dir)?;
    validate_program(&resolved)?;
    Ok(resolved)
}
