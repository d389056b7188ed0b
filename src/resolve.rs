//! which: locate the executable for a command.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{trace, warn};

use crate::error::ExecError;
use crate::Result;

/// Suffixes tried after each command name on the current platform.
pub fn default_extensions() -> Vec<String> {
    if cfg!(windows) {
        ["", ".exe", ".bat", ".cmd"].map(String::from).to_vec()
    } else {
        vec![String::new()]
    }
}

/// Directories from the host `PATH` variable, in order.
pub fn system_paths() -> Vec<PathBuf> {
    env::var_os("PATH")
        .map(|p| env::split_paths(&p).collect())
        .unwrap_or_default()
}

/// Resolves command names against search directories and suffixes.
///
/// Results are computed from the filesystem on every call; nothing is
/// cached.
#[derive(Debug, Clone)]
pub struct PathResolver {
    paths: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::from_env()
    }
}

impl PathResolver {
    /// Create a resolver with explicit directories and suffixes.
    pub fn new(paths: Vec<PathBuf>, extensions: Vec<String>) -> Self {
        Self { paths, extensions }
    }

    /// Resolver seeded from `PATH` with the platform default suffixes.
    pub fn from_env() -> Self {
        Self::new(system_paths(), default_extensions())
    }

    /// Search directories in order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Suffix candidates in order.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Insert directories ahead of the existing ones.
    pub fn prepend_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut front: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        front.append(&mut self.paths);
        self.paths = front;
        self
    }

    /// Replace the suffix candidates.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Find the executable for `command`.
    ///
    /// A command that already names an existing file is returned as is,
    /// without an executable check. Otherwise every directory is tried in
    /// order and, within a directory, every suffix in order; the first
    /// executable match wins. Matches that exist but are not executable are
    /// skipped with a warning.
    pub fn find(&self, command: impl AsRef<Path>) -> Option<PathBuf> {
        let command = command.as_ref();
        if command.as_os_str().is_empty() {
            return None;
        }

        if command.exists() {
            return Some(command.to_path_buf());
        }

        for dir in &self.paths {
            for ext in &self.extensions {
                let mut name = command.as_os_str().to_os_string();
                name.push(ext);
                let candidate = dir.join(name);

                trace!("Trying file: {}", candidate.display());
                if candidate.exists() {
                    if is_executable(&candidate) {
                        return Some(candidate);
                    }
                    warn!(
                        "Command '{}' found but it isn't executable! (continuing search...)",
                        candidate.display()
                    );
                }
            }
        }

        None
    }

    /// Like [`find`](Self::find), but a missing command is an error.
    pub fn require(&self, command: impl AsRef<Path>) -> Result<PathBuf> {
        let command = command.as_ref();
        self.find(command).ok_or_else(|| {
            ExecError::config(format!(
                "command '{}' not found in search path",
                command.display()
            ))
        })
    }
}

/// Resolve `command` against `PATH` with the platform default suffixes.
pub fn which(command: impl AsRef<Path>) -> Option<PathBuf> {
    PathResolver::from_env().find(command)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}
