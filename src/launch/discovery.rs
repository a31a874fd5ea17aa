//! Locating the PyMOL executable.

use std::{
    env,
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use tokio::{process::Command, time::timeout};

use super::Locator;
use crate::error::BridgeError;

/// Environment override pointing at a PyMOL executable.
pub const PYMOL_ENV: &str = "MOLBRIDGE_PYMOL";

const PYMOL_NAME: &str = "pymol";

/// How long `python -c "import pymol"` may take before the interpreter is skipped.
const MODULE_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// A resolved way of starting PyMOL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl LaunchCommand {
    pub fn bare(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Inputs to the PyMOL search, captured up front so the search itself is pure
/// apart from filesystem checks.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub override_path: Option<PathBuf>,
    pub search_path: Option<OsString>,
    pub standard_locations: Vec<PathBuf>,
    /// Interpreter that may have the `pymol` module installed.
    pub python: Option<PathBuf>,
    pub module_check_timeout: Duration,
}

impl Default for Discovery {
    fn default() -> Self {
        Self {
            override_path: None,
            search_path: None,
            standard_locations: Vec::new(),
            python: None,
            module_check_timeout: MODULE_CHECK_TIMEOUT,
        }
    }
}

impl Discovery {
    /// Capture the search inputs from the process environment.
    pub fn from_env(home: &Path, python: Option<String>) -> Self {
        Self {
            override_path: env::var_os(PYMOL_ENV).map(PathBuf::from),
            search_path: env::var_os("PATH"),
            standard_locations: standard_locations(home),
            python: python.map(PathBuf::from),
            module_check_timeout: MODULE_CHECK_TIMEOUT,
        }
    }

    /// Find PyMOL, recording every place that was looked at.
    pub async fn find(&self) -> Result<LaunchCommand, Vec<String>> {
        let mut searched = Vec::new();

        if let Some(path) = &self.override_path {
            if is_executable(path) {
                return Ok(LaunchCommand::bare(path.clone()));
            }
            searched.push(format!("${PYMOL_ENV}={}", path.display()));
        }

        if let Some(found) = self.search_path.as_ref().and_then(|p| find_in_path(PYMOL_NAME, p)) {
            return Ok(LaunchCommand::bare(found));
        }
        searched.push(format!("{PYMOL_NAME} on $PATH"));

        for location in &self.standard_locations {
            if is_executable(location) {
                return Ok(LaunchCommand::bare(location.clone()));
            }
            searched.push(location.display().to_string());
        }

        if let Some(python) = &self.python {
            if is_executable(python) && has_pymol_module(python, self.module_check_timeout).await {
                return Ok(LaunchCommand {
                    program: python.clone(),
                    args: vec!["-m".to_string(), PYMOL_NAME.to_string()],
                });
            }
            searched.push(format!("{} -m {PYMOL_NAME}", python.display()));
        }

        Err(searched)
    }
}

impl Locator for Discovery {
    async fn locate(&self) -> Result<LaunchCommand, BridgeError> {
        let command = self
            .find()
            .await
            .map_err(|searched| BridgeError::NotInstalled { searched })?;
        tracing::debug!("Resolved PyMOL command: {command}");
        Ok(command)
    }
}

fn standard_locations(home: &Path) -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if cfg!(target_os = "macos") {
        locations.push(PathBuf::from("/Applications/PyMOL.app/Contents/MacOS/PyMOL"));
        locations.push(PathBuf::from("/opt/homebrew/bin/pymol"));
    }
    locations.push(PathBuf::from("/usr/local/bin/pymol"));
    locations.push(PathBuf::from("/usr/bin/pymol"));
    locations.push(home.join(".local/bin/pymol"));
    locations
}

/// First executable named `name` in a `PATH`-style list.
pub fn find_in_path(name: &str, search_path: &OsString) -> Option<PathBuf> {
    env::split_paths(search_path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| candidate_names(name).into_iter().map(move |n| dir.join(n)))
        .find(|candidate| is_executable(candidate))
}

fn candidate_names(name: &str) -> Vec<String> {
    if cfg!(windows) {
        vec![format!("{name}.exe"), format!("{name}.bat"), name.to_string()]
    } else {
        vec![name.to_string()]
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

async fn has_pymol_module(python: &Path, limit: Duration) -> bool {
    let check = Command::new(python)
        .args(["-c", "import pymol"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    match timeout(limit, check).await {
        Ok(status) => status.is_ok_and(|status| status.success()),
        Err(_) => {
            tracing::warn!(
                "{} did not answer the pymol import check within {limit:?}; skipping it",
                python.display()
            );
            false
        }
    }
}
