use std::{error::Error as StdError, fmt, io, path::PathBuf, result::Result as StdResult, time::Duration};

/// Why a connection attempt did not produce a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectFailure {
    /// Nothing accepted the connection (refused, unreachable, unresolvable).
    Refused(String),
    /// The attempt did not complete within its timeout.
    TimedOut(Duration),
}

#[derive(Debug, Clone)]
pub enum BridgeError {
    Connect {
        addr: String,
        reason: ConnectFailure,
    },
    NotConnected,
    InvalidRequest(String),
    Communication(String),
    Remote {
        message: String,
    },
    NotInstalled {
        searched: Vec<String>,
    },
    Spawn {
        command: String,
        reason: String,
    },
    LaunchTimeout {
        pid: Option<u32>,
        waited: Duration,
        attempts: u32,
    },
    PluginMissing {
        path: PathBuf,
    },
}

impl BridgeError {
    /// True for the "nobody is listening" family, which the launcher treats
    /// as a cue to start the viewer.
    pub const fn is_connect(&self) -> bool {
        matches!(self, Self::Connect { .. })
    }

    pub(crate) fn communication(context: &str, cause: impl fmt::Display) -> Self {
        Self::Communication(format!("{context}: {cause}"))
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect {
                addr,
                reason: ConnectFailure::Refused(cause),
            } => write!(f, "Cannot connect to PyMOL at {addr}: {cause}"),
            Self::Connect {
                addr,
                reason: ConnectFailure::TimedOut(after),
            } => write!(
                f,
                "Cannot connect to PyMOL at {addr}: timed out after {:.1}s",
                after.as_secs_f64()
            ),
            Self::NotConnected => write!(f, "Not connected to PyMOL"),
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {msg}"),
            Self::Communication(msg) => write!(f, "Lost connection to PyMOL: {msg}"),
            Self::Remote { message } => write!(f, "PyMOL error: {message}"),
            Self::NotInstalled { searched } => {
                writeln!(f, "PyMOL not found.")?;
                writeln!(f)?;
                writeln!(f, "Install PyMOL with one of:")?;
                writeln!(f, "  - pip install pymol-open-source-whl")?;
                writeln!(f, "  - brew install pymol (macOS)")?;
                writeln!(f, "  - Download from https://pymol.org")?;
                writeln!(f)?;
                writeln!(f, "Searched locations:")?;
                for path in searched {
                    writeln!(f, "  - {path}")?;
                }
                Ok(())
            }
            Self::Spawn { command, reason } => {
                writeln!(f, "Failed to start PyMOL with `{command}`")?;
                writeln!(f)?;
                write!(f, "Reason: {reason}")
            }
            Self::LaunchTimeout {
                pid,
                waited,
                attempts,
            } => {
                write!(
                    f,
                    "PyMOL did not open its socket within {:.1}s ({attempts} attempts)",
                    waited.as_secs_f64()
                )?;
                if let Some(pid) = pid {
                    write!(f, "; process {pid} was left running")?;
                }
                write!(f, ". Is the socket plugin loaded? Run: molbridge setup")
            }
            Self::PluginMissing { path } => write!(
                f,
                "Socket plugin not found at {}\n\
                 Copy claude_socket_plugin.py there, or point setup at it:\n  \
                 molbridge setup --plugin /path/to/claude_socket_plugin.py",
                path.display()
            ),
        }
    }
}

impl StdError for BridgeError {}

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Json(serde_json::Error),
    Bridge(BridgeError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {e}"),
            Self::Json(e) => write!(f, "JSON error: {e}"),
            Self::Bridge(e) => write!(f, "{e}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Bridge(e) => Some(e),
        }
    }
}

impl From<BridgeError> for Error {
    fn from(e: BridgeError) -> Self {
        Self::Bridge(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

pub type Result<T> = StdResult<T, Error>;
