//! Runtime settings passed explicitly into the connection and launcher.

use std::{path::PathBuf, time::Duration};

use crate::{
    bridge::{Endpoint, DEFAULT_PORT},
    launch::LaunchPolicy,
};

const STATE_DIR: &str = ".molbridge";
const PLUGIN_FILE: &str = "claude_socket_plugin.py";

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Single attempt used to detect an already running instance.
    pub probe_timeout: Duration,
    /// Per-attempt limit while waiting for a freshly spawned instance.
    pub attempt_timeout: Duration,
    pub poll_interval: Duration,
    /// Total time allowed for a spawned instance to open its socket.
    pub launch_deadline: Duration,
    pub exec_timeout: Duration,
    /// User home directory; all per-user paths hang off it.
    pub home: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            probe_timeout: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(500),
            launch_deadline: Duration::from_secs(15),
            exec_timeout: Duration::from_secs(120),
            home: dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

impl Settings {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port).with_exec_timeout(self.exec_timeout)
    }

    pub const fn launch_policy(&self) -> LaunchPolicy {
        LaunchPolicy {
            probe_timeout: self.probe_timeout,
            attempt_timeout: self.attempt_timeout,
            poll_interval: self.poll_interval,
            deadline: self.launch_deadline,
        }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.home.join(STATE_DIR)
    }

    pub fn config_file(&self) -> PathBuf {
        self.state_dir().join("config.json")
    }

    pub fn wrapper_path(&self) -> PathBuf {
        self.state_dir().join("bin").join("molbridge")
    }

    pub fn plugin_path(&self) -> PathBuf {
        self.state_dir().join("plugin").join(PLUGIN_FILE)
    }

    pub fn pymolrc(&self) -> PathBuf {
        self.home.join(".pymolrc")
    }

    /// Directory for the spawned viewer's output.
    pub fn log_dir(&self) -> PathBuf {
        dirs::cache_dir().map_or_else(|| self.state_dir().join("logs"), |dir| dir.join("molbridge"))
    }
}
