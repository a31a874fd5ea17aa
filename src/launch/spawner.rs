//! Starting PyMOL as a detached process.

use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
    process::Stdio,
};

use tokio::process::{Child, Command};

use super::{discovery::LaunchCommand, SpawnedProcess, Spawner};
use crate::error::BridgeError;

const LOG_FILE: &str = "pymol.log";

/// Spawns PyMOL without waiting for it, sending its output to a log file.
#[derive(Debug, Clone)]
pub struct DetachedSpawner {
    log_dir: PathBuf,
}

impl DetachedSpawner {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(LOG_FILE)
    }

    fn open_log(&self) -> Option<File> {
        fs::create_dir_all(&self.log_dir).ok()?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())
            .ok()
    }

    fn output_sink(&self) -> (Stdio, Stdio) {
        let Some(file) = self.open_log() else {
            return (Stdio::inherit(), Stdio::inherit());
        };
        match file.try_clone() {
            Ok(copy) => (Stdio::from(file), Stdio::from(copy)),
            Err(_) => (Stdio::from(file), Stdio::inherit()),
        }
    }
}

impl Spawner for DetachedSpawner {
    type Process = ViewerProcess;

    fn spawn(
        &self,
        command: &LaunchCommand,
        file: Option<&Path>,
    ) -> Result<ViewerProcess, BridgeError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        if let Some(file) = file {
            cmd.arg(file);
        }

        // Ctrl-C in the calling terminal must not take PyMOL down with it.
        #[cfg(unix)]
        cmd.process_group(0);

        let (stdout, stderr) = self.output_sink();
        let child = cmd
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| BridgeError::Spawn {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            "Started `{command}` (pid {:?}), output in {}",
            child.id(),
            self.log_path().display()
        );
        Ok(ViewerProcess { child })
    }
}

/// Handle to a PyMOL process started by [`DetachedSpawner`].
///
/// Dropping the handle leaves the process running.
#[derive(Debug)]
pub struct ViewerProcess {
    child: Child,
}

impl SpawnedProcess for ViewerProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_spawn_passes_file_argument_and_logs_output() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = DetachedSpawner::new(dir.path().join("logs"));
        let command = LaunchCommand {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), "echo opened \"$0\"".to_string()],
        };

        let mut process = spawner
            .spawn(&command, Some(Path::new("1ubq.pdb")))
            .unwrap();
        assert!(process.id().is_some());

        for _ in 0..100 {
            if !process.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!process.is_running());

        let log = fs::read_to_string(spawner.log_path()).unwrap();
        assert!(log.contains("opened 1ubq.pdb"));
    }

    #[tokio::test]
    async fn test_missing_program_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = DetachedSpawner::new(dir.path());
        let command = LaunchCommand::bare(dir.path().join("no-such-pymol"));

        let err = spawner.spawn(&command, None).unwrap_err();
        assert!(matches!(err, BridgeError::Spawn { .. }));
    }
}
