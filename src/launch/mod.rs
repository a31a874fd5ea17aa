//! Connect to a running PyMOL, or start one and wait for its socket.
//!
//! Architecture:
//! ```text
//! probe ──ok──────────────────────────────→ (connection, None)
//!   │
//!   └─miss→ locate → spawn → poll ──ok────→ (connection, Some(process))
//!                              └─deadline─→ LaunchTimeout
//! ```

mod discovery;
mod spawner;

use std::{path::Path, time::Duration};

use tokio::time::{sleep, timeout, Instant};

pub use discovery::{find_in_path, Discovery, LaunchCommand};
pub use spawner::DetachedSpawner;

use crate::{
    bridge::{Connection, Endpoint},
    error::BridgeError,
};

/// Opens one connection attempt bounded by a timeout.
pub trait Connector {
    type Conn;

    async fn connect(&self, limit: Duration) -> Result<Self::Conn, BridgeError>;
}

/// Resolves how to start PyMOL.
pub trait Locator {
    async fn locate(&self) -> Result<LaunchCommand, BridgeError>;
}

/// Starts PyMOL without waiting for it to become ready.
pub trait Spawner {
    type Process: SpawnedProcess;

    fn spawn(&self, command: &LaunchCommand, file: Option<&Path>)
        -> Result<Self::Process, BridgeError>;
}

/// A process started by a [`Spawner`]. Owned by the caller once returned.
pub trait SpawnedProcess {
    fn id(&self) -> Option<u32>;
    fn is_running(&mut self) -> bool;
}

impl Connector for Endpoint {
    type Conn = Connection;

    async fn connect(&self, limit: Duration) -> Result<Connection, BridgeError> {
        let mut connection = Connection::new(self.clone());
        connection.connect(limit).await?;
        Ok(connection)
    }
}

/// Timing for the initial probe and the post-spawn poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchPolicy {
    pub probe_timeout: Duration,
    pub attempt_timeout: Duration,
    pub poll_interval: Duration,
    pub deadline: Duration,
}

/// Result of [`Launcher::connect_or_launch`].
///
/// `process` is set only when this call started PyMOL.
pub struct Launched<C, P> {
    pub connection: C,
    pub process: Option<P>,
}

pub struct Launcher<C, L, S> {
    connector: C,
    locator: L,
    spawner: S,
    policy: LaunchPolicy,
}

impl<C, L, S> Launcher<C, L, S>
where
    C: Connector,
    L: Locator,
    S: Spawner,
{
    pub const fn new(connector: C, locator: L, spawner: S, policy: LaunchPolicy) -> Self {
        Self {
            connector,
            locator,
            spawner,
            policy,
        }
    }

    /// Reuse a live instance if one answers the probe, otherwise start one.
    pub async fn connect_or_launch(
        &self,
        file: Option<&Path>,
    ) -> Result<Launched<C::Conn, S::Process>, BridgeError> {
        match self.connector.connect(self.policy.probe_timeout).await {
            Ok(connection) => {
                tracing::info!("Reusing running PyMOL instance");
                return Ok(Launched {
                    connection,
                    process: None,
                });
            }
            Err(e) if e.is_connect() => {
                tracing::debug!("Probe missed, launching PyMOL: {e}");
            }
            Err(e) => return Err(e),
        }

        let command = self.locator.locate().await?;
        let mut process = self.spawner.spawn(&command, file)?;
        let connection = self.poll(&mut process).await?;

        Ok(Launched {
            connection,
            process: Some(process),
        })
    }

    /// Retry connecting until the deadline. The process is never killed.
    async fn poll(&self, process: &mut S::Process) -> Result<C::Conn, BridgeError> {
        let started = Instant::now();
        let deadline = started + self.policy.deadline;
        let mut attempts = 0u32;
        let mut exit_reported = false;

        loop {
            attempts += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let limit = self.policy.attempt_timeout.min(remaining);

            // The connector honours `limit` itself; the outer timeout bounds a
            // connector that does not.
            let attempt = timeout(limit, self.connector.connect(limit)).await;
            match attempt {
                Ok(Ok(connection)) => {
                    tracing::info!(
                        "PyMOL reachable after {attempts} attempts ({:.1}s)",
                        started.elapsed().as_secs_f64()
                    );
                    return Ok(connection);
                }
                Ok(Err(e)) if !e.is_connect() => return Err(e),
                Ok(Err(e)) => tracing::debug!("Attempt {attempts} missed: {e}"),
                Err(_) => tracing::debug!("Attempt {attempts} timed out after {limit:?}"),
            }

            if !exit_reported && !process.is_running() {
                exit_reported = true;
                tracing::warn!(
                    "Launcher process {:?} exited before PyMOL opened its socket; still waiting",
                    process.id()
                );
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(BridgeError::LaunchTimeout {
                    pid: process.id(),
                    waited: started.elapsed(),
                    attempts,
                });
            }
            sleep(self.policy.poll_interval.min(remaining)).await;
        }
    }
}
