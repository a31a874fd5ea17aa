use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    time::timeout,
};
use tokio_util::codec::Framed;

use super::protocol::{JsonLines, Request, Response, DEFAULT_PORT};
use crate::error::{BridgeError, ConnectFailure};

type ClientFramed<T> = Framed<T, JsonLines<Response, Request>>;

/// Where the socket plugin listens, and how long a single `execute` may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub exec_timeout: Duration,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            exec_timeout: Duration::from_secs(120),
        }
    }

    #[must_use]
    pub fn with_exec_timeout(mut self, exec_timeout: Duration) -> Self {
        self.exec_timeout = exec_timeout;
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

/// A single client connection to the PyMOL socket plugin.
///
/// Not shared: one request is in flight at a time. The socket is owned
/// exclusively and closed on [`disconnect`](Self::disconnect), on any
/// communication failure, or when the connection is dropped.
pub struct Connection {
    endpoint: Endpoint,
    framed: Option<ClientFramed<TcpStream>>,
}

impl Connection {
    pub const fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            framed: None,
        }
    }

    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub const fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    /// Open the socket. Makes exactly one attempt bounded by `limit`.
    pub async fn connect(&mut self, limit: Duration) -> Result<(), BridgeError> {
        self.disconnect();

        let addr = self.endpoint.addr();
        let connecting = TcpStream::connect((self.endpoint.host.as_str(), self.endpoint.port));
        let stream = match timeout(limit, connecting).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::debug!("Connect to {addr} failed: {e}");
                return Err(BridgeError::Connect {
                    addr,
                    reason: ConnectFailure::Refused(e.to_string()),
                });
            }
            Err(_) => {
                tracing::debug!("Connect to {addr} timed out after {limit:?}");
                return Err(BridgeError::Connect {
                    addr,
                    reason: ConnectFailure::TimedOut(limit),
                });
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not disable Nagle on {addr}: {e}");
        }

        tracing::debug!("Connected to {addr}");
        self.framed = Some(Framed::new(stream, JsonLines::new()));
        Ok(())
    }

    /// Run `code` inside PyMOL and return its textual output.
    ///
    /// A server-side failure comes back as [`BridgeError::Remote`] and leaves
    /// the connection usable. Any transport failure drops the socket.
    pub async fn execute(&mut self, code: &str) -> Result<String, BridgeError> {
        let framed = self.framed.as_mut().ok_or(BridgeError::NotConnected)?;
        if code.trim().is_empty() {
            return Err(BridgeError::InvalidRequest("empty code".to_string()));
        }

        let request = Request::Execute {
            code: code.to_string(),
        };
        let limit = self.endpoint.exec_timeout;
        let outcome = match timeout(limit, exchange(framed, request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(BridgeError::Communication(format!(
                "no response within {:.1}s",
                limit.as_secs_f64()
            ))),
        };

        match outcome {
            Ok(Response::Success { output }) => Ok(output),
            Ok(Response::Error { error }) => Err(BridgeError::Remote { message: error }),
            Err(e) => {
                tracing::warn!("Dropping connection to {}: {e}", self.endpoint.addr());
                self.framed = None;
                Err(e)
            }
        }
    }

    /// Close the socket if open. Safe to call any number of times.
    pub fn disconnect(&mut self) {
        if self.framed.take().is_some() {
            tracing::debug!("Disconnected from {}", self.endpoint.addr());
        }
    }
}

/// Send one request and wait for exactly one response frame.
async fn exchange<T>(framed: &mut ClientFramed<T>, request: Request) -> Result<Response, BridgeError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    framed
        .send(request)
        .await
        .map_err(|e| BridgeError::communication("send failed", e))?;

    match framed.next().await {
        Some(Ok(response)) => Ok(response),
        Some(Err(e)) => Err(BridgeError::communication("bad response", e)),
        None => Err(BridgeError::Communication(
            "connection closed before a response arrived".to_string(),
        )),
    }
}
