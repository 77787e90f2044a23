//! Host-side entry point.
//!
//! [`PluginClient::launch`] starts a plugin binary, completes the handshake,
//! and connects to the announced listener. The resulting client dispenses
//! capabilities by name; the connection it owns is shared by every capability
//! dispensed from it and is torn down by [`PluginClient::kill`].

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info};

use plugin_core::{PluginError, TransportKind};

use crate::handshake::{HandshakeConfig, HandshakeLine, Network};
use crate::plugin::PluginSet;
use crate::RpcConnection;

/// Default time a plugin has to print its handshake line.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(10);

/// How to launch and talk to one plugin binary.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub handshake: HandshakeConfig,
    pub plugins: PluginSet,
    pub command: PathBuf,
    pub args: Vec<String>,
    pub start_timeout: Duration,
}

impl ClientConfig {
    /// Launch settings for `command` with no arguments and the default start timeout.
    pub fn new(
        handshake: HandshakeConfig,
        plugins: PluginSet,
        command: impl Into<PathBuf>,
    ) -> Self {
        Self {
            handshake,
            plugins,
            command: command.into(),
            args: Vec::new(),
            start_timeout: DEFAULT_START_TIMEOUT,
        }
    }

    /// Arguments passed to the plugin command.
    #[must_use]
    pub fn with_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Time the plugin has to print its handshake line.
    #[must_use]
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }
}

// ---------------------------------------------------------------------------

/// A connected plugin.
#[derive(Debug)]
pub struct PluginClient {
    connection: RpcConnection,
    transport: TransportKind,
    plugins: PluginSet,
    child: Option<Child>,
}

impl PluginClient {
    /// Launches the plugin process, performs the handshake, and connects.
    ///
    /// The child is killed if any step after spawning fails.
    pub async fn launch(config: ClientConfig) -> Result<Self, PluginError> {
        let plugin = config.command.display().to_string();
        let mut child = Command::new(&config.command)
            .args(&config.args)
            .env(
                &config.handshake.magic_cookie_key,
                &config.handshake.magic_cookie_value,
            )
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PluginError::Launch { source })?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr, plugin.clone()));
        }
        let stdout = child.stdout.take().ok_or_else(|| PluginError::Handshake {
            message: "plugin stdout was not captured".into(),
        })?;
        let mut stdout = BufReader::new(stdout).lines();

        let line = match tokio::time::timeout(config.start_timeout, stdout.next_line()).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => {
                return Err(PluginError::Handshake {
                    message: "plugin exited before completing the handshake".into(),
                })
            }
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => {
                return Err(PluginError::Handshake {
                    message: format!(
                        "timed out after {:?} waiting for the handshake line",
                        config.start_timeout
                    ),
                })
            }
        };
        debug!(%plugin, handshake = %line, "received handshake");

        let handshake: HandshakeLine = line.parse()?;
        let transport = handshake.negotiate(&config.handshake)?;
        let connection = connect(&handshake).await?;

        // Keep stdout drained so the plugin never blocks writing to it.
        let stdout_plugin = plugin.clone();
        tokio::spawn(async move {
            while let Ok(Some(line)) = stdout.next_line().await {
                debug!(plugin = %stdout_plugin, %line, "plugin stdout");
            }
        });

        info!(%plugin, %transport, address = %handshake.address, "connected to plugin");
        Ok(Self {
            connection,
            transport,
            plugins: config.plugins,
            child: Some(child),
        })
    }

    /// Wraps an already-open connection (e.g. to an in-process server).
    pub fn from_connection(
        connection: RpcConnection,
        transport: TransportKind,
        plugins: PluginSet,
    ) -> Self {
        Self {
            connection,
            transport,
            plugins,
            child: None,
        }
    }

    /// Returns the negotiated transport.
    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Returns the shared connection to the plugin.
    pub fn connection(&self) -> &RpcConnection {
        &self.connection
    }

    /// Constructs the capability registered under `name` and downcasts it to `T`.
    pub fn dispense<T: 'static>(&self, name: &str) -> Result<T, PluginError> {
        self.plugins
            .dispense(name, self.transport, self.connection.clone())
    }

    /// Closes the connection and terminates the plugin process.
    pub async fn kill(mut self) -> Result<(), PluginError> {
        self.connection.close();
        if let Some(mut child) = self.child.take() {
            child.kill().await?;
            debug!(status = ?child.try_wait()?, "plugin process terminated");
        }
        Ok(())
    }
}

async fn connect(handshake: &HandshakeLine) -> Result<RpcConnection, PluginError> {
    match handshake.network {
        #[cfg(unix)]
        Network::Unix => {
            let stream = tokio::net::UnixStream::connect(&handshake.address).await?;
            Ok(RpcConnection::spawn(stream))
        }
        #[cfg(not(unix))]
        Network::Unix => Err(PluginError::Handshake {
            message: "unix sockets are not supported on this platform".into(),
        }),
        Network::Tcp => {
            let stream = tokio::net::TcpStream::connect(handshake.address.as_str()).await?;
            stream.set_nodelay(true)?;
            Ok(RpcConnection::spawn(stream))
        }
    }
}

/// Re-emits every line the plugin writes to stderr as a host log event.
async fn forward_stderr<R>(stderr: R, plugin: String)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!(target: "plugin_stderr", %plugin, "{line}");
    }
    debug!(%plugin, "plugin stderr closed");
}
