//! Plugin-side entry point.
//!
//! [`serve`] is what a plugin binary's `main` calls: it verifies it was
//! launched by a host, builds the RPC server from its plugin set, binds a
//! local listener, announces it, and serves connections until told to stop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use plugin_core::{PluginError, TransportKind};

use crate::handshake::{HandshakeConfig, HandshakeLine, Network, CORE_PROTOCOL_VERSION};
use crate::plugin::PluginSet;
use crate::RpcServer;

/// Everything a plugin process needs to serve its capabilities.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub handshake: HandshakeConfig,
    pub plugins: PluginSet,
    /// Directory for the Unix socket. Defaults to the system temp directory.
    pub socket_dir: Option<PathBuf>,
}

impl ServeConfig {
    /// Serve settings using the system temp directory for the socket.
    pub fn new(handshake: HandshakeConfig, plugins: PluginSet) -> Self {
        Self {
            handshake,
            plugins,
            socket_dir: None,
        }
    }

    /// Places the Unix socket in `dir` instead.
    #[must_use]
    pub fn with_socket_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.socket_dir = Some(dir.into());
        self
    }
}

/// Serves `config.plugins`, announcing the listener on stdout.
pub async fn serve(config: ServeConfig, shutdown: CancellationToken) -> Result<(), PluginError> {
    serve_with_announcer(config, shutdown, tokio::io::stdout()).await
}

/// Like [`serve`], but writes the handshake line to `announcer`.
pub async fn serve_with_announcer<W>(
    config: ServeConfig,
    shutdown: CancellationToken,
    mut announcer: W,
) -> Result<(), PluginError>
where
    W: AsyncWrite + Unpin,
{
    config.handshake.verify_environment()?;
    let server = Arc::new(config.plugins.build_server(TransportKind::Rpc)?);
    let listener = Listener::bind(config.socket_dir.as_deref()).await?;

    let line = HandshakeLine {
        core_version: CORE_PROTOCOL_VERSION,
        app_version: config.handshake.protocol_version,
        network: listener.network(),
        address: listener.address()?,
        transport: TransportKind::Rpc,
    };
    announcer.write_all(format!("{line}\n").as_bytes()).await?;
    announcer.flush().await?;
    info!(network = %line.network, address = %line.address, "plugin listening");

    let result = accept_loop(&listener, server, &shutdown).await;
    listener.cleanup();
    info!("plugin stopped serving");
    result
}

async fn accept_loop(
    listener: &Listener,
    server: Arc<RpcServer>,
    shutdown: &CancellationToken,
) -> Result<(), PluginError> {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            accepted = listener.accept() => match accepted? {
                #[cfg(unix)]
                Accepted::Unix(stream) => spawn_connection(&server, stream, shutdown),
                Accepted::Tcp(stream) => spawn_connection(&server, stream, shutdown),
            },
        }
    }
}

fn spawn_connection<S>(server: &Arc<RpcServer>, stream: S, shutdown: &CancellationToken)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let server = Arc::clone(server);
    let shutdown = shutdown.clone();
    debug!("accepted host connection");
    tokio::spawn(async move {
        if let Err(err) = server.serve_connection(stream, shutdown).await {
            warn!(error = %err, "host connection failed");
        }
    });
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

enum Listener {
    #[cfg(unix)]
    Unix {
        listener: tokio::net::UnixListener,
        path: PathBuf,
    },
    #[cfg_attr(unix, allow(dead_code))]
    Tcp(tokio::net::TcpListener),
}

enum Accepted {
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
    #[cfg_attr(unix, allow(dead_code))]
    Tcp(tokio::net::TcpStream),
}

impl Listener {
    #[cfg(unix)]
    async fn bind(socket_dir: Option<&Path>) -> Result<Self, PluginError> {
        let dir = socket_dir.map_or_else(std::env::temp_dir, Path::to_path_buf);
        let path = dir.join(format!("plugin-{}.sock", uuid::Uuid::new_v4().simple()));
        let listener = tokio::net::UnixListener::bind(&path)?;
        Ok(Listener::Unix { listener, path })
    }

    #[cfg(not(unix))]
    async fn bind(_socket_dir: Option<&Path>) -> Result<Self, PluginError> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await?;
        Ok(Listener::Tcp(listener))
    }

    fn network(&self) -> Network {
        match self {
            #[cfg(unix)]
            Listener::Unix { .. } => Network::Unix,
            Listener::Tcp(_) => Network::Tcp,
        }
    }

    fn address(&self) -> Result<String, PluginError> {
        match self {
            #[cfg(unix)]
            Listener::Unix { path, .. } => Ok(path.display().to_string()),
            Listener::Tcp(listener) => Ok(listener.local_addr()?.to_string()),
        }
    }

    async fn accept(&self) -> Result<Accepted, PluginError> {
        match self {
            #[cfg(unix)]
            Listener::Unix { listener, .. } => {
                let (stream, _) = listener.accept().await?;
                Ok(Accepted::Unix(stream))
            }
            Listener::Tcp(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok(Accepted::Tcp(stream))
            }
        }
    }

    fn cleanup(&self) {
        #[cfg(unix)]
        {
            if let Listener::Unix { path, .. } = self {
                if let Err(err) = std::fs::remove_file(path) {
                    warn!(path = %path.display(), error = %err, "failed to remove plugin socket");
                }
            }
        }
    }
}
