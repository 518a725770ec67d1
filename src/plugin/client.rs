use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use hyper_util::rt::TokioIo;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

use super::handshake::{self, Handshake, Network};
use super::proto::{ControllerClient, ProviderClient};
use super::{GrpcProvider, PluginError};

const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(60);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Identifies a provider plugin binary on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMeta {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub start_timeout: Duration,
    pub min_port: u16,
    pub max_port: u16,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            start_timeout: DEFAULT_START_TIMEOUT,
            min_port: handshake::DEFAULT_MIN_PORT,
            max_port: handshake::DEFAULT_MAX_PORT,
        }
    }
}

/// A running plugin process and the gRPC channel to it.
///
/// The child process is killed when the client is dropped.
#[derive(Debug)]
pub struct PluginClient {
    meta: PluginMeta,
    child: Child,
    channel: Channel,
}

impl PluginClient {
    /// Spawns the plugin, waits for its handshake and connects to it.
    pub async fn start(meta: &PluginMeta, options: &LaunchOptions) -> Result<Self, PluginError> {
        let mut child = spawn(meta, options)?;
        tracing::debug!(
            plugin = %meta.name,
            version = %meta.version,
            path = %meta.path.display(),
            pid = child.id(),
            "plugin started"
        );

        if let Some(stderr) = child.stderr.take() {
            forward_output(meta.name.clone(), "stderr", stderr);
        }
        let stdout = child.stdout.take().ok_or(PluginError::ExitedEarly)?;

        let handshake = match tokio::time::timeout(
            options.start_timeout,
            read_handshake(meta.name.clone(), stdout),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                let _ = child.kill().await;
                return Err(PluginError::StartTimeout);
            }
        };
        let handshake = match handshake {
            Ok(hs) => hs,
            Err(e) => {
                let _ = child.kill().await;
                return Err(e);
            }
        };

        tracing::debug!(
            plugin = %meta.name,
            network = %handshake.network,
            address = %handshake.address,
            "plugin handshake complete"
        );

        if handshake.server_cert.is_some() {
            let _ = child.kill().await;
            return Err(PluginError::Handshake {
                line: handshake.address.clone(),
                reason: "plugin requested AutoMTLS, which this host does not negotiate"
                    .to_string(),
            });
        }

        let channel = match connect(&handshake).await {
            Ok(channel) => channel,
            Err(e) => {
                let _ = child.kill().await;
                return Err(e);
            }
        };

        Ok(Self {
            meta: meta.clone(),
            child,
            channel,
        })
    }

    /// Dispenses the provider implementation served by this plugin.
    pub fn provider(&self) -> GrpcProvider {
        GrpcProvider::new(ProviderClient::new(self.channel.clone()))
    }

    /// Asks the plugin to exit, then kills the process.
    pub async fn kill(mut self) {
        let mut controller = ControllerClient::new(self.channel.clone());
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, controller.shutdown()).await {
            Ok(Ok(())) => tracing::debug!(plugin = %self.meta.name, "plugin shutdown requested"),
            Ok(Err(status)) => {
                tracing::debug!(plugin = %self.meta.name, error = %status, "graceful shutdown failed")
            }
            Err(_) => tracing::debug!(plugin = %self.meta.name, "graceful shutdown timed out"),
        }

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => tracing::debug!(plugin = %self.meta.name, %status, "plugin exited"),
            _ => {
                if let Err(e) = self.child.kill().await {
                    tracing::warn!(plugin = %self.meta.name, error = %e, "failed to kill plugin");
                }
            }
        }
    }
}

fn spawn(meta: &PluginMeta, options: &LaunchOptions) -> Result<Child, PluginError> {
    let mut command = Command::new(&meta.path);
    command
        .envs(handshake::plugin_env(options.min_port, options.max_port))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    command.spawn().map_err(|source| PluginError::Spawn {
        path: display_path(&meta.path),
        source,
    })
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

/// Reads the first stdout line as the handshake; the rest of stdout is
/// forwarded to debug logs.
async fn read_handshake<R>(plugin: String, stdout: R) -> Result<Handshake, PluginError>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(stdout).lines();
    let line = lines.next_line().await?.ok_or(PluginError::ExitedEarly)?;
    let handshake = line.parse::<Handshake>()?;

    tokio::spawn(async move {
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(plugin = %plugin, stream = "stdout", "{}", line);
        }
    });

    Ok(handshake)
}

fn forward_output<R>(plugin: String, stream: &'static str, output: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(output).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(plugin = %plugin, stream, "{}", line);
        }
    });
}

async fn connect(handshake: &Handshake) -> Result<Channel, PluginError> {
    let address = handshake.address.clone();
    let connect_err = |source| PluginError::Connect {
        address: handshake.address.clone(),
        source,
    };

    match handshake.network {
        Network::Tcp => {
            let endpoint =
                Endpoint::from_shared(format!("http://{}", address)).map_err(connect_err)?;
            endpoint.connect().await.map_err(connect_err)
        }
        Network::Unix => {
            // The URI is required by the endpoint but ignored by the connector.
            let endpoint = Endpoint::from_static("http://[::]:50051");
            endpoint
                .connect_with_connector(service_fn(move |_: Uri| {
                    let path = address.clone();
                    async move {
                        let stream = UnixStream::connect(path).await?;
                        Ok::<_, std::io::Error>(TokioIo::new(stream))
                    }
                }))
                .await
                .map_err(connect_err)
        }
    }
}
