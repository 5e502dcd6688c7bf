//! Lifecycle of an external code-execution gateway process.
//!
//! The gateway is started with a free port and a generated auth token, and
//! is considered ready once it prints its readiness line on stderr. The
//! child is killed when the handle is dropped; [`GatewayProcess::stop`] may
//! be called any number of times.

use std::net::TcpListener;
use std::process::Stdio;
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;

use crate::error::ConfabError;

/// Line fragment a kernel gateway prints once it is serving.
pub const READY_MARKER: &str = "is available at";

/// How to launch the gateway.
///
/// `{ip}`, `{port}` and `{token}` in `args` are substituted at start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub program: String,
    pub args: Vec<String>,
    pub ip: String,
    /// `None` picks a free port.
    pub port: Option<u16>,
    /// `None` generates a random token.
    pub token: Option<String>,
    pub ready_marker: String,
    #[serde(with = "millis")]
    pub startup_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::kernel_gateway()
    }
}

impl GatewayConfig {
    /// Jupyter kernel gateway launched through the `python` on `PATH`.
    pub fn kernel_gateway() -> Self {
        let args = [
            "-m",
            "jupyter",
            "kernelgateway",
            "--KernelGatewayApp.ip",
            "{ip}",
            "--KernelGatewayApp.port",
            "{port}",
            "--KernelGatewayApp.auth_token",
            "{token}",
            "--JupyterApp.answer_yes",
            "true",
            "--JupyterWebsocketPersonality.list_kernels",
            "true",
        ];
        Self {
            program: "python".into(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            ip: "127.0.0.1".into(),
            port: None,
            token: None,
            ready_marker: READY_MARKER.into(),
            startup_timeout: Duration::from_secs(60),
        }
    }
}

/// Where and how to reach a running gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConnection {
    pub host: String,
    pub port: u16,
    pub token: String,
    pub use_https: bool,
}

impl GatewayConnection {
    pub fn base_url(&self) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// Handle to a running gateway process.
pub struct GatewayProcess {
    child: Option<Child>,
    connection: GatewayConnection,
    stderr_drain: Option<JoinHandle<()>>,
}

impl GatewayProcess {
    /// Spawn the gateway and wait until it reports readiness.
    pub async fn start(config: GatewayConfig) -> Result<Self, ConfabError> {
        let port = match config.port {
            Some(port) => port,
            None => free_port()?,
        };
        let token = config.token.clone().unwrap_or_else(generate_token);
        let port_arg = port.to_string();
        let args: Vec<String> = config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{ip}", &config.ip)
                    .replace("{port}", &port_arg)
                    .replace("{token}", &token)
            })
            .collect();

        tracing::info!(program = %config.program, port, "starting gateway");
        let mut child = Command::new(&config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConfabError::Process(format!("failed to spawn {}: {e}", config.program)))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ConfabError::Process("gateway stderr was not captured".into()))?;
        let mut lines = BufReader::new(stderr).lines();

        let ready = tokio::time::timeout(
            config.startup_timeout,
            wait_for_marker(&mut lines, &config.ready_marker),
        )
        .await;
        let failure = match ready {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(error),
            Err(_) => Some(ConfabError::Process(format!(
                "gateway not ready after {}ms",
                config.startup_timeout.as_millis()
            ))),
        };
        if let Some(error) = failure {
            let _ = child.kill().await;
            return Err(error);
        }
        if let Some(status) = child.try_wait()? {
            return Err(ConfabError::Process(format!("gateway exited right after start: {status}")));
        }

        // Keep reading so the child never blocks on a full stderr pipe.
        let stderr_drain = tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::trace!(%line, "gateway stderr");
            }
        });

        tracing::info!(port, "gateway ready");
        Ok(Self {
            child: Some(child),
            connection: GatewayConnection {
                host: config.ip,
                port,
                token,
                use_https: false,
            },
            stderr_drain: Some(stderr_drain),
        })
    }

    pub fn connection(&self) -> &GatewayConnection {
        &self.connection
    }

    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Stop the gateway. Safe to call repeatedly.
    pub async fn stop(&mut self) -> Result<(), ConfabError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if child.try_wait()?.is_none() {
            child.kill().await?;
        }
        if let Some(drain) = self.stderr_drain.take() {
            drain.abort();
        }
        tracing::info!(port = self.connection.port, "gateway stopped");
        Ok(())
    }
}

impl Drop for GatewayProcess {
    fn drop(&mut self) {
        if let Some(drain) = self.stderr_drain.take() {
            drain.abort();
        }
    }
}

async fn wait_for_marker(lines: &mut Lines<BufReader<ChildStderr>>, marker: &str) -> Result<(), ConfabError> {
    while let Some(line) = lines.next_line().await? {
        tracing::debug!(%line, "gateway stderr");
        if line.contains(marker) {
            return Ok(());
        }
    }
    Err(ConfabError::Process("gateway exited before becoming ready".into()))
}

fn free_port() -> Result<u16, ConfabError> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(43)
        .map(char::from)
        .collect()
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
