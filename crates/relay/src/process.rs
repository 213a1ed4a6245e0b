//! Running `fenced-relay` as a child process
//!
//! Browser-driven runs need the relay reachable over HTTP from a separate
//! process. [`RelayProcess`] starts the binary on a loopback port, waits
//! until [`RelayClient::health`] answers and stops it with SIGTERM.

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::client::RelayClient;
use crate::error::{RelayError, RelayResult};

/// How long a SIGTERM'd relay gets before it is killed
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Configuration for spawning a relay
#[derive(Debug, Clone)]
pub struct RelayProcessConfig {
    /// Path to the fenced-relay binary
    pub binary_path: PathBuf,

    /// Loopback port to listen on (None = pick a free one)
    pub port: Option<u16>,

    pub value_ttl: Duration,
    pub sweep_interval: Duration,

    /// How long to wait for the first healthy response
    pub startup_timeout: Duration,

    /// Poll interval of the returned client
    pub poll_interval: Duration,
}

impl Default for RelayProcessConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("target/debug/fenced-relay"),
            port: None,
            value_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(30),
            startup_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(20),
        }
    }
}

/// A running `fenced-relay` child. Dropping it stops the relay.
pub struct RelayProcess {
    child: Child,
    client: RelayClient,
    stopped: Option<ExitStatus>,
}

impl RelayProcess {
    /// Spawn the relay and wait until it reports healthy
    pub async fn spawn(config: RelayProcessConfig) -> RelayResult<Self> {
        let port = match config.port {
            Some(port) => port,
            None => free_port()?,
        };
        let addr = format!("127.0.0.1:{}", port);
        let client = RelayClient::new(&format!("http://{}", addr), config.poll_interval)?;

        info!("Spawning {} on {}", config.binary_path.display(), addr);

        let child = Command::new(&config.binary_path)
            .arg("--addr")
            .arg(&addr)
            .arg("--ttl-secs")
            .arg(config.value_ttl.as_secs().to_string())
            .arg("--sweep-secs")
            .arg(config.sweep_interval.as_secs().to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                RelayError::Startup(format!(
                    "failed to spawn {}: {}",
                    config.binary_path.display(),
                    e
                ))
            })?;

        let mut process = Self {
            child,
            client,
            stopped: None,
        };
        process.wait_for_healthy(config.startup_timeout).await?;

        info!("Relay is healthy at {}", process.base_url());
        Ok(process)
    }

    async fn wait_for_healthy(&mut self, timeout: Duration) -> RelayResult<()> {
        let start = Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout {
            attempts += 1;

            if let Some(status) = self.child.try_wait()? {
                self.stopped = Some(status);
                return Err(RelayError::Startup(format!("relay exited with {}", status)));
            }

            match self.client.health().await {
                Ok(()) => return Ok(()),
                // connection refused until the listener is bound
                Err(RelayError::Http(e)) if e.is_connect() => {
                    if attempts == 1 {
                        debug!("Waiting for relay to start...");
                    }
                }
                Err(e) => warn!("Relay health check failed: {}", e),
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        Err(RelayError::HealthCheck(attempts))
    }

    /// Client for this relay
    pub fn client(&self) -> &RelayClient {
        &self.client
    }

    pub fn base_url(&self) -> &url::Url {
        self.client.base_url()
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Stop the relay: SIGTERM, then kill after a grace period
    pub fn stop(&mut self) -> RelayResult<ExitStatus> {
        if let Some(status) = self.stopped {
            return Ok(status);
        }
        info!("Stopping relay (pid: {})", self.child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                let start = Instant::now();
                while start.elapsed() < STOP_GRACE {
                    if let Some(status) = self.child.try_wait()? {
                        self.stopped = Some(status);
                        return Ok(status);
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
                warn!("Relay ignored SIGTERM, killing it");
            }
        }

        if let Err(e) = self.child.kill() {
            debug!("Kill failed: {}", e);
        }
        let status = self.child.wait()?;
        self.stopped = Some(status);
        Ok(status)
    }
}

impl Drop for RelayProcess {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop relay: {}", e);
        }
    }
}

fn free_port() -> RelayResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}
