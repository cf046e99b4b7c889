use anyhow::Context;
use reqwest::Client;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::configuration::{ReadinessSettings, ServerSettings};
use crate::errors::SetupError;

// keep the tail of the server's output for setup errors
const CAPTURE_LIMIT: usize = 200;
const DRAIN_GRACE: Duration = Duration::from_secs(1);

type CapturedOutput = Arc<Mutex<Vec<String>>>;

/// The application under test, running as a child process.
pub struct ServerProcess {
    child: Child,
    output: CapturedOutput,
    drains: Vec<JoinHandle<()>>,
}

impl ServerProcess {
    /// Spawn the server and wait until it answers (or, without a probe, for the grace period).
    #[allow(clippy::missing_errors_doc)]
    #[tracing::instrument(name = "Start application server", skip(settings, base_url), fields(program = %settings.program))]
    pub async fn start(settings: &ServerSettings, base_url: &str) -> Result<Self, SetupError> {
        let mut child = Command::new(&settings.program)
            .args(&settings.args)
            .current_dir(&settings.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SetupError::SpawnFailed {
                program: settings.program.clone(),
                source,
            })?;

        let output = CapturedOutput::default();
        let mut drains = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            drains.push(drain(stdout, "stdout", Arc::clone(&output)));
        }
        if let Some(stderr) = child.stderr.take() {
            drains.push(drain(stderr, "stderr", Arc::clone(&output)));
        }

        let mut server = Self {
            child,
            output,
            drains,
        };

        match &settings.readiness {
            Some(readiness) => server.wait_until_ready(readiness, base_url).await?,
            None => {
                tokio::time::sleep(settings.grace_period()).await;
                server.ensure_running().await?;
            }
        }

        tracing::info!(pid = ?server.child.id(), "application server is up");
        Ok(server)
    }

    // poll the probe path until anything answers over http
    async fn wait_until_ready(
        &mut self,
        readiness: &ReadinessSettings,
        base_url: &str,
    ) -> Result<(), SetupError> {
        let probe_url = format!("{base_url}{}", readiness.path);
        let client = Client::builder()
            .timeout(readiness.interval().max(Duration::from_millis(500)))
            .build()
            .context("Failed to build readiness probe client")?;

        let start = tokio::time::Instant::now();
        loop {
            self.ensure_running().await?;

            match client.get(&probe_url).send().await {
                Ok(response) => {
                    tracing::debug!(status = response.status().as_u16(), "readiness probe answered");
                    return Ok(());
                }
                Err(e) => tracing::debug!(error.message = %e, "readiness probe failed"),
            }

            if start.elapsed() > readiness.timeout() {
                return Err(SetupError::ServerNotReady {
                    waited: start.elapsed(),
                    output: self.captured_output(),
                });
            }
            tokio::time::sleep(readiness.interval()).await;
        }
    }

    async fn ensure_running(&mut self) -> Result<(), SetupError> {
        let status = self
            .child
            .try_wait()
            .context("Failed to poll application server")?;

        match status {
            None => Ok(()),
            Some(status) => {
                // let the drains pick up whatever the process wrote before dying
                for drain in self.drains.drain(..) {
                    let _ = tokio::time::timeout(DRAIN_GRACE, drain).await;
                }
                Err(SetupError::ServerExited {
                    status,
                    output: self.captured_output(),
                })
            }
        }
    }

    /// Process id, `None` once the server has been reaped.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    #[must_use]
    pub fn captured_output(&self) -> String {
        self.output
            .lock()
            .map(|lines| lines.join("\n"))
            .unwrap_or_default()
    }

    /// Kill the server, whatever state it is in.
    #[tracing::instrument(name = "Stop application server", skip(self))]
    pub async fn teardown(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!(error.cause_chain = ?e, error.message = %e, "failed to kill application server");
        }
        for drain in self.drains.drain(..) {
            drain.abort();
        }
    }
}

fn drain<R>(stream: R, name: &'static str, output: CapturedOutput) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(stream = name, "{line}");
            if let Ok(mut captured) = output.lock() {
                if captured.len() == CAPTURE_LIMIT {
                    captured.remove(0);
                }
                captured.push(line);
            }
        }
    })
}
