//! Channel transport through an external `ssh` client.
//!
//! Runs `ssh -p <port> [-l <user>] <extra args> -s <host> <subsystem>` and
//! speaks NETCONF over the child's stdin/stdout.  Authentication, host-key
//! checking and agent forwarding are all left to the ssh client and its own
//! configuration; stderr is inherited so its prompts and diagnostics stay
//! visible.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::config::SshConfig;
use super::stream::StreamChannelOpener;
use crate::application::channel::{ChannelError, ChannelOpener, DataReceiver, SubsystemChannel};

/// How long `close` waits for the ssh client to exit before killing it.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Opens subsystem channels by spawning the configured ssh client.
#[derive(Debug, Clone)]
pub struct SshProcessOpener {
    config: SshConfig,
}

impl SshProcessOpener {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    /// Arguments passed to the ssh client for `subsystem`.
    pub fn command_args(&self, subsystem: &str) -> Vec<String> {
        let mut args = vec!["-p".to_string(), self.config.port.to_string()];
        if let Some(user) = &self.config.user {
            args.push("-l".to_string());
            args.push(user.clone());
        }
        args.extend(self.config.extra_args.iter().cloned());
        args.push("-s".to_string());
        args.push(self.config.host.clone());
        args.push(subsystem.to_string());
        args
    }
}

#[async_trait]
impl ChannelOpener for SshProcessOpener {
    async fn open(
        &self,
        subsystem: &str,
        receiver: Arc<dyn DataReceiver>,
    ) -> Result<Box<dyn SubsystemChannel>, ChannelError> {
        let open_failed = |reason: String| ChannelError::OpenFailed {
            subsystem: subsystem.to_string(),
            reason,
        };

        let args = self.command_args(subsystem);
        debug!(program = %self.config.program, ?args, "spawning ssh client");
        let mut child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| open_failed(format!("cannot start {}: {e}", self.config.program)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| open_failed("ssh client has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| open_failed("ssh client has no stdout".to_string()))?;

        let inner = StreamChannelOpener::new(stdout, stdin)
            .open(subsystem, receiver)
            .await?;
        info!(host = %self.config.host, port = self.config.port, subsystem, "ssh subsystem started");

        Ok(Box::new(SshProcessChannel {
            inner,
            child: Mutex::new(child),
        }))
    }
}

/// A channel backed by a running ssh client process.
struct SshProcessChannel {
    inner: Box<dyn SubsystemChannel>,
    child: Mutex<Child>,
}

#[async_trait]
impl SubsystemChannel for SshProcessChannel {
    async fn send(&self, data: &[u8]) -> Result<(), ChannelError> {
        self.inner.send(data).await
    }

    async fn close(&self) -> Result<(), ChannelError> {
        // Closing stdin lets the ssh client end the subsystem cleanly.
        let closed = self.inner.close().await;

        let mut child = self.child.lock().await;
        match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "ssh client exited"),
            Ok(Err(e)) => warn!("waiting for ssh client failed: {e}"),
            Err(_) => {
                warn!("ssh client did not exit within {EXIT_GRACE:?}; killing it");
                child.kill().await?;
            }
        }
        closed
    }
}
