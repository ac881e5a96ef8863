//! SSH reachability check run once a machine reports that it is running.

use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::orchestrator::CancelSignal;
use crate::provision::ConnectionDescriptor;

/// Why the SSH port never accepted a connection.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum SshWaitError {
    /// Every attempt failed.
    #[error("SSH port unreachable after {attempts} attempts")]
    Unreachable {
        /// Connection attempts made.
        attempts: u32,
    },
    /// The caller cancelled between attempts.
    #[error("cancelled after {attempts} SSH attempts")]
    Cancelled {
        /// Connection attempts made.
        attempts: u32,
    },
}

/// Bounded TCP check of a machine's SSH port.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SshCheck {
    /// Timeout for a single connection attempt.
    pub connect_timeout: Duration,
    /// Delay between attempts.
    pub interval: Duration,
}

impl SshCheck {
    /// Tries to connect up to `attempts` times and returns the attempt that
    /// succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`SshWaitError::Unreachable`] when every attempt fails and
    /// [`SshWaitError::Cancelled`] when `cancel` fires between attempts.
    pub async fn wait(
        &self,
        connection: &ConnectionDescriptor,
        attempts: u32,
        cancel: &CancelSignal,
    ) -> Result<u32, SshWaitError> {
        let addr = (connection.address.as_str(), connection.ssh_port);
        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return Err(SshWaitError::Cancelled {
                    attempts: attempt - 1,
                });
            }
            let connect = timeout(self.connect_timeout, TcpStream::connect(addr)).await;
            if matches!(connect, Ok(Ok(_))) {
                return Ok(attempt);
            }
            debug!(
                machine = %connection.machine_name,
                attempt,
                "SSH port not reachable yet"
            );
            if attempt < attempts && cancel.sleep_or_cancelled(self.interval).await {
                return Err(SshWaitError::Cancelled { attempts: attempt });
            }
        }
        Err(SshWaitError::Unreachable { attempts })
    }
}
