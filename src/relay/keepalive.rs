//! SSE keepalive supervisor
//!
//! While a streaming request waits for the upstream, a single background
//! task writes a ping frame to the client on every tick so that idle
//! timeouts on the client path do not kill the connection.
//!
//! The task stops on whichever comes first:
//! - [`KeepaliveSupervisor::stop`] (or dropping the supervisor)
//! - cancellation of the inbound request
//! - the absolute ceiling [`MAX_PING_DURATION`]
//! - a ping that fails, panics or does not finish within [`PING_SEND_TIMEOUT`]

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{RelayError, RelayResult};
use crate::streaming::Downstream;

/// Upper bound on a single ping write
pub const PING_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Hard lifetime limit of the ping task
pub const MAX_PING_DURATION: Duration = Duration::from_secs(120 * 60);

/// Why the ping task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Stopped,
    RequestCancelled,
    MaxDuration,
    SendFailed,
    Panicked,
}

/// Handle on a running ping task
///
/// Dropping the handle signals the task to stop; [`stop`](Self::stop)
/// additionally waits until it has exited.
#[derive(Debug)]
pub struct KeepaliveSupervisor {
    stop: CancellationToken,
    handle: Option<JoinHandle<StopReason>>,
}

impl KeepaliveSupervisor {
    /// Spawn the ping task
    ///
    /// A zero `interval` falls back to the configured default.
    pub fn start(
        interval: Duration,
        request_cancel: CancellationToken,
        downstream: Arc<dyn Downstream>,
    ) -> Self {
        let interval = if interval.is_zero() {
            crate::config::DEFAULT_PING_INTERVAL
        } else {
            interval
        };
        let stop = CancellationToken::new();

        let worker = ping_loop(interval, stop.clone(), request_cancel, downstream);
        let handle = tokio::spawn(async move {
            match AssertUnwindSafe(worker).catch_unwind().await {
                Ok(reason) => reason,
                Err(panic_payload) => {
                    let panic_msg = if let Some(s) = panic_payload.downcast_ref::<&str>() {
                        (*s).to_string()
                    } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "unknown panic".to_string()
                    };
                    error!(panic_message = %panic_msg, "SSE ping task panicked, stopping");
                    StopReason::Panicked
                }
            }
        });

        debug!(interval_ms = interval.as_millis() as u64, "SSE ping task started");
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Whether the ping task has exited
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Signal the task and wait for it to exit
    pub async fn stop(mut self) -> StopReason {
        self.stop.cancel();
        let reason = match self.handle.take() {
            Some(handle) => handle.await.unwrap_or(StopReason::Panicked),
            None => StopReason::Stopped,
        };
        debug!(reason = ?reason, "SSE ping task stopped");
        reason
    }
}

impl Drop for KeepaliveSupervisor {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

async fn ping_loop(
    interval: Duration,
    stop: CancellationToken,
    request_cancel: CancellationToken,
    downstream: Arc<dyn Downstream>,
) -> StopReason {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let ceiling = time::sleep(MAX_PING_DURATION);
    tokio::pin!(ceiling);

    let ping_lock = Mutex::new(());

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => return StopReason::Stopped,
            _ = request_cancel.cancelled() => return StopReason::RequestCancelled,
            _ = &mut ceiling => {
                warn!(
                    max_minutes = MAX_PING_DURATION.as_secs() / 60,
                    "SSE ping task reached its maximum duration, stopping"
                );
                return StopReason::MaxDuration;
            }
            _ = ticker.tick() => {
                if let Err(e) = send_ping(downstream.as_ref(), &ping_lock, &stop, &request_cancel).await {
                    debug!(error = %e, "SSE ping error, stopping task");
                    return StopReason::SendFailed;
                }
            }
        }
    }
}

/// Write one ping frame, serialized and bounded by [`PING_SEND_TIMEOUT`]
async fn send_ping(
    downstream: &dyn Downstream,
    lock: &Mutex<()>,
    stop: &CancellationToken,
    request_cancel: &CancellationToken,
) -> RelayResult<()> {
    let send = async {
        let _guard = lock.lock().await;
        downstream
            .ping()
            .await
            .map_err(|e| RelayError::KeepaliveSend(e.to_string()))
    };

    tokio::select! {
        result = send => {
            if let Err(e) = &result {
                error!(error = %e, "SSE ping write failed");
            } else {
                debug!("SSE ping data sent");
            }
            result
        }
        _ = time::sleep(PING_SEND_TIMEOUT) => Err(RelayError::KeepaliveSendTimeout),
        _ = request_cancel.cancelled() => Err(RelayError::KeepaliveSendCancelled),
        _ = stop.cancelled() => Err(RelayError::KeepaliveSendCancelled),
    }
}
