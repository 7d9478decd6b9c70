//! Pull-based recovery for clients that missed playback events.
//!
//! A sync request sends one `sync-request` and waits for exactly one
//! `sync-response`. Only one request is outstanding at a time: starting a
//! new one supersedes the previous waiter.

use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use crate::errors::RoomError;
use crate::model::SyncSnapshot;
use crate::protocol::SyncResponse;

pub struct SyncOracle {
    pending: Option<oneshot::Sender<SyncResponse>>,
    timeout: Duration,
}

impl SyncOracle {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: None,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Registers a new outstanding request. Must be called before the
    /// `sync-request` event is sent.
    pub fn begin(&mut self) -> PendingSync {
        let (tx, rx) = oneshot::channel();
        if self.pending.replace(tx).is_some() {
            debug!("Superseding outstanding sync request");
        }
        PendingSync {
            rx,
            timeout: self.timeout,
        }
    }

    /// Hands a `sync-response` to the outstanding request.
    ///
    /// Returns `false` for unsolicited responses, which are dropped.
    pub fn deliver(&mut self, response: SyncResponse) -> bool {
        match self.pending.take() {
            Some(tx) => tx.send(response).is_ok(),
            None => {
                debug!("Dropping unsolicited sync-response");
                false
            }
        }
    }

    /// Fails the outstanding request, if any.
    pub fn cancel(&mut self) {
        self.pending = None;
    }
}

/// Waiter for one sync response.
pub struct PendingSync {
    rx: oneshot::Receiver<SyncResponse>,
    timeout: Duration,
}

impl PendingSync {
    pub async fn wait(self) -> Result<SyncSnapshot, RoomError> {
        let timeout = self.timeout;
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(SyncResponse::Time(snapshot))) => Ok(snapshot),
            Ok(Ok(SyncResponse::Error)) => Err(RoomError::sync_unavailable(
                "authority could not provide a playback snapshot",
            )),
            Ok(Err(_)) => Err(RoomError::sync_unavailable("sync request was abandoned")),
            Err(_) => Err(RoomError::SyncUnavailable(format!(
                "no sync response within {} ms",
                timeout.as_millis()
            ))),
        }
    }
}
