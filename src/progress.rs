//! Progress reporting for transfers.
//!
//! The transfer engine notifies a [`ProgressSink`] before, during, and
//! after each upload or download. Listings move bytes too but are never
//! reported — the engine substitutes [`NoopProgress`] for them.

use crate::types::TransferDirection;
use serde::{Deserialize, Serialize};

/// Identifies the transfer a progress stream belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferInfo {
    /// Remote path of the file being transferred.
    pub name: String,
    pub direction: TransferDirection,
}

/// Receives progress events for one transfer at a time.
///
/// `start` and `stop` bracket every transfer; `update` carries the
/// cumulative byte count and fires once per pumped chunk, never per byte.
pub trait ProgressSink: Send {
    fn start(&mut self, info: &TransferInfo);
    fn update(&mut self, bytes_transferred: u64);
    fn stop(&mut self);
}

/// Sink that ignores everything. Used for listings and as the default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn start(&mut self, _info: &TransferInfo) {}
    fn update(&mut self, _bytes_transferred: u64) {}
    fn stop(&mut self) {}
}

/// Sink that emits progress through the `log` facade at debug level.
#[derive(Debug, Default)]
pub struct LogProgress {
    current: Option<TransferInfo>,
    last_reported: u64,
}

impl ProgressSink for LogProgress {
    fn start(&mut self, info: &TransferInfo) {
        log::debug!("transfer start: {:?} {}", info.direction, info.name);
        self.current = Some(info.clone());
        self.last_reported = 0;
    }

    fn update(&mut self, bytes_transferred: u64) {
        self.last_reported = bytes_transferred;
        if let Some(info) = &self.current {
            log::debug!("transfer {}: {} bytes", info.name, bytes_transferred);
        }
    }

    fn stop(&mut self) {
        if let Some(info) = self.current.take() {
            log::debug!(
                "transfer done: {} ({} bytes)",
                info.name,
                self.last_reported
            );
        }
    }
}
