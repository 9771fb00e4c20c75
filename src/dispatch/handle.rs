//! Hand-off into the dispatcher
//!
//! Any task may push an out-of-band frame (e.g. an uplink relay) through a
//! cloneable [`DispatchHandle`]. The channel is bounded; callers choose
//! between waiting for room and dropping.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::dispatch::message::{MessageKind, OutboundMessage};
use crate::protocol::encode_uplink;
use crate::stats::DeliveryStats;

#[derive(Debug, Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<OutboundMessage>,
    stats: Arc<DeliveryStats>,
}

impl DispatchHandle {
    pub(crate) fn new(tx: mpsc::Sender<OutboundMessage>, stats: Arc<DeliveryStats>) -> Self {
        Self { tx, stats }
    }

    /// Wait for room and hand the message over. Returns `false` once the
    /// dispatcher is gone.
    pub async fn send(&self, msg: OutboundMessage) -> bool {
        self.tx.send(msg).await.is_ok()
    }

    /// Hand the message over without waiting; a full channel drops it
    pub fn try_send(&self, msg: OutboundMessage) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                self.stats.record_handoff_dropped();
                tracing::debug!(kind = %msg.kind, "Hand-off full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Relay a raw UAT uplink payload
    pub fn send_uplink(&self, payload: &[u8]) -> bool {
        match encode_uplink(payload) {
            Some(frame) => self.try_send(OutboundMessage::new(MessageKind::Uplink, frame)),
            None => {
                tracing::debug!(len = payload.len(), "Ignoring malformed uplink payload");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
