use std::any::Any;

use thiserror::Error;

use crate::types::PeerId;

/// A send failed at the wire. The engine logs these and treats the payload
/// as lost; acknowledgment-driven retransmission recovers the state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to send {payload_size} bytes to peer {peer}: {reason}")]
pub struct TransportError {
    pub peer: PeerId,
    pub payload_size: usize,
    pub reason: String,
}

/// Outgoing half of the wire, provided by the application. Inbound
/// payloads are the application's job to collect and hand to
/// [`DeltaManager::receive`](crate::DeltaManager::receive).
pub trait Transport {
    /// Fire-and-forget delivery. Loss and reordering are tolerated:
    /// acknowledgments are re-sent until cleaned up, and stale ones are
    /// absorbed by the watermark.
    fn send_unreliable(&mut self, peer: PeerId, payload: &[u8]) -> Result<(), TransportError>;

    /// Ordered, guaranteed delivery. Carries cleanup notifications, which
    /// both sides must apply in the same order.
    fn send_reliable_ordered(&mut self, peer: PeerId, payload: &[u8])
        -> Result<(), TransportError>;
}

/// Identity table for values that ship as an index instead of a payload.
/// Polymorphic encoding consults this before falling back to an inline
/// kind tag.
pub trait AssetTable {
    /// The index of `value`, if it is a registered asset.
    fn try_get_index(&self, value: &dyn Any) -> Option<u64>;

    /// A fresh instance of the asset at `index`.
    fn get_by_index(&self, index: u64) -> Option<Box<dyn Any + Send>>;
}

/// The table with nothing in it, for applications that never share assets.
pub struct EmptyAssetTable;

impl AssetTable for EmptyAssetTable {
    fn try_get_index(&self, _value: &dyn Any) -> Option<u64> {
        None
    }

    fn get_by_index(&self, _index: u64) -> Option<Box<dyn Any + Send>> {
        None
    }
}
