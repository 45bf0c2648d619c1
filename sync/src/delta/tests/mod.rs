// Tests for the synchronization flow between two managers
#![cfg(test)]


use std::time::Instant;

use crate::delta::manager::DeltaManager;
use crate::protocol::Protocol;
use crate::transport::{Transport, TransportError};
use crate::types::PeerId;

pub const ALICE: PeerId = 1;
pub const BOB: PeerId = 2;

pub fn init_logs() {
    env_logger::builder().is_test(true).try_init().ok();
}

pub fn plain_manager() -> DeltaManager {
    DeltaManager::new(Protocol::builder().build())
}

pub struct MockTransport {
    pub unreliable: Vec<(PeerId, Vec<u8>)>,
    pub reliable: Vec<(PeerId, Vec<u8>)>,
    pub refuse: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            unreliable: Vec::new(),
            reliable: Vec::new(),
            refuse: false,
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::new()
        }
    }
}

impl Transport for MockTransport {
    fn send_unreliable(&mut self, peer: PeerId, payload: &[u8]) -> Result<(), TransportError> {
        if self.refuse {
            return Err(TransportError {
                peer,
                payload_size: payload.len(),
                reason: "socket closed".to_string(),
            });
        }
        self.unreliable.push((peer, payload.to_vec()));
        Ok(())
    }

    fn send_reliable_ordered(&mut self, peer: PeerId, payload: &[u8]) -> Result<(), TransportError> {
        if self.refuse {
            return Err(TransportError {
                peer,
                payload_size: payload.len(),
                reason: "socket closed".to_string(),
            });
        }
        self.reliable.push((peer, payload.to_vec()));
        Ok(())
    }
}

/// Pops the one flushed ack payload and feeds it to `to` as arriving from
/// `from_peer`.
pub fn deliver_ack(
    transport: &mut MockTransport,
    to: &mut DeltaManager,
    from_peer: PeerId,
    now: &Instant,
) {
    let (_, payload) = transport
        .unreliable
        .pop()
        .expect("an ack batch was flushed");
    to.receive(now, from_peer, &payload).unwrap();
}
