use std::collections::VecDeque;
use std::sync::Mutex;

use crate::packet::SharedPacket;

/// Queue depth above which a consumer has enough runway to start decoding.
const READY_COUNT: usize = 10;

/// FIFO of packets for exactly one stream index. Single producer (the router
/// thread), single consumer (whoever calls `poll`); the queue itself applies
/// no backpressure.
pub struct PacketQueue {
    index: usize,
    packets: Mutex<VecDeque<SharedPacket>>,
}

impl PacketQueue {
    pub fn new(stream_index: usize) -> Self {
        Self {
            index: stream_index,
            packets: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends the packet if it belongs to this queue's stream. `None` and
    /// foreign stream indices are silently dropped; the queue acts as a
    /// filter, not a validator.
    pub fn push(&self, packet: Option<&SharedPacket>) {
        let Some(packet) = packet else {
            return;
        };
        if packet.stream_index == self.index {
            self.packets
                .lock()
                .unwrap()
                .push_back(SharedPacket::clone(packet));
        }
    }

    pub fn poll(&self) -> Option<SharedPacket> {
        self.packets.lock().unwrap().pop_front()
    }

    pub fn ready(&self) -> bool {
        self.len() > READY_COUNT
    }

    pub fn len(&self) -> usize {
        self.packets.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod queue_test;
