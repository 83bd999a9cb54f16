use rtrb::{Consumer, Producer, RingBuffer};

/// Commands sent from the controlling thread to the scheduling thread
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransportMessage {
    /// Stop scheduling and silence the backend
    Stop,
    /// Discard queued dispatches and restart from cycle 0
    Rewind,
}

pub trait MessageReceiver {
    fn pop(&mut self) -> Option<TransportMessage>;
}

impl MessageReceiver for Consumer<TransportMessage> {
    fn pop(&mut self) -> Option<TransportMessage> {
        Consumer::pop(self).ok()
    }
}

/// Lock-free SPSC channel for transport commands
pub fn control_channel(
    capacity: usize,
) -> (Producer<TransportMessage>, Consumer<TransportMessage>) {
    RingBuffer::new(capacity)
}
