use bytes::Bytes;

use crate::chunk::chunk_payload_data::PayloadProtocolIdentifier;

/// A group of bytes sent and received as a whole on a stream, tagged with
/// a payload protocol identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub stream_id: u16,
    pub ppid: PayloadProtocolIdentifier,
    pub payload: Bytes,
}

impl Message {
    pub fn new(stream_id: u16, ppid: PayloadProtocolIdentifier, payload: Bytes) -> Self {
        Message {
            stream_id,
            ppid,
            payload,
        }
    }
}

/// An opaque tag attached to a message to correlate its lifecycle
/// callbacks (`on_lifecycle_message_expired`, `on_lifecycle_end`) with the
/// `send` call that queued it.
pub type LifecycleId = u64;

/// Per-message send options.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Deliver the message without ordering guarantees.
    pub unordered: bool,

    /// Discard the message if it could not be sent and acknowledged within
    /// this many milliseconds. Requires the peer to support partial
    /// reliability.
    pub lifetime_ms: Option<u64>,

    /// Limit on the number of retransmissions. `Some(0)` means the message
    /// is never retransmitted. Requires the peer to support partial
    /// reliability.
    pub max_retransmissions: Option<u32>,

    /// When set, lifecycle callbacks fire for this message.
    pub lifecycle_id: Option<LifecycleId>,
}
