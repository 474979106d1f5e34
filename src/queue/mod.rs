#[cfg(test)]
mod queue_test;

pub(crate) mod data_tracker;
pub(crate) mod reassembly_queue;
pub(crate) mod retransmission_queue;
pub(crate) mod send_queue;

use bytes::Bytes;

use crate::callbacks::TimeMs;
use crate::chunk::chunk_payload_data::PayloadProtocolIdentifier;
use crate::message::LifecycleId;

/// One fragment of a user message as it moves through the send,
/// retransmission and reassembly queues. Sequence numbers that do not
/// apply in the current mode are zero: DATA traffic has no FSN and keys
/// messages by SSN, I-DATA traffic carries MID and FSN.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Data {
    pub(crate) stream_id: u16,
    pub(crate) ssn: u16,
    pub(crate) mid: u32,
    pub(crate) fsn: u32,
    pub(crate) ppid: PayloadProtocolIdentifier,
    pub(crate) payload: Bytes,
    pub(crate) unordered: bool,
    pub(crate) is_beginning: bool,
    pub(crate) is_end: bool,
}

impl Data {
    /// The coordinate used to tie fragments of one message together.
    pub(crate) fn message_key(&self) -> (u16, bool, u32) {
        (self.stream_id, self.unordered, self.mid)
    }
}

/// A fragment handed from the send queue to the retransmission queue,
/// with the sender-side reliability attributes of its message.
#[derive(Debug, Clone)]
pub(crate) struct DataToSend {
    pub(crate) data: Data,
    /// Limit on retransmissions of this fragment; `None` is unlimited.
    pub(crate) max_retransmissions: Option<u32>,
    /// Wall-clock deadline after which the message is abandoned.
    pub(crate) expires_at: Option<TimeMs>,
    pub(crate) lifecycle_id: Option<LifecycleId>,
}
