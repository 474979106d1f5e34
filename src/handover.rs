/// Snapshot of an established association, for moving it between socket
/// instances. Only available when both the send and the retransmission
/// queues are empty; a socket restored from it continues with the same
/// verification tags, TSN cursors and per-stream sequence numbers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SocketHandoverState {
    pub my_verification_tag: u32,
    pub peer_verification_tag: u32,
    pub my_next_tsn: u32,
    /// Highest TSN received in order from the peer.
    pub peer_cumulative_acked_tsn: u32,
    /// Next outgoing stream reconfiguration request sequence number.
    pub my_next_reset_req_seq: u32,
    /// Next expected incoming reconfiguration request sequence number.
    pub peer_next_reset_req_seq: u32,
    pub capabilities: HandoverCapabilities,
    /// Send-side stream state: (stream id, next SSN, next ordered MID,
    /// next unordered MID, priority).
    pub tx_streams: Vec<(u16, u16, u32, u32, u16)>,
    /// Receive-side stream state: (stream id, next delivery key).
    pub rx_streams: Vec<(u16, u32)>,
}

/// The capabilities both peers agreed on during the handshake.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct HandoverCapabilities {
    pub partial_reliability: bool,
    pub message_interleaving: bool,
    pub reconfig: bool,
    pub zero_checksum: bool,
}
