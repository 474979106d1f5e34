/// Configuration for a socket, with defaults sized for WebRTC data
/// channels over DTLS.
#[derive(Debug, Clone)]
pub struct Options {
    /// The local port the socket is bound to. Inbound packets are checked
    /// against it and outbound packets carry it as source port.
    pub local_port: u16,

    /// The remote port all outbound packets are destined to.
    pub remote_port: u16,

    /// Maximum SCTP packet size. On top of this come DTLS (61 bytes), UDP
    /// (8 bytes) and IPv6 (40 bytes) headers; staying under the IPv6
    /// minimum MTU of 1280 gives 1170.
    pub mtu: usize,

    /// Maximum received window buffer size, bounding memory on the receive
    /// side. Should be somewhat larger than the largest expected message.
    pub max_receiver_window_buffer_size: usize,

    /// Maximum send buffer size; `send` fails once this much data is
    /// queued.
    pub max_send_buffer_size: usize,

    /// Initial RTO value.
    pub rto_initial_ms: u64,

    /// Maximum RTO value.
    pub rto_max_ms: u64,

    /// Minimum RTO value.
    pub rto_min_ms: u64,

    /// T1-init timeout.
    pub t1_init_timeout_ms: u64,

    /// T1-cookie timeout.
    pub t1_cookie_timeout_ms: u64,

    /// T2-shutdown timeout.
    pub t2_shutdown_timeout_ms: u64,

    /// Heartbeat interval, on idle associations only. Zero disables
    /// heartbeats.
    pub heartbeat_interval_ms: u64,

    /// The longest a SACK may be delayed after an unacknowledged packet
    /// arrives. The smaller of RTO/2 and this is used.
    pub delayed_ack_max_timeout_ms: u64,

    /// Slow start the TCP way: double cwnd per round trip instead of
    /// increasing it by one MTU.
    pub slow_start_tcp_style: bool,

    /// Maximum retransmission attempts per DATA chunk before the
    /// association gives up.
    pub max_retransmissions: u32,

    /// Max.Init.Retransmits from RFC 4960.
    pub max_init_retransmits: u32,

    /// RFC 3758 Partial Reliability Extension.
    pub enable_partial_reliability: bool,

    /// RFC 8260 Stream Schedulers and User Message Interleaving.
    pub enable_message_interleaving: bool,

    /// If the current RTT should be added to the heartbeat interval.
    pub heartbeat_interval_include_rtt: bool,

    /// Disables CRC32c verification of inbound packets. Useful when
    /// running under fuzzers.
    pub disable_checksum_verification: bool,

    /// Announce RFC 9653 zero-checksum acceptance, for use below DTLS
    /// which has its own integrity protection. The checksum is elided on
    /// outgoing packets once both peers accept.
    pub enable_zero_checksum: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            local_port: 5000,
            remote_port: 5000,
            mtu: 1170,
            max_receiver_window_buffer_size: 5 * 1024 * 1024,
            max_send_buffer_size: 2 * 1024 * 1024,
            rto_initial_ms: 500,
            rto_max_ms: 800,
            rto_min_ms: 120,
            t1_init_timeout_ms: 1000,
            t1_cookie_timeout_ms: 1000,
            t2_shutdown_timeout_ms: 1000,
            heartbeat_interval_ms: 5000,
            delayed_ack_max_timeout_ms: 200,
            slow_start_tcp_style: true,
            max_retransmissions: 10,
            max_init_retransmits: 10,
            enable_partial_reliability: true,
            enable_message_interleaving: false,
            heartbeat_interval_include_rtt: true,
            disable_checksum_verification: false,
            enable_zero_checksum: false,
        }
    }
}
