use crate::error::ErrorKind;
use crate::message::{LifecycleId, Message};

/// Milliseconds of monotonic time, from any epoch.
pub type TimeMs = u64;

/// Milliseconds of duration.
pub type DurationMs = u64;

/// Opaque identifier handed to the host when a timeout is started and
/// passed back to `Socket::handle_timeout` when it fires.
pub type TimeoutId = u64;

/// Outcome of handing a packet to the host for transmission.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SendPacketStatus {
    /// The packet was accepted by the lower layer.
    Success,
    /// The packet could not be sent right now, but retrying the same
    /// packet later may work (e.g. the DTLS record buffer is full).
    TemporaryFailure,
    /// The packet could not be sent and retrying is pointless.
    Error,
}

/// A one-shot timeout supplied by the host.
///
/// When a started timeout expires, the host must call
/// `Socket::handle_timeout` with the `timeout_id` given to `start`.
pub trait Timeout {
    /// Starts the timeout; it will fire after `duration` milliseconds.
    fn start(&mut self, duration: DurationMs, timeout_id: TimeoutId);

    /// Stops a running timeout. Stopping an already stopped timeout is a
    /// no-op.
    fn stop(&mut self);

    /// Atomically stops and starts. Hosts may override this with a cheaper
    /// primitive.
    fn restart(&mut self, duration: DurationMs, timeout_id: TimeoutId) {
        self.stop();
        self.start(duration, timeout_id);
    }
}

/// Inspection hook for every packet the socket sends or receives.
pub trait PacketObserver {
    fn on_sent_packet(&mut self, now: TimeMs, payload: &[u8]);
    fn on_received_packet(&mut self, now: TimeMs, payload: &[u8]);
}

/// The host interface of the socket.
///
/// `send_packet`, `create_timeout`, `time_millis` and `get_random_int` are
/// invoked synchronously while the socket works, because it depends on
/// their results. All notification callbacks are deferred: they are queued
/// while the socket works and delivered in order at the end of the public
/// API call that produced them, when the socket is stable again.
pub trait SocketCallbacks {
    /// Hands a serialized packet to the lower layer. Synchronous.
    fn send_packet(&mut self, payload: &[u8]) -> SendPacketStatus;

    /// Returns a fresh, stopped timeout. Synchronous.
    fn create_timeout(&mut self) -> Box<dyn Timeout>;

    /// Current monotonic time in milliseconds, from any epoch.
    /// Synchronous.
    fn time_millis(&mut self) -> TimeMs;

    /// A uniform random integer in `[low, high)`. Not used for
    /// cryptographic purposes. Synchronous.
    fn get_random_int(&mut self, low: u32, high: u32) -> u32;

    /// A message has been received in full.
    fn on_message_received(&mut self, message: Message) {
        let _ = message;
    }

    /// A non-fatal error was found. Worth logging; the association is
    /// still viable.
    fn on_error(&mut self, kind: ErrorKind, message: String) {
        let _ = (kind, message);
    }

    /// The socket has aborted, by own decision or by the peer's ABORT. No
    /// callbacks follow until the socket is connected again.
    fn on_aborted(&mut self, kind: ErrorKind, message: String) {
        let _ = (kind, message);
    }

    /// The association reached the established state, for both actively
    /// and passively opened sockets.
    fn on_connected(&mut self) {}

    /// The socket closed in a controlled way. No callbacks follow until
    /// the socket is connected again.
    fn on_closed(&mut self) {}

    /// The peer restarted its association. Packet loss may have occurred,
    /// but the association works again.
    fn on_connection_restarted(&mut self) {}

    /// A stream reset request failed terminally.
    fn on_streams_reset_failed(&mut self, outgoing_streams: Vec<u16>, reason: String) {
        let _ = (outgoing_streams, reason);
    }

    /// A stream reset request was performed by the peer.
    fn on_streams_reset_performed(&mut self, outgoing_streams: Vec<u16>) {
        let _ = outgoing_streams;
    }

    /// The peer reset some of its outgoing streams. An empty list means
    /// all streams.
    fn on_incoming_streams_reset(&mut self, incoming_streams: Vec<u16>) {
        let _ = incoming_streams;
    }

    /// An outgoing message expired before being fully sent. `unsent` is
    /// true when no fragment of it ever left the socket.
    fn on_sent_message_expired(&mut self, stream_id: u16, ppid: u32, unsent: bool) {
        let _ = (stream_id, ppid, unsent);
    }

    /// There are no more queued outgoing messages. Packets may still be in
    /// flight or awaiting retransmission.
    fn on_outgoing_message_buffer_empty(&mut self) {}

    /// The buffered amount of a stream dropped below its low watermark.
    fn on_buffered_amount_low(&mut self, stream_id: u16) {
        let _ = stream_id;
    }

    /// The total buffered amount dropped below the low watermark.
    fn on_total_buffered_amount_low(&mut self) {}

    /// A message with a lifecycle id expired. `maybe_delivered` is true
    /// when some of it was sent and the peer may have received it.
    fn on_lifecycle_message_expired(&mut self, lifecycle_id: LifecycleId, maybe_delivered: bool) {
        let _ = (lifecycle_id, maybe_delivered);
    }

    /// The socket is done with a lifecycle id; no further lifecycle
    /// callbacks will reference it.
    fn on_lifecycle_end(&mut self, lifecycle_id: LifecycleId) {
        let _ = lifecycle_id;
    }
}
