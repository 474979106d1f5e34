use crate::callbacks::SocketCallbacks;
use crate::error::ErrorKind;
use crate::message::{LifecycleId, Message};

/// A deferred notification, queued while the socket works and delivered
/// when it is stable again.
///
/// Clients are expected to call back into the socket when they are told
/// about e.g. a received message. The socket must be in a consistent state
/// by then, so notifications are not fired from where they originate but
/// recorded here and drained exactly once at the end of every public API
/// call. Payload-bearing events move their payload.
#[derive(Debug)]
pub(crate) enum SocketEvent {
    MessageReceived(Message),
    Error(ErrorKind, String),
    Aborted(ErrorKind, String),
    Connected,
    Closed,
    ConnectionRestarted,
    StreamsResetFailed(Vec<u16>, String),
    StreamsResetPerformed(Vec<u16>),
    IncomingStreamsReset(Vec<u16>),
    SentMessageExpired(u16, u32, bool),
    OutgoingMessageBufferEmpty,
    BufferedAmountLow(u16),
    TotalBufferedAmountLow,
    LifecycleMessageExpired(LifecycleId, bool),
    LifecycleEnd(LifecycleId),
}

/// FIFO of deferred events.
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    deferred: Vec<SocketEvent>,
    /// Once the socket aborted or closed, nothing further may reach the
    /// client until it reconnects.
    silenced: bool,
}

impl EventQueue {
    pub(crate) fn push(&mut self, event: SocketEvent) {
        if !self.silenced {
            self.deferred.push(event);
        }
    }

    /// Queues a terminal event and drops everything the client must no
    /// longer observe after it.
    pub(crate) fn push_terminal(&mut self, event: SocketEvent) {
        self.push(event);
        self.silenced = true;
    }

    /// Stops all delivery immediately, including anything already queued.
    /// Used by `close()`, which promises that no callback fires after it
    /// returns.
    pub(crate) fn silence(&mut self) {
        self.deferred.clear();
        self.silenced = true;
    }

    pub(crate) fn unsilence(&mut self) {
        self.silenced = false;
    }

    /// True after a terminal event or an explicit silence, i.e. the
    /// socket ended its previous life and has not been reconnected.
    pub(crate) fn is_silenced(&self) -> bool {
        self.silenced
    }

    /// Takes everything queued so far, for inspection in tests.
    #[cfg(test)]
    pub(crate) fn take_all(&mut self) -> Vec<SocketEvent> {
        std::mem::take(&mut self.deferred)
    }

    /// Delivers all queued events in order.
    pub(crate) fn drain_into<C: SocketCallbacks>(&mut self, callbacks: &mut C) {
        for event in self.deferred.drain(..) {
            match event {
                SocketEvent::MessageReceived(message) => callbacks.on_message_received(message),
                SocketEvent::Error(kind, message) => callbacks.on_error(kind, message),
                SocketEvent::Aborted(kind, message) => callbacks.on_aborted(kind, message),
                SocketEvent::Connected => callbacks.on_connected(),
                SocketEvent::Closed => callbacks.on_closed(),
                SocketEvent::ConnectionRestarted => callbacks.on_connection_restarted(),
                SocketEvent::StreamsResetFailed(streams, reason) => {
                    callbacks.on_streams_reset_failed(streams, reason)
                }
                SocketEvent::StreamsResetPerformed(streams) => {
                    callbacks.on_streams_reset_performed(streams)
                }
                SocketEvent::IncomingStreamsReset(streams) => {
                    callbacks.on_incoming_streams_reset(streams)
                }
                SocketEvent::SentMessageExpired(stream_id, ppid, unsent) => {
                    callbacks.on_sent_message_expired(stream_id, ppid, unsent)
                }
                SocketEvent::OutgoingMessageBufferEmpty => {
                    callbacks.on_outgoing_message_buffer_empty()
                }
                SocketEvent::BufferedAmountLow(stream_id) => {
                    callbacks.on_buffered_amount_low(stream_id)
                }
                SocketEvent::TotalBufferedAmountLow => callbacks.on_total_buffered_amount_low(),
                SocketEvent::LifecycleMessageExpired(id, maybe_delivered) => {
                    callbacks.on_lifecycle_message_expired(id, maybe_delivered)
                }
                SocketEvent::LifecycleEnd(id) => callbacks.on_lifecycle_end(id),
            }
        }
    }
}
