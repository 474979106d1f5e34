//! A callback-driven SCTP implementation for WebRTC data channels.
//!
//! [SCTP](https://en.wikipedia.org/wiki/Stream_Control_Transmission_Protocol)
//! carries WebRTC data channels on top of a DTLS connection. This crate
//! implements the association as a single-threaded state machine with no
//! I/O of its own: the host hands inbound packets to
//! [`Socket::receive_packet`], fires timers through
//! [`Socket::handle_timeout`], and supplies packet egress, a monotonic
//! clock, randomness and one-shot timeouts through [`SocketCallbacks`].
//!
//! Messages are delivered whole, optionally ordered and optionally
//! reliable (bounded retransmissions or lifetime), across independently
//! configured streams.

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

mod association;
mod callbacks;
mod chunk;
mod config;
mod error;
mod error_cause;
mod events;
mod handover;
mod message;
mod packet;
mod packet_sender;
mod param;
mod queue;
mod stream_reset;
mod timer;
mod util;

pub use crate::association::{Metrics, Socket, SocketState};
pub use crate::callbacks::{
    DurationMs, PacketObserver, SendPacketStatus, SocketCallbacks, TimeMs, Timeout, TimeoutId,
};
pub use crate::chunk::chunk_payload_data::PayloadProtocolIdentifier;
pub use crate::config::Options;
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::handover::{HandoverCapabilities, SocketHandoverState};
pub use crate::message::{LifecycleId, Message, SendOptions};
