#[cfg(test)]
mod chunk_test;

pub(crate) mod chunk_abort;
pub(crate) mod chunk_cookie_ack;
pub(crate) mod chunk_cookie_echo;
pub(crate) mod chunk_error;
pub(crate) mod chunk_forward_tsn;
pub(crate) mod chunk_header;
pub(crate) mod chunk_heartbeat;
pub(crate) mod chunk_heartbeat_ack;
pub(crate) mod chunk_i_forward_tsn;
pub(crate) mod chunk_idata;
pub(crate) mod chunk_init;
pub mod chunk_payload_data;
pub(crate) mod chunk_reconfig;
pub(crate) mod chunk_selective_ack;
pub(crate) mod chunk_shutdown;
pub(crate) mod chunk_shutdown_ack;
pub(crate) mod chunk_shutdown_complete;
pub(crate) mod chunk_type;
pub(crate) mod chunk_unknown;

use std::fmt;

use bytes::{Bytes, BytesMut};

use crate::error::Result;
use chunk_abort::ChunkAbort;
use chunk_cookie_ack::ChunkCookieAck;
use chunk_cookie_echo::ChunkCookieEcho;
use chunk_error::ChunkError;
use chunk_forward_tsn::ChunkForwardTsn;
use chunk_header::{ChunkHeader, CHUNK_HEADER_SIZE};
use chunk_heartbeat::ChunkHeartbeat;
use chunk_heartbeat_ack::ChunkHeartbeatAck;
use chunk_i_forward_tsn::ChunkIForwardTsn;
use chunk_idata::ChunkIData;
use chunk_init::ChunkInit;
use chunk_payload_data::ChunkPayloadData;
use chunk_reconfig::ChunkReconfig;
use chunk_selective_ack::ChunkSelectiveAck;
use chunk_shutdown::ChunkShutdown;
use chunk_shutdown_ack::ChunkShutdownAck;
use chunk_shutdown_complete::ChunkShutdownComplete;
use chunk_unknown::ChunkUnknown;

/// The closed set of chunks that can appear in a packet. Parsing
/// dispatches on the type octet; serialization asks the variant.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Chunk {
    PayloadData(ChunkPayloadData),
    IData(ChunkIData),
    Init(ChunkInit),
    SelectiveAck(ChunkSelectiveAck),
    Heartbeat(ChunkHeartbeat),
    HeartbeatAck(ChunkHeartbeatAck),
    Abort(ChunkAbort),
    Error(ChunkError),
    Shutdown(ChunkShutdown),
    ShutdownAck(ChunkShutdownAck),
    ShutdownComplete(ChunkShutdownComplete),
    CookieEcho(ChunkCookieEcho),
    CookieAck(ChunkCookieAck),
    Reconfig(ChunkReconfig),
    ForwardTsn(ChunkForwardTsn),
    IForwardTsn(ChunkIForwardTsn),
    Unknown(ChunkUnknown),
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chunk::PayloadData(c) => c.fmt(f),
            Chunk::IData(c) => c.fmt(f),
            Chunk::Init(c) => c.fmt(f),
            Chunk::SelectiveAck(c) => c.fmt(f),
            Chunk::Heartbeat(c) => c.fmt(f),
            Chunk::HeartbeatAck(c) => c.fmt(f),
            Chunk::Abort(c) => c.fmt(f),
            Chunk::Error(c) => c.fmt(f),
            Chunk::Shutdown(c) => c.fmt(f),
            Chunk::ShutdownAck(c) => c.fmt(f),
            Chunk::ShutdownComplete(c) => c.fmt(f),
            Chunk::CookieEcho(c) => c.fmt(f),
            Chunk::CookieAck(c) => c.fmt(f),
            Chunk::Reconfig(c) => c.fmt(f),
            Chunk::ForwardTsn(c) => c.fmt(f),
            Chunk::IForwardTsn(c) => c.fmt(f),
            Chunk::Unknown(c) => c.fmt(f),
        }
    }
}

impl Chunk {
    pub(crate) fn header(&self) -> ChunkHeader {
        match self {
            Chunk::PayloadData(c) => c.header(),
            Chunk::IData(c) => c.header(),
            Chunk::Init(c) => c.header(),
            Chunk::SelectiveAck(c) => c.header(),
            Chunk::Heartbeat(c) => c.header(),
            Chunk::HeartbeatAck(c) => c.header(),
            Chunk::Abort(c) => c.header(),
            Chunk::Error(c) => c.header(),
            Chunk::Shutdown(c) => c.header(),
            Chunk::ShutdownAck(c) => c.header(),
            Chunk::ShutdownComplete(c) => c.header(),
            Chunk::CookieEcho(c) => c.header(),
            Chunk::CookieAck(c) => c.header(),
            Chunk::Reconfig(c) => c.header(),
            Chunk::ForwardTsn(c) => c.header(),
            Chunk::IForwardTsn(c) => c.header(),
            Chunk::Unknown(c) => c.header(),
        }
    }

    pub(crate) fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        match self {
            Chunk::PayloadData(c) => c.marshal_to(buf),
            Chunk::IData(c) => c.marshal_to(buf),
            Chunk::Init(c) => c.marshal_to(buf),
            Chunk::SelectiveAck(c) => c.marshal_to(buf),
            Chunk::Heartbeat(c) => c.marshal_to(buf),
            Chunk::HeartbeatAck(c) => c.marshal_to(buf),
            Chunk::Abort(c) => c.marshal_to(buf),
            Chunk::Error(c) => c.marshal_to(buf),
            Chunk::Shutdown(c) => c.marshal_to(buf),
            Chunk::ShutdownAck(c) => c.marshal_to(buf),
            Chunk::ShutdownComplete(c) => c.marshal_to(buf),
            Chunk::CookieEcho(c) => c.marshal_to(buf),
            Chunk::CookieAck(c) => c.marshal_to(buf),
            Chunk::Reconfig(c) => c.marshal_to(buf),
            Chunk::ForwardTsn(c) => c.marshal_to(buf),
            Chunk::IForwardTsn(c) => c.marshal_to(buf),
            Chunk::Unknown(c) => c.marshal_to(buf),
        }
    }

    pub(crate) fn check(&self) -> Result<()> {
        match self {
            Chunk::PayloadData(c) => c.check(),
            Chunk::IData(c) => c.check(),
            Chunk::Init(c) => c.check(),
            Chunk::SelectiveAck(c) => c.check(),
            Chunk::Heartbeat(c) => c.check(),
            Chunk::HeartbeatAck(c) => c.check(),
            Chunk::Abort(c) => c.check(),
            Chunk::Error(c) => c.check(),
            Chunk::Shutdown(c) => c.check(),
            Chunk::ShutdownAck(c) => c.check(),
            Chunk::ShutdownComplete(c) => c.check(),
            Chunk::CookieEcho(c) => c.check(),
            Chunk::CookieAck(c) => c.check(),
            Chunk::Reconfig(c) => c.check(),
            Chunk::ForwardTsn(c) => c.check(),
            Chunk::IForwardTsn(c) => c.check(),
            Chunk::Unknown(c) => c.check(),
        }
    }

    pub(crate) fn value_length(&self) -> usize {
        match self {
            Chunk::PayloadData(c) => c.value_length(),
            Chunk::IData(c) => c.value_length(),
            Chunk::Init(c) => c.value_length(),
            Chunk::SelectiveAck(c) => c.value_length(),
            Chunk::Heartbeat(c) => c.value_length(),
            Chunk::HeartbeatAck(c) => c.value_length(),
            Chunk::Abort(c) => c.value_length(),
            Chunk::Error(c) => c.value_length(),
            Chunk::Shutdown(c) => c.value_length(),
            Chunk::ShutdownAck(c) => c.value_length(),
            Chunk::ShutdownComplete(c) => c.value_length(),
            Chunk::CookieEcho(c) => c.value_length(),
            Chunk::CookieAck(c) => c.value_length(),
            Chunk::Reconfig(c) => c.value_length(),
            Chunk::ForwardTsn(c) => c.value_length(),
            Chunk::IForwardTsn(c) => c.value_length(),
            Chunk::Unknown(c) => c.value_length(),
        }
    }

    pub(crate) fn marshal(&self) -> Result<Bytes> {
        let capacity = CHUNK_HEADER_SIZE + self.value_length();
        let mut buf = BytesMut::with_capacity(capacity);
        self.marshal_to(&mut buf)?;
        Ok(buf.freeze())
    }
}
