use std::fmt;

/// ChunkType identifies the kind of information carried in a chunk value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub(crate) struct ChunkType(pub(crate) u8);

pub(crate) const CT_PAYLOAD_DATA: ChunkType = ChunkType(0);
pub(crate) const CT_INIT: ChunkType = ChunkType(1);
pub(crate) const CT_INIT_ACK: ChunkType = ChunkType(2);
pub(crate) const CT_SACK: ChunkType = ChunkType(3);
pub(crate) const CT_HEARTBEAT: ChunkType = ChunkType(4);
pub(crate) const CT_HEARTBEAT_ACK: ChunkType = ChunkType(5);
pub(crate) const CT_ABORT: ChunkType = ChunkType(6);
pub(crate) const CT_SHUTDOWN: ChunkType = ChunkType(7);
pub(crate) const CT_SHUTDOWN_ACK: ChunkType = ChunkType(8);
pub(crate) const CT_ERROR: ChunkType = ChunkType(9);
pub(crate) const CT_COOKIE_ECHO: ChunkType = ChunkType(10);
pub(crate) const CT_COOKIE_ACK: ChunkType = ChunkType(11);
pub(crate) const CT_SHUTDOWN_COMPLETE: ChunkType = ChunkType(14);
pub(crate) const CT_I_DATA: ChunkType = ChunkType(64);
pub(crate) const CT_RECONFIG: ChunkType = ChunkType(130);
pub(crate) const CT_FORWARD_TSN: ChunkType = ChunkType(192);
pub(crate) const CT_I_FORWARD_TSN: ChunkType = ChunkType(194);

/// What to do with a chunk whose type is not recognized, derived from the
/// two high bits of the type per RFC 4960 section 3.2.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum UnrecognizedChunkAction {
    /// 00 - stop processing and discard the whole packet.
    Stop,
    /// 01 - discard the packet, but report the chunk in an ERROR.
    StopAndReport,
    /// 10 - skip this chunk and continue.
    Skip,
    /// 11 - skip this chunk, continue, and report it.
    SkipAndReport,
}

impl ChunkType {
    pub(crate) fn unrecognized_action(&self) -> UnrecognizedChunkAction {
        match self.0 >> 6 {
            0b00 => UnrecognizedChunkAction::Stop,
            0b01 => UnrecognizedChunkAction::StopAndReport,
            0b10 => UnrecognizedChunkAction::Skip,
            _ => UnrecognizedChunkAction::SkipAndReport,
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let others = format!("Unknown ChunkType: {}", self.0);
        let s = match *self {
            CT_PAYLOAD_DATA => "DATA",
            CT_INIT => "INIT",
            CT_INIT_ACK => "INIT-ACK",
            CT_SACK => "SACK",
            CT_HEARTBEAT => "HEARTBEAT",
            CT_HEARTBEAT_ACK => "HEARTBEAT-ACK",
            CT_ABORT => "ABORT",
            CT_SHUTDOWN => "SHUTDOWN",
            CT_SHUTDOWN_ACK => "SHUTDOWN-ACK",
            CT_ERROR => "ERROR",
            CT_COOKIE_ECHO => "COOKIE-ECHO",
            CT_COOKIE_ACK => "COOKIE-ACK",
            CT_SHUTDOWN_COMPLETE => "SHUTDOWN-COMPLETE",
            CT_I_DATA => "I-DATA",
            CT_RECONFIG => "RECONFIG",
            CT_FORWARD_TSN => "FORWARD-TSN",
            CT_I_FORWARD_TSN => "I-FORWARD-TSN",
            _ => others.as_str(),
        };
        write!(f, "{s}")
    }
}
