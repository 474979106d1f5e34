use std::fmt;

use bytes::{Bytes, BytesMut};

use super::chunk_header::*;
use super::chunk_type::*;
use crate::error::{Error, Result};
use crate::param::param_header::PARAM_HEADER_LENGTH;
use crate::param::param_heartbeat_info::ParamHeartbeatInfo;
use crate::param::{build_param, Param};

/// ChunkHeartbeatAck represents an SCTP chunk of type HEARTBEAT-ACK. It
/// must carry exactly the Heartbeat Info the HEARTBEAT carried.
#[derive(Default, Debug, Clone, PartialEq)]
pub(crate) struct ChunkHeartbeatAck {
    pub(crate) info: ParamHeartbeatInfo,
}

impl fmt::Display for ChunkHeartbeatAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header())
    }
}

impl ChunkHeartbeatAck {
    pub(crate) fn header(&self) -> ChunkHeader {
        ChunkHeader {
            typ: CT_HEARTBEAT_ACK,
            flags: 0,
            value_length: self.value_length() as u16,
        }
    }

    pub(crate) fn unmarshal(raw: &Bytes) -> Result<Self> {
        let header = ChunkHeader::unmarshal(raw)?;

        if header.typ != CT_HEARTBEAT_ACK {
            return Err(Error::ErrChunkTypeUnexpected);
        }

        if header.value_length() < PARAM_HEADER_LENGTH {
            return Err(Error::ErrChunkTooShort);
        }

        let slice = raw.slice(CHUNK_HEADER_SIZE..CHUNK_HEADER_SIZE + header.value_length());
        match build_param(&slice)? {
            Some(Param::HeartbeatInfo(info)) => Ok(ChunkHeartbeatAck { info }),
            _ => Err(Error::ErrParamTypeUnexpected),
        }
    }

    pub(crate) fn marshal_to(&self, writer: &mut BytesMut) -> Result<usize> {
        self.header().marshal_to(writer)?;
        self.info.marshal_to(writer)?;
        Ok(writer.len())
    }

    pub(crate) fn check(&self) -> Result<()> {
        Ok(())
    }

    pub(crate) fn value_length(&self) -> usize {
        PARAM_HEADER_LENGTH + self.info.value_length()
    }
}
