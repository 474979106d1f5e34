use std::fmt;

use bytes::{Bytes, BytesMut};

use super::chunk_header::*;
use super::chunk_type::*;
use crate::error::{Error, Result};

pub(crate) const SHUTDOWN_COMPLETE_FLAG_TBIT: u8 = 1;

/// ChunkShutdownComplete represents an SCTP chunk of type
/// SHUTDOWN-COMPLETE. The T bit mirrors the ABORT rule for reflected
/// verification tags.
#[derive(Default, Debug, Clone, PartialEq)]
pub(crate) struct ChunkShutdownComplete {
    pub(crate) reflected_tag: bool,
}

impl fmt::Display for ChunkShutdownComplete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header())
    }
}

impl ChunkShutdownComplete {
    pub(crate) fn header(&self) -> ChunkHeader {
        ChunkHeader {
            typ: CT_SHUTDOWN_COMPLETE,
            flags: if self.reflected_tag {
                SHUTDOWN_COMPLETE_FLAG_TBIT
            } else {
                0
            },
            value_length: self.value_length() as u16,
        }
    }

    pub(crate) fn unmarshal(raw: &Bytes) -> Result<Self> {
        let header = ChunkHeader::unmarshal(raw)?;

        if header.typ != CT_SHUTDOWN_COMPLETE {
            return Err(Error::ErrChunkTypeUnexpected);
        }

        Ok(ChunkShutdownComplete {
            reflected_tag: (header.flags & SHUTDOWN_COMPLETE_FLAG_TBIT) != 0,
        })
    }

    pub(crate) fn marshal_to(&self, writer: &mut BytesMut) -> Result<usize> {
        self.header().marshal_to(writer)?;
        Ok(writer.len())
    }

    pub(crate) fn check(&self) -> Result<()> {
        Ok(())
    }

    pub(crate) fn value_length(&self) -> usize {
        0
    }
}
