use std::fmt;

use bytes::{Bytes, BytesMut};

use super::chunk_header::*;
use super::chunk_type::ChunkType;
use crate::error::Result;

/// A chunk of a type this implementation does not understand, kept as raw
/// bytes so it can be reported back to the peer when its type asks for it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ChunkUnknown {
    pub(crate) typ: u8,
    pub(crate) flags: u8,
    pub(crate) value: Bytes,
}

impl fmt::Display for ChunkUnknown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown Chunk type={} len={}", self.typ, self.value.len())
    }
}

impl ChunkUnknown {
    pub(crate) fn header(&self) -> ChunkHeader {
        ChunkHeader {
            typ: ChunkType(self.typ),
            flags: self.flags,
            value_length: self.value.len() as u16,
        }
    }

    pub(crate) fn unmarshal(raw: &Bytes) -> Result<Self> {
        let header = ChunkHeader::unmarshal(raw)?;
        let value = raw.slice(CHUNK_HEADER_SIZE..CHUNK_HEADER_SIZE + header.value_length());
        Ok(ChunkUnknown {
            typ: header.typ.0,
            flags: header.flags,
            value,
        })
    }

    pub(crate) fn marshal_to(&self, writer: &mut BytesMut) -> Result<usize> {
        self.header().marshal_to(writer)?;
        writer.extend_from_slice(&self.value);
        Ok(writer.len())
    }

    pub(crate) fn check(&self) -> Result<()> {
        Ok(())
    }

    pub(crate) fn value_length(&self) -> usize {
        self.value.len()
    }
}
