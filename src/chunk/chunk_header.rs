use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::chunk_type::ChunkType;
use crate::error::{Error, Result};

/// The type-flags-length prefix every chunk starts with.
///
/// The length covers the header and value but never the trailing padding,
/// which is 0-3 zero bytes up to the next 4-byte boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChunkHeader {
    pub(crate) typ: ChunkType,
    pub(crate) flags: u8,
    pub(crate) value_length: u16,
}

pub(crate) const CHUNK_HEADER_SIZE: usize = 4;

impl fmt::Display for ChunkHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.typ)
    }
}

impl ChunkHeader {
    pub(crate) fn unmarshal(raw: &Bytes) -> Result<Self> {
        if raw.len() < CHUNK_HEADER_SIZE {
            return Err(Error::ErrChunkHeaderTooSmall);
        }

        let reader = &mut raw.clone();

        let typ = ChunkType(reader.get_u8());
        let flags = reader.get_u8();
        let length = reader.get_u16();

        if (length as usize) < CHUNK_HEADER_SIZE {
            return Err(Error::ErrChunkHeaderInvalidLength);
        }
        if (length as usize) > raw.len() {
            return Err(Error::ErrChunkHeaderNotEnoughSpace);
        }

        // When this chunk is not the last of its packet, the buffer also
        // holds the padding. It must be all zero, and at most 3 bytes.
        let value_length = length as usize - CHUNK_HEADER_SIZE;
        let trailing = raw.len() - length as usize;
        if trailing > 0 && trailing < PADDING_CHECK_LIMIT {
            for i in 0..trailing {
                if raw[length as usize + i] != 0 {
                    return Err(Error::ErrChunkHeaderPaddingNonZero);
                }
            }
        }

        Ok(ChunkHeader {
            typ,
            flags,
            value_length: value_length as u16,
        })
    }

    pub(crate) fn marshal_to(&self, writer: &mut BytesMut) -> Result<usize> {
        writer.put_u8(self.typ.0);
        writer.put_u8(self.flags);
        writer.put_u16(self.value_length + CHUNK_HEADER_SIZE as u16);
        Ok(writer.len())
    }

    pub(crate) fn value_length(&self) -> usize {
        self.value_length as usize
    }
}

const PADDING_CHECK_LIMIT: usize = 4;

#[cfg(test)]
mod test {
    use super::*;
    use crate::chunk::chunk_type::CT_SACK;

    #[test]
    fn test_header_round_trip() -> Result<()> {
        let header = ChunkHeader {
            typ: CT_SACK,
            flags: 0,
            value_length: 12,
        };
        let mut buf = BytesMut::new();
        header.marshal_to(&mut buf)?;
        buf.extend_from_slice(&[0u8; 12]);
        let parsed = ChunkHeader::unmarshal(&buf.freeze())?;
        assert_eq!(parsed, header);
        Ok(())
    }

    #[test]
    fn test_header_rejects_truncation() {
        assert_eq!(
            ChunkHeader::unmarshal(&Bytes::from_static(&[3, 0])),
            Err(Error::ErrChunkHeaderTooSmall)
        );
        // Claims 8 bytes of length in a 4-byte buffer.
        assert_eq!(
            ChunkHeader::unmarshal(&Bytes::from_static(&[3, 0, 0, 8])),
            Err(Error::ErrChunkHeaderNotEnoughSpace)
        );
        // Length smaller than the header itself.
        assert_eq!(
            ChunkHeader::unmarshal(&Bytes::from_static(&[3, 0, 0, 2])),
            Err(Error::ErrChunkHeaderInvalidLength)
        );
    }

    #[test]
    fn test_header_rejects_nonzero_padding() {
        // 5-byte value followed by padding 0x00 0x00 0x01.
        let raw = Bytes::from_static(&[3, 0, 0, 9, 1, 2, 3, 4, 5, 0, 0, 1]);
        assert_eq!(
            ChunkHeader::unmarshal(&raw),
            Err(Error::ErrChunkHeaderPaddingNonZero)
        );
    }
}
