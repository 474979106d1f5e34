use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::chunk_forward_tsn::NEW_CUMULATIVE_TSN_LENGTH;
use super::chunk_header::*;
use super::chunk_type::*;
use crate::error::{Error, Result};

pub(crate) const I_FORWARD_TSN_STREAM_ENTRY_LENGTH: usize = 8;

/// ChunkIForwardTsn represents an SCTP chunk of type I-FORWARD-TSN
/// (RFC 8260).
///
/// Same purpose as FORWARD-TSN but each skipped entry carries a 32-bit
/// message identifier and an explicit unordered flag instead of a 16-bit
/// SSN.
///
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///|   Type = 194  |  Flags = 0x00 |        Length = Variable      |
///+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///|                      New Cumulative TSN                       |
///+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///|       Stream Identifier       |     Reserved              |U  |
///+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///|                    Message Identifier (MID)                   |
///+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
#[derive(Default, Debug, Clone, PartialEq)]
pub(crate) struct ChunkIForwardTsn {
    pub(crate) new_cumulative_tsn: u32,
    pub(crate) streams: Vec<ChunkIForwardTsnStream>,
}

impl fmt::Display for ChunkIForwardTsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut res = vec![self.header().to_string()];
        res.push(format!("New Cumulative TSN: {}", self.new_cumulative_tsn));
        for s in &self.streams {
            res.push(format!(
                " - si={}, unordered={}, mid={}",
                s.identifier, s.unordered, s.message_identifier
            ));
        }
        write!(f, "{}", res.join("\n"))
    }
}

impl ChunkIForwardTsn {
    pub(crate) fn header(&self) -> ChunkHeader {
        ChunkHeader {
            typ: CT_I_FORWARD_TSN,
            flags: 0,
            value_length: self.value_length() as u16,
        }
    }

    pub(crate) fn unmarshal(buf: &Bytes) -> Result<Self> {
        let header = ChunkHeader::unmarshal(buf)?;

        if header.typ != CT_I_FORWARD_TSN {
            return Err(Error::ErrChunkTypeUnexpected);
        }

        if header.value_length() < NEW_CUMULATIVE_TSN_LENGTH {
            return Err(Error::ErrChunkTooShort);
        }

        let end = CHUNK_HEADER_SIZE + header.value_length();
        let reader = &mut buf.slice(CHUNK_HEADER_SIZE..end);
        let new_cumulative_tsn = reader.get_u32();

        let mut streams = vec![];
        let mut offset = CHUNK_HEADER_SIZE + NEW_CUMULATIVE_TSN_LENGTH;
        while offset + I_FORWARD_TSN_STREAM_ENTRY_LENGTH <= end {
            let entry = &mut buf.slice(offset..end);
            let identifier = entry.get_u16();
            let _reserved = entry.get_u8();
            let flags = entry.get_u8();
            let message_identifier = entry.get_u32();
            streams.push(ChunkIForwardTsnStream {
                identifier,
                unordered: (flags & 0x01) != 0,
                message_identifier,
            });
            offset += I_FORWARD_TSN_STREAM_ENTRY_LENGTH;
        }

        Ok(ChunkIForwardTsn {
            new_cumulative_tsn,
            streams,
        })
    }

    pub(crate) fn marshal_to(&self, writer: &mut BytesMut) -> Result<usize> {
        self.header().marshal_to(writer)?;

        writer.put_u32(self.new_cumulative_tsn);
        for s in &self.streams {
            writer.put_u16(s.identifier);
            writer.put_u8(0); // reserved
            writer.put_u8(if s.unordered { 0x01 } else { 0x00 });
            writer.put_u32(s.message_identifier);
        }

        Ok(writer.len())
    }

    pub(crate) fn check(&self) -> Result<()> {
        Ok(())
    }

    pub(crate) fn value_length(&self) -> usize {
        NEW_CUMULATIVE_TSN_LENGTH + I_FORWARD_TSN_STREAM_ENTRY_LENGTH * self.streams.len()
    }
}

/// A skipped (stream, unordered, MID) coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChunkIForwardTsnStream {
    pub(crate) identifier: u16,
    pub(crate) unordered: bool,
    pub(crate) message_identifier: u32,
}
