use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::chunk_header::*;
use super::chunk_payload_data::{
    PayloadProtocolIdentifier, PAYLOAD_DATA_BEGINNING_FRAGMENT_BITMASK,
    PAYLOAD_DATA_ENDING_FRAGMENT_BITMASK, PAYLOAD_DATA_IMMEDIATE_SACK,
    PAYLOAD_DATA_UNORDERED_BITMASK,
};
use super::chunk_type::*;
use crate::error::{Error, Result};

pub(crate) const I_DATA_HEADER_SIZE: usize = 16;

/// ChunkIData represents an SCTP chunk of type I-DATA (RFC 8260).
///
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///|   Type = 64   |  Res  |I|U|B|E|       Length = Variable       |
///+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///|                              TSN                              |
///+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///|        Stream Identifier      |           Reserved            |
///+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///|                      Message Identifier                       |
///+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///|    Payload Protocol Identifier / Fragment Sequence Number     |
///+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///|                           User Data                           |
///+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///
/// The fourth word carries the PPID on the first fragment (B set) and the
/// FSN on every later fragment. FSNs count from 0, where the first
/// fragment's FSN is implicit.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct ChunkIData {
    pub(crate) unordered: bool,
    pub(crate) beginning_fragment: bool,
    pub(crate) ending_fragment: bool,
    pub(crate) immediate_sack: bool,

    pub(crate) tsn: u32,
    pub(crate) stream_identifier: u16,
    pub(crate) message_identifier: u32,
    /// Valid when `beginning_fragment` is unset; zero otherwise.
    pub(crate) fragment_sequence_number: u32,
    /// Valid when `beginning_fragment` is set.
    pub(crate) payload_type: PayloadProtocolIdentifier,
    pub(crate) user_data: Bytes,
}

impl fmt::Display for ChunkIData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\ntsn={} mid={}",
            self.header(),
            self.tsn,
            self.message_identifier
        )
    }
}

impl ChunkIData {
    pub(crate) fn header(&self) -> ChunkHeader {
        let mut flags: u8 = 0;
        if self.ending_fragment {
            flags |= PAYLOAD_DATA_ENDING_FRAGMENT_BITMASK;
        }
        if self.beginning_fragment {
            flags |= PAYLOAD_DATA_BEGINNING_FRAGMENT_BITMASK;
        }
        if self.unordered {
            flags |= PAYLOAD_DATA_UNORDERED_BITMASK;
        }
        if self.immediate_sack {
            flags |= PAYLOAD_DATA_IMMEDIATE_SACK;
        }

        ChunkHeader {
            typ: CT_I_DATA,
            flags,
            value_length: self.value_length() as u16,
        }
    }

    pub(crate) fn unmarshal(raw: &Bytes) -> Result<Self> {
        let header = ChunkHeader::unmarshal(raw)?;

        if header.typ != CT_I_DATA {
            return Err(Error::ErrChunkTypeUnexpected);
        }

        let immediate_sack = (header.flags & PAYLOAD_DATA_IMMEDIATE_SACK) != 0;
        let unordered = (header.flags & PAYLOAD_DATA_UNORDERED_BITMASK) != 0;
        let beginning_fragment = (header.flags & PAYLOAD_DATA_BEGINNING_FRAGMENT_BITMASK) != 0;
        let ending_fragment = (header.flags & PAYLOAD_DATA_ENDING_FRAGMENT_BITMASK) != 0;

        if header.value_length() < I_DATA_HEADER_SIZE {
            return Err(Error::ErrChunkTooShort);
        }

        let reader = &mut raw.slice(CHUNK_HEADER_SIZE..CHUNK_HEADER_SIZE + header.value_length());

        let tsn = reader.get_u32();
        let stream_identifier = reader.get_u16();
        let _reserved = reader.get_u16();
        let message_identifier = reader.get_u32();
        let ppid_or_fsn = reader.get_u32();
        let user_data = raw.slice(
            CHUNK_HEADER_SIZE + I_DATA_HEADER_SIZE..CHUNK_HEADER_SIZE + header.value_length(),
        );

        Ok(ChunkIData {
            unordered,
            beginning_fragment,
            ending_fragment,
            immediate_sack,

            tsn,
            stream_identifier,
            message_identifier,
            fragment_sequence_number: if beginning_fragment { 0 } else { ppid_or_fsn },
            payload_type: if beginning_fragment {
                ppid_or_fsn.into()
            } else {
                PayloadProtocolIdentifier::Unknown(0)
            },
            user_data,
        })
    }

    pub(crate) fn marshal_to(&self, writer: &mut BytesMut) -> Result<usize> {
        self.header().marshal_to(writer)?;

        writer.put_u32(self.tsn);
        writer.put_u16(self.stream_identifier);
        writer.put_u16(0); // reserved
        writer.put_u32(self.message_identifier);
        if self.beginning_fragment {
            writer.put_u32(self.payload_type.into());
        } else {
            writer.put_u32(self.fragment_sequence_number);
        }
        writer.extend_from_slice(&self.user_data);

        Ok(writer.len())
    }

    pub(crate) fn check(&self) -> Result<()> {
        Ok(())
    }

    pub(crate) fn value_length(&self) -> usize {
        I_DATA_HEADER_SIZE + self.user_data.len()
    }
}
