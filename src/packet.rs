use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::chunk::chunk_abort::ChunkAbort;
use crate::chunk::chunk_cookie_ack::ChunkCookieAck;
use crate::chunk::chunk_cookie_echo::ChunkCookieEcho;
use crate::chunk::chunk_error::ChunkError;
use crate::chunk::chunk_forward_tsn::ChunkForwardTsn;
use crate::chunk::chunk_header::*;
use crate::chunk::chunk_heartbeat::ChunkHeartbeat;
use crate::chunk::chunk_heartbeat_ack::ChunkHeartbeatAck;
use crate::chunk::chunk_i_forward_tsn::ChunkIForwardTsn;
use crate::chunk::chunk_idata::ChunkIData;
use crate::chunk::chunk_init::ChunkInit;
use crate::chunk::chunk_payload_data::ChunkPayloadData;
use crate::chunk::chunk_reconfig::ChunkReconfig;
use crate::chunk::chunk_selective_ack::ChunkSelectiveAck;
use crate::chunk::chunk_shutdown::ChunkShutdown;
use crate::chunk::chunk_shutdown_ack::ChunkShutdownAck;
use crate::chunk::chunk_shutdown_complete::ChunkShutdownComplete;
use crate::chunk::chunk_type::*;
use crate::chunk::chunk_unknown::ChunkUnknown;
use crate::chunk::Chunk;
use crate::error::{Error, Result};
use crate::util::*;

/// Packet represents an SCTP packet: a common header followed by chunks.
///
///SCTP Common Header Format
///
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///|       Source Port Number      |    Destination Port Number    |
///+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///|                      Verification Tag                         |
///+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///|                           Checksum                            |
///+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
#[derive(Default, Debug)]
pub(crate) struct Packet {
    pub(crate) source_port: u16,
    pub(crate) destination_port: u16,
    pub(crate) verification_tag: u32,
    pub(crate) chunks: Vec<Chunk>,
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut res = format!(
            "Packet: sourcePort={} destinationPort={} verificationTag={}",
            self.source_port, self.destination_port, self.verification_tag,
        );
        for chunk in &self.chunks {
            res += format!("\nChunk: {chunk}").as_str();
        }
        write!(f, "{res}")
    }
}

pub(crate) const PACKET_HEADER_SIZE: usize = 12;

impl Packet {
    /// Parses a packet, verifying the checksum unless told not to.
    ///
    /// `accept_zero_checksum` permits an all-zero checksum field, which is
    /// only legal once the zero-checksum capability was negotiated.
    pub(crate) fn unmarshal(
        raw: &Bytes,
        checksum_verification: bool,
        accept_zero_checksum: bool,
    ) -> Result<Self> {
        if raw.len() < PACKET_HEADER_SIZE {
            return Err(Error::ErrPacketRawTooSmall);
        }

        let reader = &mut raw.clone();

        let source_port = reader.get_u16();
        let destination_port = reader.get_u16();
        let verification_tag = reader.get_u32();
        let their_checksum = reader.get_u32_le();

        if checksum_verification && !(accept_zero_checksum && their_checksum == 0) {
            let our_checksum = generate_packet_checksum(raw);
            if their_checksum != our_checksum {
                return Err(Error::ErrChecksumMismatch);
            }
        }

        let mut chunks = vec![];
        let mut offset = PACKET_HEADER_SIZE;
        loop {
            // Exact match, no more chunks
            if offset == raw.len() {
                break;
            } else if offset + CHUNK_HEADER_SIZE > raw.len() {
                return Err(Error::ErrParseSctpChunkNotEnoughData);
            }

            let rest = raw.slice(offset..);
            let ct = ChunkType(raw[offset]);
            let c = match ct {
                CT_PAYLOAD_DATA => Some(Chunk::PayloadData(ChunkPayloadData::unmarshal(&rest)?)),
                CT_I_DATA => Some(Chunk::IData(ChunkIData::unmarshal(&rest)?)),
                CT_INIT | CT_INIT_ACK => Some(Chunk::Init(ChunkInit::unmarshal(&rest)?)),
                CT_SACK => Some(Chunk::SelectiveAck(ChunkSelectiveAck::unmarshal(&rest)?)),
                CT_HEARTBEAT => Some(Chunk::Heartbeat(ChunkHeartbeat::unmarshal(&rest)?)),
                CT_HEARTBEAT_ACK => Some(Chunk::HeartbeatAck(ChunkHeartbeatAck::unmarshal(&rest)?)),
                CT_ABORT => Some(Chunk::Abort(ChunkAbort::unmarshal(&rest)?)),
                CT_ERROR => Some(Chunk::Error(ChunkError::unmarshal(&rest)?)),
                CT_SHUTDOWN => Some(Chunk::Shutdown(ChunkShutdown::unmarshal(&rest)?)),
                CT_SHUTDOWN_ACK => Some(Chunk::ShutdownAck(ChunkShutdownAck::unmarshal(&rest)?)),
                CT_SHUTDOWN_COMPLETE => Some(Chunk::ShutdownComplete(
                    ChunkShutdownComplete::unmarshal(&rest)?,
                )),
                CT_COOKIE_ECHO => Some(Chunk::CookieEcho(ChunkCookieEcho::unmarshal(&rest)?)),
                CT_COOKIE_ACK => Some(Chunk::CookieAck(ChunkCookieAck::unmarshal(&rest)?)),
                CT_RECONFIG => Some(Chunk::Reconfig(ChunkReconfig::unmarshal(&rest)?)),
                CT_FORWARD_TSN => Some(Chunk::ForwardTsn(ChunkForwardTsn::unmarshal(&rest)?)),
                CT_I_FORWARD_TSN => Some(Chunk::IForwardTsn(ChunkIForwardTsn::unmarshal(&rest)?)),
                _ => match ct.unrecognized_action() {
                    UnrecognizedChunkAction::Stop => {
                        return Err(Error::ErrUnrecognizedChunkType);
                    }
                    UnrecognizedChunkAction::StopAndReport | UnrecognizedChunkAction::SkipAndReport => {
                        // Kept so the association can answer with an ERROR.
                        Some(Chunk::Unknown(ChunkUnknown::unmarshal(&rest)?))
                    }
                    UnrecognizedChunkAction::Skip => {
                        let _ = ChunkUnknown::unmarshal(&rest)?;
                        None
                    }
                },
            };

            let value_length = match &c {
                Some(c) => c.value_length(),
                None => ChunkHeader::unmarshal(&rest)?.value_length(),
            };
            let chunk_value_padding = get_padding_size(value_length);
            offset += CHUNK_HEADER_SIZE + value_length + chunk_value_padding;
            if let Some(c) = c {
                chunks.push(c);
            }
        }

        Ok(Packet {
            source_port,
            destination_port,
            verification_tag,
            chunks,
        })
    }

    /// Serializes the packet. With `with_checksum` unset the checksum field
    /// stays zero (zero-checksum negotiated).
    pub(crate) fn marshal_to(&self, writer: &mut BytesMut, with_checksum: bool) -> Result<usize> {
        writer.put_u16(self.source_port);
        writer.put_u16(self.destination_port);
        writer.put_u32(self.verification_tag);

        // The checksum is filled in once the chunks are in place.
        let checksum_pos = writer.len();
        writer.extend_from_slice(&[0, 0, 0, 0]);

        for c in &self.chunks {
            c.marshal_to(writer)?;

            let padding_needed = get_padding_size(writer.len());
            if padding_needed != 0 {
                writer.extend_from_slice(&[0u8; PADDING_MULTIPLE][..padding_needed]);
            }
        }

        if with_checksum {
            let mut digest = ISCSI_CRC.digest();
            digest.update(writer);
            let checksum = digest.finalize();

            // The CRC is already big-endian; writing it little-endian keeps
            // it from being flipped.
            let checksum_place = &mut writer[checksum_pos..checksum_pos + 4];
            checksum_place.copy_from_slice(&checksum.to_le_bytes());
        }

        Ok(writer.len())
    }

    pub(crate) fn marshal(&self, with_checksum: bool) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(PACKET_HEADER_SIZE);
        self.marshal_to(&mut buf, with_checksum)?;
        Ok(buf.freeze())
    }
}

impl Packet {
    pub(crate) fn check_packet(&self) -> Result<()> {
        // Port number 0 is not allowed in either direction.
        if self.source_port == 0 {
            return Err(Error::ErrSctpPacketSourcePortZero);
        }
        if self.destination_port == 0 {
            return Err(Error::ErrSctpPacketDestinationPortZero);
        }

        for c in &self.chunks {
            if let Chunk::Init(ci) = c {
                if !ci.is_ack {
                    // INIT must be the only chunk in its packet and must
                    // travel with a zero verification tag.
                    if self.chunks.len() != 1 {
                        return Err(Error::ErrInitChunkBundled);
                    }
                    if self.verification_tag != 0 {
                        return Err(Error::ErrInitChunkVerifyTagNotZero);
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_packet_unmarshal() -> Result<()> {
        let result = Packet::unmarshal(&Bytes::new(), true, false);
        assert!(
            result.is_err(),
            "Unmarshal should fail when a packet is too small to be SCTP"
        );

        let header_only = Bytes::from_static(&[
            0x13, 0x88, 0x13, 0x88, 0x00, 0x00, 0x00, 0x00, 0x06, 0xa9, 0x00, 0xe1,
        ]);
        let pkt = Packet::unmarshal(&header_only, true, false)?;
        assert_eq!(pkt.source_port, 5000);
        assert_eq!(pkt.destination_port, 5000);
        assert_eq!(pkt.verification_tag, 0);
        assert!(pkt.chunks.is_empty());

        Ok(())
    }

    #[test]
    fn test_packet_marshal_round_trip() -> Result<()> {
        let pkt = Packet {
            source_port: 5000,
            destination_port: 5000,
            verification_tag: 0x11223344,
            chunks: vec![Chunk::CookieAck(ChunkCookieAck)],
        };
        let raw = pkt.marshal(true)?;
        let parsed = Packet::unmarshal(&raw, true, false)?;
        assert_eq!(parsed.source_port, 5000);
        assert_eq!(parsed.verification_tag, 0x11223344);
        assert_eq!(parsed.chunks.len(), 1);
        Ok(())
    }

    #[test]
    fn test_packet_checksum_detects_corruption() -> Result<()> {
        let pkt = Packet {
            source_port: 5000,
            destination_port: 5000,
            verification_tag: 1,
            chunks: vec![Chunk::CookieAck(ChunkCookieAck)],
        };
        let raw = pkt.marshal(true)?;

        // Flipping any single bit must be caught.
        for i in 0..raw.len() * 8 {
            let mut corrupted = BytesMut::from(&raw[..]);
            corrupted[i / 8] ^= 1 << (i % 8);
            let result = Packet::unmarshal(&corrupted.freeze(), true, false);
            assert!(result.is_err(), "corruption at bit {i} went unnoticed");
        }

        // With verification disabled the same corruption parses (as long
        // as the chunk structure stays intact).
        let mut corrupted = BytesMut::from(&raw[..]);
        corrupted[8] ^= 0xff;
        assert!(Packet::unmarshal(&corrupted.freeze(), false, false).is_ok());
        Ok(())
    }

    #[test]
    fn test_packet_zero_checksum_accepted_when_negotiated() -> Result<()> {
        let pkt = Packet {
            source_port: 5000,
            destination_port: 5000,
            verification_tag: 1,
            chunks: vec![Chunk::CookieAck(ChunkCookieAck)],
        };
        let raw = pkt.marshal(false)?;
        assert!(Packet::unmarshal(&raw, true, false).is_err());
        assert!(Packet::unmarshal(&raw, true, true).is_ok());
        Ok(())
    }

    #[test]
    fn test_init_must_not_be_bundled() -> Result<()> {
        let init = ChunkInit {
            is_ack: false,
            initiate_tag: 1,
            advertised_receiver_window_credit: 1500,
            num_outbound_streams: 1,
            num_inbound_streams: 1,
            initial_tsn: 0,
            params: vec![],
        };
        let pkt = Packet {
            source_port: 5000,
            destination_port: 5000,
            verification_tag: 0,
            chunks: vec![Chunk::Init(init), Chunk::CookieAck(ChunkCookieAck)],
        };
        assert_eq!(pkt.check_packet(), Err(Error::ErrInitChunkBundled));
        Ok(())
    }
}
