use bytes::{Bytes, BytesMut};

use super::chunk_abort::*;
use super::chunk_cookie_ack::*;
use super::chunk_cookie_echo::*;
use super::chunk_error::*;
use super::chunk_forward_tsn::*;
use super::chunk_header::*;
use super::chunk_heartbeat::*;
use super::chunk_heartbeat_ack::*;
use super::chunk_i_forward_tsn::*;
use super::chunk_idata::*;
use super::chunk_init::*;
use super::chunk_payload_data::*;
use super::chunk_reconfig::*;
use super::chunk_selective_ack::*;
use super::chunk_shutdown::*;
use super::chunk_shutdown_ack::*;
use super::chunk_shutdown_complete::*;
use crate::error::{Error, Result};
use crate::error_cause::ErrorCause;
use crate::param::param_heartbeat_info::ParamHeartbeatInfo;
use crate::param::param_outgoing_reset_request::ParamOutgoingResetRequest;
use crate::param::param_reconfig_response::{ParamReconfigResponse, ReconfigResult};
use crate::param::param_state_cookie::ParamStateCookie;
use crate::param::Param;

#[test]
fn test_payload_data_round_trip() -> Result<()> {
    let chunk = ChunkPayloadData {
        unordered: false,
        beginning_fragment: true,
        ending_fragment: false,
        immediate_sack: true,
        tsn: 0xfffffffe,
        stream_identifier: 7,
        stream_sequence_number: 42,
        payload_type: PayloadProtocolIdentifier::Binary,
        user_data: Bytes::from_static(b"hello world"),
    };
    let mut buf = BytesMut::new();
    chunk.marshal_to(&mut buf)?;
    let parsed = ChunkPayloadData::unmarshal(&buf.freeze())?;
    assert_eq!(parsed, chunk);
    Ok(())
}

#[test]
fn test_payload_data_parses_known_bytes() -> Result<()> {
    // Type 0, flags U|B|E, length 17, TSN 1, stream 2, SSN 3, PPID 53,
    // payload "abcde".
    let raw = Bytes::from_static(&[
        0x00, 0x07, 0x00, 0x15, 0x00, 0x00, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x00, 0x00,
        0x35, b'a', b'b', b'c', b'd', b'e',
    ]);
    let parsed = ChunkPayloadData::unmarshal(&raw)?;
    assert!(parsed.unordered);
    assert!(parsed.beginning_fragment);
    assert!(parsed.ending_fragment);
    assert!(!parsed.immediate_sack);
    assert_eq!(parsed.tsn, 1);
    assert_eq!(parsed.stream_identifier, 2);
    assert_eq!(parsed.stream_sequence_number, 3);
    assert_eq!(parsed.payload_type, PayloadProtocolIdentifier::Binary);
    assert_eq!(&parsed.user_data[..], b"abcde");
    Ok(())
}

#[test]
fn test_payload_data_rejects_short_value() {
    let raw = Bytes::from_static(&[0x00, 0x03, 0x00, 0x08, 0x00, 0x00, 0x00, 0x01]);
    assert_eq!(
        ChunkPayloadData::unmarshal(&raw),
        Err(Error::ErrChunkTooShort)
    );
}

#[test]
fn test_idata_round_trip_beginning() -> Result<()> {
    let chunk = ChunkIData {
        unordered: true,
        beginning_fragment: true,
        ending_fragment: false,
        immediate_sack: false,
        tsn: 1234,
        stream_identifier: 9,
        message_identifier: 77,
        fragment_sequence_number: 0,
        payload_type: PayloadProtocolIdentifier::String,
        user_data: Bytes::from_static(b"fragment zero"),
    };
    let mut buf = BytesMut::new();
    chunk.marshal_to(&mut buf)?;
    let parsed = ChunkIData::unmarshal(&buf.freeze())?;
    assert_eq!(parsed, chunk);
    Ok(())
}

#[test]
fn test_idata_round_trip_middle_carries_fsn() -> Result<()> {
    let chunk = ChunkIData {
        unordered: false,
        beginning_fragment: false,
        ending_fragment: true,
        immediate_sack: false,
        tsn: 1235,
        stream_identifier: 9,
        message_identifier: 77,
        fragment_sequence_number: 3,
        payload_type: PayloadProtocolIdentifier::Unknown(0),
        user_data: Bytes::from_static(b"last fragment"),
    };
    let mut buf = BytesMut::new();
    chunk.marshal_to(&mut buf)?;
    let parsed = ChunkIData::unmarshal(&buf.freeze())?;
    assert_eq!(parsed.fragment_sequence_number, 3);
    assert_eq!(parsed, chunk);
    Ok(())
}

#[test]
fn test_init_round_trip_with_params() -> Result<()> {
    let chunk = ChunkInit {
        is_ack: true,
        initiate_tag: 0xdeadbeef,
        advertised_receiver_window_credit: 512 * 1024,
        num_outbound_streams: 1024,
        num_inbound_streams: 2048,
        initial_tsn: 91,
        params: vec![
            Param::StateCookie(ParamStateCookie {
                cookie: Bytes::from_static(b"not a real cookie"),
            }),
            Param::HeartbeatInfo(ParamHeartbeatInfo {
                heartbeat_information: Bytes::from_static(&[1, 2, 3]),
            }),
        ],
    };
    let mut buf = BytesMut::new();
    chunk.marshal_to(&mut buf)?;
    let parsed = ChunkInit::unmarshal(&buf.freeze())?;
    assert_eq!(parsed, chunk);
    Ok(())
}

#[test]
fn test_init_check_rejects_zero_tag() {
    let chunk = ChunkInit {
        is_ack: false,
        initiate_tag: 0,
        advertised_receiver_window_credit: 1500,
        num_outbound_streams: 1,
        num_inbound_streams: 1,
        initial_tsn: 0,
        params: vec![],
    };
    assert_eq!(chunk.check(), Err(Error::ErrChunkTypeInitInitiateTagZero));
}

#[test]
fn test_init_rejects_nonzero_flags() -> Result<()> {
    let chunk = ChunkInit {
        is_ack: false,
        initiate_tag: 1,
        advertised_receiver_window_credit: 1500,
        num_outbound_streams: 1,
        num_inbound_streams: 1,
        initial_tsn: 0,
        params: vec![],
    };
    let mut buf = BytesMut::new();
    chunk.marshal_to(&mut buf)?;
    buf[1] = 0x01;
    assert_eq!(
        ChunkInit::unmarshal(&buf.freeze()),
        Err(Error::ErrChunkTypeInitFlagZero)
    );
    Ok(())
}

#[test]
fn test_sack_round_trip() -> Result<()> {
    let chunk = ChunkSelectiveAck {
        cumulative_tsn_ack: 1000,
        advertised_receiver_window_credit: 65536,
        gap_ack_blocks: vec![
            GapAckBlock { start: 2, end: 3 },
            GapAckBlock { start: 6, end: 6 },
        ],
        duplicate_tsn: vec![999, 998],
    };
    let mut buf = BytesMut::new();
    chunk.marshal_to(&mut buf)?;
    let parsed = ChunkSelectiveAck::unmarshal(&buf.freeze())?;
    assert_eq!(parsed, chunk);
    Ok(())
}

#[test]
fn test_sack_rejects_truncated_blocks() -> Result<()> {
    let chunk = ChunkSelectiveAck {
        cumulative_tsn_ack: 1,
        advertised_receiver_window_credit: 2,
        gap_ack_blocks: vec![GapAckBlock { start: 1, end: 1 }],
        duplicate_tsn: vec![],
    };
    let mut buf = BytesMut::new();
    chunk.marshal_to(&mut buf)?;
    // Claim one more gap block than is present.
    buf[12] = 0;
    buf[13] = 2;
    assert!(ChunkSelectiveAck::unmarshal(&buf.freeze()).is_err());
    Ok(())
}

#[test]
fn test_heartbeat_round_trip() -> Result<()> {
    let chunk = ChunkHeartbeat {
        info: ParamHeartbeatInfo {
            heartbeat_information: Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]),
        },
    };
    let mut buf = BytesMut::new();
    chunk.marshal_to(&mut buf)?;
    let parsed = ChunkHeartbeat::unmarshal(&buf.freeze())?;
    assert_eq!(parsed, chunk);

    let ack = ChunkHeartbeatAck { info: parsed.info };
    let mut buf = BytesMut::new();
    ack.marshal_to(&mut buf)?;
    let parsed = ChunkHeartbeatAck::unmarshal(&buf.freeze())?;
    assert_eq!(parsed, ack);
    Ok(())
}

#[test]
fn test_abort_round_trip_with_causes() -> Result<()> {
    let chunk = ChunkAbort {
        reflected_tag: true,
        error_causes: vec![
            ErrorCause::protocol_violation("bad"),
            ErrorCause::user_initiated_abort("closing"),
        ],
    };
    let mut buf = BytesMut::new();
    chunk.marshal_to(&mut buf)?;
    let parsed = ChunkAbort::unmarshal(&buf.freeze())?;
    assert_eq!(parsed, chunk);
    Ok(())
}

#[test]
fn test_error_round_trip() -> Result<()> {
    let chunk = ChunkError {
        error_causes: vec![ErrorCause::stale_cookie()],
    };
    let mut buf = BytesMut::new();
    chunk.marshal_to(&mut buf)?;
    let parsed = ChunkError::unmarshal(&buf.freeze())?;
    assert_eq!(parsed, chunk);
    Ok(())
}

#[test]
fn test_shutdown_family_round_trips() -> Result<()> {
    let shutdown = ChunkShutdown {
        cumulative_tsn_ack: 4711,
    };
    let mut buf = BytesMut::new();
    shutdown.marshal_to(&mut buf)?;
    assert_eq!(ChunkShutdown::unmarshal(&buf.freeze())?, shutdown);

    let ack = ChunkShutdownAck;
    let mut buf = BytesMut::new();
    ack.marshal_to(&mut buf)?;
    assert_eq!(ChunkShutdownAck::unmarshal(&buf.freeze())?, ack);

    let complete = ChunkShutdownComplete {
        reflected_tag: true,
    };
    let mut buf = BytesMut::new();
    complete.marshal_to(&mut buf)?;
    assert_eq!(ChunkShutdownComplete::unmarshal(&buf.freeze())?, complete);
    Ok(())
}

#[test]
fn test_cookie_round_trips() -> Result<()> {
    let echo = ChunkCookieEcho {
        cookie: Bytes::from_static(b"cookie bytes"),
    };
    let mut buf = BytesMut::new();
    echo.marshal_to(&mut buf)?;
    assert_eq!(ChunkCookieEcho::unmarshal(&buf.freeze())?, echo);

    let ack = ChunkCookieAck;
    let mut buf = BytesMut::new();
    ack.marshal_to(&mut buf)?;
    assert_eq!(ChunkCookieAck::unmarshal(&buf.freeze())?, ack);
    Ok(())
}

#[test]
fn test_reconfig_round_trip_two_params() -> Result<()> {
    let chunk = ChunkReconfig {
        param_a: Some(Param::OutgoingResetRequest(ParamOutgoingResetRequest {
            reconfig_request_sequence_number: 1,
            reconfig_response_sequence_number: 2,
            sender_last_tsn: 3,
            stream_identifiers: vec![4, 5, 6],
        })),
        param_b: Some(Param::ReconfigResponse(ParamReconfigResponse {
            reconfig_response_sequence_number: 7,
            result: ReconfigResult::InProgress,
        })),
    };
    let mut buf = BytesMut::new();
    chunk.marshal_to(&mut buf)?;
    let parsed = ChunkReconfig::unmarshal(&buf.freeze())?;
    assert_eq!(parsed, chunk);
    Ok(())
}

#[test]
fn test_forward_tsn_round_trip() -> Result<()> {
    let chunk = ChunkForwardTsn {
        new_cumulative_tsn: 88,
        streams: vec![
            ChunkForwardTsnStream {
                identifier: 1,
                sequence: 2,
            },
            ChunkForwardTsnStream {
                identifier: 3,
                sequence: 4,
            },
        ],
    };
    let mut buf = BytesMut::new();
    chunk.marshal_to(&mut buf)?;
    let parsed = ChunkForwardTsn::unmarshal(&buf.freeze())?;
    assert_eq!(parsed, chunk);
    Ok(())
}

#[test]
fn test_i_forward_tsn_round_trip() -> Result<()> {
    let chunk = ChunkIForwardTsn {
        new_cumulative_tsn: 912,
        streams: vec![
            ChunkIForwardTsnStream {
                identifier: 1,
                unordered: true,
                message_identifier: 42,
            },
            ChunkIForwardTsnStream {
                identifier: 1,
                unordered: false,
                message_identifier: 17,
            },
        ],
    };
    let mut buf = BytesMut::new();
    chunk.marshal_to(&mut buf)?;
    let parsed = ChunkIForwardTsn::unmarshal(&buf.freeze())?;
    assert_eq!(parsed, chunk);
    Ok(())
}

#[test]
fn test_chunk_header_length_includes_header() -> Result<()> {
    let chunk = ChunkCookieEcho {
        cookie: Bytes::from_static(b"xyz"),
    };
    let mut buf = BytesMut::new();
    chunk.marshal_to(&mut buf)?;
    // 4-byte header + 3-byte value, no padding in the length field.
    assert_eq!(buf[2], 0);
    assert_eq!(buf[3], 7);
    let header = ChunkHeader::unmarshal(&buf.freeze())?;
    assert_eq!(header.value_length(), 3);
    Ok(())
}
