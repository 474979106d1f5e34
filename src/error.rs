use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a reported failure, passed to `on_error` and
/// `on_aborted`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Never passed to a callback; the "no failure" value.
    NoError,
    /// Too many retries or timeouts; the peer is presumed unreachable.
    TooManyRetries,
    /// An operation that requires an established association was attempted
    /// while there is none.
    NotConnected,
    /// An inbound packet, chunk or parameter could not be parsed.
    ParseFailed,
    /// Sequence numbers between the peers are out of sync.
    WrongSequence,
    /// The peer reported a problem using ERROR or ABORT.
    PeerReported,
    /// The peer violated the protocol.
    ProtocolViolation,
    /// The receive or send buffers have been exhausted.
    ResourceExhaustion,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            ErrorKind::NoError => "NO_ERROR",
            ErrorKind::TooManyRetries => "TOO_MANY_RETRIES",
            ErrorKind::NotConnected => "NOT_CONNECTED",
            ErrorKind::ParseFailed => "PARSE_FAILED",
            ErrorKind::WrongSequence => "WRONG_SEQUENCE",
            ErrorKind::PeerReported => "PEER_REPORTED",
            ErrorKind::ProtocolViolation => "PROTOCOL_VIOLATION",
            ErrorKind::ResourceExhaustion => "RESOURCE_EXHAUSTION",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum Error {
    #[error("raw is too small for a SCTP chunk")]
    ErrChunkHeaderTooSmall,
    #[error("not enough data left in SCTP packet to satisfy requested length")]
    ErrChunkHeaderNotEnoughSpace,
    #[error("chunk PADDING is non-zero at offset")]
    ErrChunkHeaderPaddingNonZero,
    #[error("chunk has invalid length")]
    ErrChunkHeaderInvalidLength,
    #[error("chunk too short")]
    ErrChunkTooShort,
    #[error("unexpected chunk type")]
    ErrChunkTypeUnexpected,
    #[error("chunk flags are invalid for its type")]
    ErrChunkFlagsInvalid,
    #[error("packet rejected, unrecognized chunk type with stop-processing action")]
    ErrUnrecognizedChunkType,

    #[error("param header too short")]
    ErrParamHeaderTooShort,
    #[error("param self reported length does not fit the buffer")]
    ErrParamHeaderInvalidLength,
    #[error("unhandled ParamType `{typ}`")]
    ErrParamTypeUnhandled { typ: u16 },
    #[error("unexpected ParamType")]
    ErrParamTypeUnexpected,
    #[error("outgoing SSN reset request parameter too short")]
    ErrSsnResetRequestParamTooShort,
    #[error("reconfig response parameter too short")]
    ErrReconfigRespParamTooShort,

    #[error("raw is too small for error cause")]
    ErrErrorCauseTooSmall,

    #[error("chunk Value isn't long enough for mandatory parameters")]
    ErrChunkValueNotLongEnough,
    #[error("ChunkType of type INIT flags must be all 0")]
    ErrChunkTypeInitFlagZero,
    #[error("ChunkType of type INIT ACK InitiateTag must not be 0")]
    ErrChunkTypeInitInitiateTagZero,
    #[error("INIT inbound stream request must be > 0")]
    ErrInitInboundStreamRequestZero,
    #[error("INIT outbound stream request must be > 0")]
    ErrInitOutboundStreamRequestZero,

    #[error("raw is smaller than the minimum length for a SCTP packet")]
    ErrPacketRawTooSmall,
    #[error("unable to parse SCTP chunk, not enough data for complete header")]
    ErrParseSctpChunkNotEnoughData,
    #[error("checksum mismatch theirs")]
    ErrChecksumMismatch,
    #[error("sctp packet must not have a source port of 0")]
    ErrSctpPacketSourcePortZero,
    #[error("sctp packet must not have a destination port of 0")]
    ErrSctpPacketDestinationPortZero,
    #[error("init chunk must not be bundled with any other chunk")]
    ErrInitChunkBundled,
    #[error("init chunk expects a verification tag of 0 on the packet")]
    ErrInitChunkVerifyTagNotZero,

    #[error("state cookie is malformed")]
    ErrStateCookieMalformed,
    #[error("state cookie failed authentication")]
    ErrStateCookieInvalidMac,
    #[error("state cookie is stale")]
    ErrStateCookieStale,

    #[error("shutdown called in non-Established state")]
    ErrShutdownNonEstablished,
    #[error("sending a message on a closed socket")]
    ErrSocketClosed,
    #[error("outgoing message larger than the send buffer allows")]
    ErrSendBufferFull,
    #[error("receive window buffer exhausted")]
    ErrReceiveBufferExhausted,
    #[error("stream is currently being reset")]
    ErrStreamResetting,
    #[error("handover is only possible when tx queues are empty")]
    ErrHandoverNotReady,

    #[error("{0}")]
    Other(String),
}
