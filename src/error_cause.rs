use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// A cause code carried in an ERROR or ABORT chunk.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub(crate) struct ErrorCauseCode(pub(crate) u16);

pub(crate) const INVALID_STREAM_IDENTIFIER: ErrorCauseCode = ErrorCauseCode(1);
pub(crate) const MISSING_MANDATORY_PARAMETER: ErrorCauseCode = ErrorCauseCode(2);
pub(crate) const STALE_COOKIE_ERROR: ErrorCauseCode = ErrorCauseCode(3);
pub(crate) const OUT_OF_RESOURCE: ErrorCauseCode = ErrorCauseCode(4);
pub(crate) const UNRESOLVABLE_ADDRESS: ErrorCauseCode = ErrorCauseCode(5);
pub(crate) const UNRECOGNIZED_CHUNK_TYPE: ErrorCauseCode = ErrorCauseCode(6);
pub(crate) const INVALID_MANDATORY_PARAMETER: ErrorCauseCode = ErrorCauseCode(7);
pub(crate) const UNRECOGNIZED_PARAMETERS: ErrorCauseCode = ErrorCauseCode(8);
pub(crate) const NO_USER_DATA: ErrorCauseCode = ErrorCauseCode(9);
pub(crate) const COOKIE_RECEIVED_WHILE_SHUTTING_DOWN: ErrorCauseCode = ErrorCauseCode(10);
pub(crate) const RESTART_OF_AN_ASSOCIATION_WITH_NEW_ADDRESSES: ErrorCauseCode = ErrorCauseCode(11);
pub(crate) const USER_INITIATED_ABORT: ErrorCauseCode = ErrorCauseCode(12);
pub(crate) const PROTOCOL_VIOLATION: ErrorCauseCode = ErrorCauseCode(13);

impl fmt::Display for ErrorCauseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let others = format!("Unknown CauseCode: {}", self.0);
        let s = match *self {
            INVALID_STREAM_IDENTIFIER => "Invalid Stream Identifier",
            MISSING_MANDATORY_PARAMETER => "Missing Mandatory Parameter",
            STALE_COOKIE_ERROR => "Stale Cookie Error",
            OUT_OF_RESOURCE => "Out Of Resource",
            UNRESOLVABLE_ADDRESS => "Unresolvable Address",
            UNRECOGNIZED_CHUNK_TYPE => "Unrecognized Chunk Type",
            INVALID_MANDATORY_PARAMETER => "Invalid Mandatory Parameter",
            UNRECOGNIZED_PARAMETERS => "Unrecognized Parameters",
            NO_USER_DATA => "No User Data",
            COOKIE_RECEIVED_WHILE_SHUTTING_DOWN => "Cookie Received While Shutting Down",
            RESTART_OF_AN_ASSOCIATION_WITH_NEW_ADDRESSES => {
                "Restart Of An Association With New Addresses"
            }
            USER_INITIATED_ABORT => "User Initiated Abort",
            PROTOCOL_VIOLATION => "Protocol Violation",
            _ => others.as_str(),
        };
        write!(f, "{s}")
    }
}

pub(crate) const ERROR_CAUSE_HEADER_LENGTH: usize = 4;

/// A single error cause: the code plus its raw value bytes. Causes whose
/// value is free-form text (protocol violation, user abort) are built with
/// the helper constructors.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ErrorCause {
    pub(crate) code: ErrorCauseCode,
    pub(crate) raw: Bytes,
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

impl ErrorCause {
    pub(crate) fn protocol_violation(reason: &str) -> Self {
        ErrorCause {
            code: PROTOCOL_VIOLATION,
            raw: Bytes::copy_from_slice(reason.as_bytes()),
        }
    }

    pub(crate) fn user_initiated_abort(reason: &str) -> Self {
        ErrorCause {
            code: USER_INITIATED_ABORT,
            raw: Bytes::copy_from_slice(reason.as_bytes()),
        }
    }

    pub(crate) fn out_of_resource() -> Self {
        ErrorCause {
            code: OUT_OF_RESOURCE,
            raw: Bytes::new(),
        }
    }

    pub(crate) fn stale_cookie() -> Self {
        ErrorCause {
            code: STALE_COOKIE_ERROR,
            raw: Bytes::new(),
        }
    }

    pub(crate) fn unrecognized_chunk_type(raw_chunk: Bytes) -> Self {
        ErrorCause {
            code: UNRECOGNIZED_CHUNK_TYPE,
            raw: raw_chunk,
        }
    }

    /// The cause value interpreted as text, for reporting upward.
    pub(crate) fn to_reason(&self) -> String {
        match std::str::from_utf8(&self.raw) {
            Ok(s) if !s.is_empty() => format!("{}: {}", self.code, s),
            _ => self.code.to_string(),
        }
    }

    pub(crate) fn unmarshal(buf: &Bytes) -> Result<Self> {
        if buf.len() < ERROR_CAUSE_HEADER_LENGTH {
            return Err(Error::ErrErrorCauseTooSmall);
        }

        let reader = &mut buf.clone();

        let code = ErrorCauseCode(reader.get_u16());
        let len = reader.get_u16();

        if (len as usize) < ERROR_CAUSE_HEADER_LENGTH || buf.len() < len as usize {
            return Err(Error::ErrErrorCauseTooSmall);
        }

        let value_length = len as usize - ERROR_CAUSE_HEADER_LENGTH;
        let raw = buf.slice(ERROR_CAUSE_HEADER_LENGTH..ERROR_CAUSE_HEADER_LENGTH + value_length);

        Ok(ErrorCause { code, raw })
    }

    pub(crate) fn marshal_to(&self, writer: &mut BytesMut) -> usize {
        let len = self.raw.len() + ERROR_CAUSE_HEADER_LENGTH;
        writer.put_u16(self.code.0);
        writer.put_u16(len as u16);
        writer.extend_from_slice(&self.raw);
        writer.len()
    }

    pub(crate) fn length(&self) -> usize {
        self.raw.len() + ERROR_CAUSE_HEADER_LENGTH
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cause_round_trip() -> Result<()> {
        let cause = ErrorCause::protocol_violation("DATA received in CookieWait");
        let mut buf = BytesMut::new();
        cause.marshal_to(&mut buf);
        let parsed = ErrorCause::unmarshal(&buf.freeze())?;
        assert_eq!(parsed, cause);
        assert_eq!(
            parsed.to_reason(),
            "Protocol Violation: DATA received in CookieWait"
        );
        Ok(())
    }

    #[test]
    fn test_cause_rejects_bad_length() {
        let raw = Bytes::from_static(&[0, 13, 0, 2]);
        assert_eq!(
            ErrorCause::unmarshal(&raw),
            Err(Error::ErrErrorCauseTooSmall)
        );
    }
}
