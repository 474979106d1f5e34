use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::param_header::*;
use super::param_type::*;
use crate::error::{Error, Result};

pub(crate) const PARAM_RECONFIG_RESPONSE_LENGTH: usize = 8;

/// Outcome of a re-configuration request (RFC 6525 section 4.4).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ReconfigResult {
    SuccessNop,
    SuccessPerformed,
    Denied,
    ErrorWrongSsn,
    ErrorRequestAlreadyInProgress,
    ErrorBadSequenceNumber,
    InProgress,
}

impl Default for ReconfigResult {
    fn default() -> Self {
        ReconfigResult::SuccessNop
    }
}

impl fmt::Display for ReconfigResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            ReconfigResult::SuccessNop => "Success - Nothing to do",
            ReconfigResult::SuccessPerformed => "Success - Performed",
            ReconfigResult::Denied => "Denied",
            ReconfigResult::ErrorWrongSsn => "Error - Wrong SSN",
            ReconfigResult::ErrorRequestAlreadyInProgress => {
                "Error - Request already in progress"
            }
            ReconfigResult::ErrorBadSequenceNumber => "Error - Bad Sequence Number",
            ReconfigResult::InProgress => "In progress",
        };
        write!(f, "{s}")
    }
}

impl From<u32> for ReconfigResult {
    fn from(v: u32) -> ReconfigResult {
        match v {
            1 => ReconfigResult::SuccessPerformed,
            2 => ReconfigResult::Denied,
            3 => ReconfigResult::ErrorWrongSsn,
            4 => ReconfigResult::ErrorRequestAlreadyInProgress,
            5 => ReconfigResult::ErrorBadSequenceNumber,
            6 => ReconfigResult::InProgress,
            _ => ReconfigResult::SuccessNop,
        }
    }
}

impl From<ReconfigResult> for u32 {
    fn from(v: ReconfigResult) -> u32 {
        match v {
            ReconfigResult::SuccessNop => 0,
            ReconfigResult::SuccessPerformed => 1,
            ReconfigResult::Denied => 2,
            ReconfigResult::ErrorWrongSsn => 3,
            ReconfigResult::ErrorRequestAlreadyInProgress => 4,
            ReconfigResult::ErrorBadSequenceNumber => 5,
            ReconfigResult::InProgress => 6,
        }
    }
}

/// Answers a re-configuration request, matched by sequence number.
#[derive(Default, Debug, Clone, PartialEq)]
pub(crate) struct ParamReconfigResponse {
    /// The request sequence number this response answers.
    pub(crate) reconfig_response_sequence_number: u32,
    pub(crate) result: ReconfigResult,
}

impl fmt::Display for ParamReconfigResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} seq={} result={}",
            self.header(),
            self.reconfig_response_sequence_number,
            self.result
        )
    }
}

impl ParamReconfigResponse {
    pub(crate) fn header(&self) -> ParamHeader {
        ParamHeader {
            typ: ParamType::ReconfigResp,
            value_length: self.value_length() as u16,
        }
    }

    pub(crate) fn unmarshal(raw: &Bytes) -> Result<Self> {
        let header = ParamHeader::unmarshal(raw)?;

        if header.value_length() < PARAM_RECONFIG_RESPONSE_LENGTH {
            return Err(Error::ErrReconfigRespParamTooShort);
        }

        let reader =
            &mut raw.slice(PARAM_HEADER_LENGTH..PARAM_HEADER_LENGTH + header.value_length());
        let reconfig_response_sequence_number = reader.get_u32();
        let result = reader.get_u32().into();

        Ok(ParamReconfigResponse {
            reconfig_response_sequence_number,
            result,
        })
    }

    pub(crate) fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        self.header().marshal_to(buf)?;
        buf.put_u32(self.reconfig_response_sequence_number);
        buf.put_u32(self.result.into());
        Ok(buf.len())
    }

    pub(crate) fn value_length(&self) -> usize {
        PARAM_RECONFIG_RESPONSE_LENGTH
    }
}
