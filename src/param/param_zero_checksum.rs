use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::param_header::*;
use super::param_type::*;
use crate::error::{Error, Result};

/// The error detection method identifier announcing that the lower layer
/// already provides integrity (SCTP over DTLS).
pub(crate) const ZERO_CHECKSUM_EDMID_LOWER_LAYER_DTLS: u32 = 1;

/// Announces that the sender accepts packets with a zero checksum when an
/// alternate error detection method covers them (RFC 9653).
#[derive(Default, Debug, Clone, PartialEq)]
pub(crate) struct ParamZeroChecksumAcceptable {
    pub(crate) error_detection_method: u32,
}

impl fmt::Display for ParamZeroChecksumAcceptable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} edmid={}", self.header(), self.error_detection_method)
    }
}

impl ParamZeroChecksumAcceptable {
    pub(crate) fn header(&self) -> ParamHeader {
        ParamHeader {
            typ: ParamType::ZeroChecksumAcceptable,
            value_length: self.value_length() as u16,
        }
    }

    pub(crate) fn unmarshal(raw: &Bytes) -> Result<Self> {
        let header = ParamHeader::unmarshal(raw)?;
        if header.value_length() < 4 {
            return Err(Error::ErrParamHeaderInvalidLength);
        }

        let reader =
            &mut raw.slice(PARAM_HEADER_LENGTH..PARAM_HEADER_LENGTH + header.value_length());
        let error_detection_method = reader.get_u32();

        Ok(ParamZeroChecksumAcceptable {
            error_detection_method,
        })
    }

    pub(crate) fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        self.header().marshal_to(buf)?;
        buf.put_u32(self.error_detection_method);
        Ok(buf.len())
    }

    pub(crate) fn value_length(&self) -> usize {
        4
    }
}
