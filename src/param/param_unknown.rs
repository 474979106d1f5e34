use std::fmt;

use bytes::{Bytes, BytesMut};

use super::param_header::*;
use super::param_type::ParamType;
use crate::error::Result;

/// A parameter this implementation does not understand but may have to
/// report back to the peer, carried as raw type and value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParamUnknown {
    pub(crate) typ: u16,
    pub(crate) value: Bytes,
}

impl fmt::Display for ParamUnknown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown Param type={} len={}", self.typ, self.value.len())
    }
}

impl ParamUnknown {
    pub(crate) fn header(&self) -> ParamHeader {
        ParamHeader {
            typ: ParamType::Unknown {
                param_type: self.typ,
            },
            value_length: self.value.len() as u16,
        }
    }

    pub(crate) fn unmarshal(raw: &Bytes) -> Result<Self> {
        let header = ParamHeader::unmarshal(raw)?;
        let value = raw.slice(PARAM_HEADER_LENGTH..PARAM_HEADER_LENGTH + header.value_length());
        Ok(ParamUnknown {
            typ: header.typ.into(),
            value,
        })
    }

    pub(crate) fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        self.header().marshal_to(buf)?;
        buf.extend_from_slice(&self.value);
        Ok(buf.len())
    }

    pub(crate) fn value_length(&self) -> usize {
        self.value.len()
    }
}
