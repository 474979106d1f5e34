use std::fmt;

use bytes::{Bytes, BytesMut};

use super::chunk_header::*;
use super::chunk_type::*;
use crate::error::{Error, Result};
use crate::param::param_header::{ParamHeader, PARAM_HEADER_LENGTH};
use crate::param::{build_param, Param};
use crate::util::get_padding_size;

/// ChunkReconfig represents an SCTP chunk of type RE-CONFIG (RFC 6525),
/// carrying one or two re-configuration parameters.
#[derive(Default, Debug, Clone, PartialEq)]
pub(crate) struct ChunkReconfig {
    pub(crate) param_a: Option<Param>,
    pub(crate) param_b: Option<Param>,
}

impl fmt::Display for ChunkReconfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut res = String::new();
        if let Some(param_a) = &self.param_a {
            res += format!("Param A:\n {param_a}").as_str();
        }
        if let Some(param_b) = &self.param_b {
            res += format!("Param B:\n {param_b}").as_str()
        }
        write!(f, "{res}")
    }
}

impl ChunkReconfig {
    pub(crate) fn header(&self) -> ChunkHeader {
        ChunkHeader {
            typ: CT_RECONFIG,
            flags: 0,
            value_length: self.value_length() as u16,
        }
    }

    pub(crate) fn unmarshal(raw: &Bytes) -> Result<Self> {
        let header = ChunkHeader::unmarshal(raw)?;

        if header.typ != CT_RECONFIG {
            return Err(Error::ErrChunkTypeUnexpected);
        }

        let end = CHUNK_HEADER_SIZE + header.value_length();
        let slice = raw.slice(CHUNK_HEADER_SIZE..end);
        let param_a = build_param(&slice)?;
        if param_a.is_none() {
            return Err(Error::ErrChunkValueNotLongEnough);
        }

        let hdr = ParamHeader::unmarshal(&slice)?;
        let a_len = PARAM_HEADER_LENGTH + hdr.value_length();
        let offset = CHUNK_HEADER_SIZE + a_len + get_padding_size(a_len);
        let param_b = if offset + PARAM_HEADER_LENGTH <= end {
            build_param(&raw.slice(offset..end))?
        } else {
            None
        };

        Ok(ChunkReconfig { param_a, param_b })
    }

    pub(crate) fn marshal_to(&self, writer: &mut BytesMut) -> Result<usize> {
        self.header().marshal_to(writer)?;

        if let Some(param_a) = &self.param_a {
            let a = param_a.marshal()?;
            let a_len = a.len();
            writer.extend(a);
            if self.param_b.is_some() {
                let pad = get_padding_size(a_len);
                writer.extend(vec![0u8; pad]);
            }
        }
        if let Some(param_b) = &self.param_b {
            param_b.marshal_to(writer)?;
        }

        Ok(writer.len())
    }

    pub(crate) fn check(&self) -> Result<()> {
        Ok(())
    }

    pub(crate) fn value_length(&self) -> usize {
        let mut l = 0;
        if let Some(param_a) = &self.param_a {
            l += PARAM_HEADER_LENGTH + param_a.value_length();
        }
        if let Some(param_b) = &self.param_b {
            l += get_padding_size(l) + PARAM_HEADER_LENGTH + param_b.value_length();
        }
        l
    }
}
