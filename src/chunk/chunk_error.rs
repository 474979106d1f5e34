use std::fmt;

use bytes::{Bytes, BytesMut};

use super::chunk_header::*;
use super::chunk_type::*;
use crate::error::{Error, Result};
use crate::error_cause::ErrorCause;
use crate::util::get_padding_size;

/// ChunkError represents an SCTP chunk of type ERROR (operation error).
/// Reports one or more non-fatal conditions; the association stays up.
#[derive(Default, Debug, Clone, PartialEq)]
pub(crate) struct ChunkError {
    pub(crate) error_causes: Vec<ErrorCause>,
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut res = vec![self.header().to_string()];
        for cause in &self.error_causes {
            res.push(format!(" - {cause}"));
        }
        write!(f, "{}", res.join("\n"))
    }
}

impl ChunkError {
    pub(crate) fn header(&self) -> ChunkHeader {
        ChunkHeader {
            typ: CT_ERROR,
            flags: 0,
            value_length: self.value_length() as u16,
        }
    }

    pub(crate) fn unmarshal(raw: &Bytes) -> Result<Self> {
        let header = ChunkHeader::unmarshal(raw)?;

        if header.typ != CT_ERROR {
            return Err(Error::ErrChunkTypeUnexpected);
        }

        let mut error_causes = vec![];
        let mut offset = CHUNK_HEADER_SIZE;
        let end = CHUNK_HEADER_SIZE + header.value_length();
        while offset + 4 <= end {
            let e = ErrorCause::unmarshal(&raw.slice(offset..end))?;
            let len = e.length();
            offset += len + get_padding_size(len);
            error_causes.push(e);
        }

        Ok(ChunkError { error_causes })
    }

    pub(crate) fn marshal_to(&self, writer: &mut BytesMut) -> Result<usize> {
        self.header().marshal_to(writer)?;
        for (idx, ec) in self.error_causes.iter().enumerate() {
            let len = ec.marshal_to(writer);
            if idx != self.error_causes.len() - 1 {
                let pad = get_padding_size(len);
                writer.extend(vec![0u8; pad]);
            }
        }
        Ok(writer.len())
    }

    pub(crate) fn check(&self) -> Result<()> {
        Ok(())
    }

    pub(crate) fn value_length(&self) -> usize {
        let mut l = 0;
        for (idx, ec) in self.error_causes.iter().enumerate() {
            l += ec.length();
            if idx != self.error_causes.len() - 1 {
                l += get_padding_size(ec.length());
            }
        }
        l
    }
}
