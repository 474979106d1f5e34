
pub(crate) mod param_forward_tsn_supported;
pub(crate) mod param_header;
pub(crate) mod param_heartbeat_info;
pub(crate) mod param_outgoing_reset_request;
pub(crate) mod param_reconfig_response;
pub(crate) mod param_state_cookie;
pub(crate) mod param_supported_extensions;
pub(crate) mod param_type;
pub(crate) mod param_unknown;
pub(crate) mod param_zero_checksum;

use std::fmt;

use bytes::{Buf, Bytes, BytesMut};
use param_header::*;
use param_type::*;

use crate::error::{Error, Result};
use crate::param::param_forward_tsn_supported::ParamForwardTsnSupported;
use crate::param::param_heartbeat_info::ParamHeartbeatInfo;
use crate::param::param_outgoing_reset_request::ParamOutgoingResetRequest;
use crate::param::param_reconfig_response::ParamReconfigResponse;
use crate::param::param_state_cookie::ParamStateCookie;
use crate::param::param_supported_extensions::ParamSupportedExtensions;
use crate::param::param_unknown::ParamUnknown;
use crate::param::param_zero_checksum::ParamZeroChecksumAcceptable;
use crate::util::get_padding_size;

/// The closed set of parameters this implementation understands, plus an
/// `Unknown` variant for types that must be skipped-but-reported.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Param {
    StateCookie(ParamStateCookie),
    HeartbeatInfo(ParamHeartbeatInfo),
    OutgoingResetRequest(ParamOutgoingResetRequest),
    ReconfigResponse(ParamReconfigResponse),
    ForwardTsnSupported(ParamForwardTsnSupported),
    SupportedExtensions(ParamSupportedExtensions),
    ZeroChecksumAcceptable(ParamZeroChecksumAcceptable),
    Unknown(ParamUnknown),
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::StateCookie(p) => p.fmt(f),
            Param::HeartbeatInfo(p) => p.fmt(f),
            Param::OutgoingResetRequest(p) => p.fmt(f),
            Param::ReconfigResponse(p) => p.fmt(f),
            Param::ForwardTsnSupported(p) => p.fmt(f),
            Param::SupportedExtensions(p) => p.fmt(f),
            Param::ZeroChecksumAcceptable(p) => p.fmt(f),
            Param::Unknown(p) => p.fmt(f),
        }
    }
}

impl Param {
    pub(crate) fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        match self {
            Param::StateCookie(p) => p.marshal_to(buf),
            Param::HeartbeatInfo(p) => p.marshal_to(buf),
            Param::OutgoingResetRequest(p) => p.marshal_to(buf),
            Param::ReconfigResponse(p) => p.marshal_to(buf),
            Param::ForwardTsnSupported(p) => p.marshal_to(buf),
            Param::SupportedExtensions(p) => p.marshal_to(buf),
            Param::ZeroChecksumAcceptable(p) => p.marshal_to(buf),
            Param::Unknown(p) => p.marshal_to(buf),
        }
    }

    pub(crate) fn value_length(&self) -> usize {
        match self {
            Param::StateCookie(p) => p.value_length(),
            Param::HeartbeatInfo(p) => p.value_length(),
            Param::OutgoingResetRequest(p) => p.value_length(),
            Param::ReconfigResponse(p) => p.value_length(),
            Param::ForwardTsnSupported(p) => p.value_length(),
            Param::SupportedExtensions(p) => p.value_length(),
            Param::ZeroChecksumAcceptable(p) => p.value_length(),
            Param::Unknown(p) => p.value_length(),
        }
    }

    pub(crate) fn marshal(&self) -> Result<Bytes> {
        let capacity = PARAM_HEADER_LENGTH + self.value_length();
        let mut buf = BytesMut::with_capacity(capacity);
        self.marshal_to(&mut buf)?;
        Ok(buf.freeze())
    }
}

/// Parses the parameter at the head of `raw_param`.
///
/// `Ok(None)` means the parameter is unknown but its type asks for it to be
/// skipped silently; the caller continues after its padded length. Unknown
/// types that demand a stop abort the parse.
pub(crate) fn build_param(raw_param: &Bytes) -> Result<Option<Param>> {
    if raw_param.len() < PARAM_HEADER_LENGTH {
        return Err(Error::ErrParamHeaderTooShort);
    }
    let reader = &mut raw_param.slice(..2);
    let raw_type = reader.get_u16();
    match raw_type.into() {
        ParamType::StateCookie => Ok(Some(Param::StateCookie(ParamStateCookie::unmarshal(
            raw_param,
        )?))),
        ParamType::HeartbeatInfo => Ok(Some(Param::HeartbeatInfo(ParamHeartbeatInfo::unmarshal(
            raw_param,
        )?))),
        ParamType::OutSsnResetReq => Ok(Some(Param::OutgoingResetRequest(
            ParamOutgoingResetRequest::unmarshal(raw_param)?,
        ))),
        ParamType::ReconfigResp => Ok(Some(Param::ReconfigResponse(
            ParamReconfigResponse::unmarshal(raw_param)?,
        ))),
        ParamType::ForwardTsnSupp => Ok(Some(Param::ForwardTsnSupported(
            ParamForwardTsnSupported::unmarshal(raw_param)?,
        ))),
        ParamType::SupportedExt => Ok(Some(Param::SupportedExtensions(
            ParamSupportedExtensions::unmarshal(raw_param)?,
        ))),
        ParamType::ZeroChecksumAcceptable => Ok(Some(Param::ZeroChecksumAcceptable(
            ParamZeroChecksumAcceptable::unmarshal(raw_param)?,
        ))),
        _ => match ParamType::unrecognized_action(raw_type) {
            UnrecognizedParamAction::Stop | UnrecognizedParamAction::StopAndReport => {
                Err(Error::ErrParamTypeUnhandled { typ: raw_type })
            }
            UnrecognizedParamAction::Skip => {
                // Validate the TLV so the caller can step over it.
                let _ = ParamHeader::unmarshal(raw_param)?;
                Ok(None)
            }
            UnrecognizedParamAction::SkipAndReport => {
                Ok(Some(Param::Unknown(ParamUnknown::unmarshal(raw_param)?)))
            }
        },
    }
}

/// Walks a buffer of concatenated parameters, collecting the understood
/// ones and stepping over padded lengths.
pub(crate) fn build_params(raw: &Bytes) -> Result<Vec<Param>> {
    let mut params = vec![];
    let mut offset = 0usize;
    while raw.len() > offset + PARAM_HEADER_LENGTH - 1 {
        let slice = raw.slice(offset..);
        let header = ParamHeader::unmarshal(&slice)?;
        let p_len = PARAM_HEADER_LENGTH + header.value_length();
        if let Some(p) = build_param(&slice)? {
            params.push(p);
        }
        offset += p_len + get_padding_size(p_len);
    }
    Ok(params)
}
