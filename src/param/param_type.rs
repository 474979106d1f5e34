use std::fmt;

/// ParamType represents an SCTP chunk parameter type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ParamType {
    /// Heartbeat Info (RFC 4960)
    HeartbeatInfo,
    /// State Cookie (RFC 4960)
    StateCookie,
    /// Unrecognized Parameters (RFC 4960)
    UnrecognizedParam,
    /// Outgoing SSN Reset Request Parameter (RFC 6525)
    OutSsnResetReq,
    /// Re-configuration Response Parameter (RFC 6525)
    ReconfigResp,
    /// Zero Checksum Acceptable (0x8001)
    ZeroChecksumAcceptable,
    /// Supported Extensions (0x8008, RFC 5061)
    SupportedExt,
    /// Forward TSN supported (0xC000, RFC 3758)
    ForwardTsnSupp,
    Unknown { param_type: u16 },
}

/// What to do with a parameter whose type is not recognized, from the two
/// high bits of the type per RFC 4960 section 3.2.1.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum UnrecognizedParamAction {
    /// 00 - stop processing the chunk.
    Stop,
    /// 01 - stop processing the chunk and report the parameter.
    StopAndReport,
    /// 10 - skip the parameter and continue.
    Skip,
    /// 11 - skip the parameter, continue, and report it.
    SkipAndReport,
}

impl ParamType {
    pub(crate) fn unrecognized_action(raw_type: u16) -> UnrecognizedParamAction {
        match raw_type >> 14 {
            0b00 => UnrecognizedParamAction::Stop,
            0b01 => UnrecognizedParamAction::StopAndReport,
            0b10 => UnrecognizedParamAction::Skip,
            _ => UnrecognizedParamAction::SkipAndReport,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            ParamType::HeartbeatInfo => "Heartbeat Info",
            ParamType::StateCookie => "State Cookie",
            ParamType::UnrecognizedParam => "Unrecognized Parameters",
            ParamType::OutSsnResetReq => "Outgoing SSN Reset Request Parameter",
            ParamType::ReconfigResp => "Re-configuration Response Parameter",
            ParamType::ZeroChecksumAcceptable => "Zero Checksum Acceptable",
            ParamType::SupportedExt => "Supported Extensions",
            ParamType::ForwardTsnSupp => "Forward TSN supported",
            ParamType::Unknown { .. } => "Unknown ParamType",
        };
        write!(f, "{s}")
    }
}

impl From<u16> for ParamType {
    fn from(v: u16) -> ParamType {
        match v {
            1 => ParamType::HeartbeatInfo,
            7 => ParamType::StateCookie,
            8 => ParamType::UnrecognizedParam,
            13 => ParamType::OutSsnResetReq,
            16 => ParamType::ReconfigResp,
            32769 => ParamType::ZeroChecksumAcceptable,
            32776 => ParamType::SupportedExt,
            49152 => ParamType::ForwardTsnSupp,
            unknown => ParamType::Unknown {
                param_type: unknown,
            },
        }
    }
}

impl From<ParamType> for u16 {
    fn from(v: ParamType) -> u16 {
        match v {
            ParamType::HeartbeatInfo => 1,
            ParamType::StateCookie => 7,
            ParamType::UnrecognizedParam => 8,
            ParamType::OutSsnResetReq => 13,
            ParamType::ReconfigResp => 16,
            ParamType::ZeroChecksumAcceptable => 32769,
            ParamType::SupportedExt => 32776,
            ParamType::ForwardTsnSupp => 49152,
            ParamType::Unknown { param_type } => param_type,
        }
    }
}
