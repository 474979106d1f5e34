use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::callbacks::TimeMs;
use crate::error::{Error, Result};
use crate::handover::HandoverCapabilities;
use crate::util::ISCSI_CRC;

/// How long an issued cookie stays valid.
pub(crate) const COOKIE_LIFETIME_MS: u64 = 60_000;

const COOKIE_SIZE: usize = 37;

/// The state carried in the INIT-ACK cookie, so the responder does not
/// have to remember anything between INIT and COOKIE-ECHO.
///
/// Layout: mac(4) created_at(8) my_tag(4) peer_tag(4) my_initial_tsn(4)
/// peer_initial_tsn(4) my_port(2) peer_port(2) a_rwnd(4) capabilities(1).
/// The MAC is a CRC32c keyed with a per-socket secret; the host's RNG is
/// not cryptographic, so this only guards against stale or corrupt
/// cookies, which is all the transport needs below DTLS.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StateCookie {
    pub(crate) created_at: TimeMs,
    pub(crate) my_verification_tag: u32,
    pub(crate) peer_verification_tag: u32,
    pub(crate) my_initial_tsn: u32,
    pub(crate) peer_initial_tsn: u32,
    pub(crate) my_port: u16,
    pub(crate) peer_port: u16,
    pub(crate) peer_a_rwnd: u32,
    pub(crate) capabilities: HandoverCapabilities,
}

impl StateCookie {
    pub(crate) fn serialize(&self, secret: &[u8; 8]) -> Bytes {
        let mut body = BytesMut::with_capacity(COOKIE_SIZE);
        body.put_u32(0); // mac placeholder
        body.put_u64(self.created_at);
        body.put_u32(self.my_verification_tag);
        body.put_u32(self.peer_verification_tag);
        body.put_u32(self.my_initial_tsn);
        body.put_u32(self.peer_initial_tsn);
        body.put_u16(self.my_port);
        body.put_u16(self.peer_port);
        body.put_u32(self.peer_a_rwnd);
        body.put_u8(capabilities_to_byte(&self.capabilities));

        let mac = compute_mac(secret, &body[4..]);
        body[0..4].copy_from_slice(&mac.to_be_bytes());
        body.freeze()
    }

    pub(crate) fn deserialize(raw: &Bytes, secret: &[u8; 8], now: TimeMs) -> Result<Self> {
        if raw.len() != COOKIE_SIZE {
            return Err(Error::ErrStateCookieMalformed);
        }

        let reader = &mut raw.clone();
        let mac = reader.get_u32();
        if mac != compute_mac(secret, &raw[4..]) {
            return Err(Error::ErrStateCookieInvalidMac);
        }

        let created_at = reader.get_u64();
        if now.saturating_sub(created_at) > COOKIE_LIFETIME_MS {
            return Err(Error::ErrStateCookieStale);
        }

        Ok(StateCookie {
            created_at,
            my_verification_tag: reader.get_u32(),
            peer_verification_tag: reader.get_u32(),
            my_initial_tsn: reader.get_u32(),
            peer_initial_tsn: reader.get_u32(),
            my_port: reader.get_u16(),
            peer_port: reader.get_u16(),
            peer_a_rwnd: reader.get_u32(),
            capabilities: capabilities_from_byte(reader.get_u8()),
        })
    }
}

fn compute_mac(secret: &[u8; 8], body: &[u8]) -> u32 {
    let mut digest = ISCSI_CRC.digest();
    digest.update(secret);
    digest.update(body);
    digest.finalize()
}

fn capabilities_to_byte(c: &HandoverCapabilities) -> u8 {
    let mut b = 0u8;
    if c.partial_reliability {
        b |= 0x01;
    }
    if c.message_interleaving {
        b |= 0x02;
    }
    if c.reconfig {
        b |= 0x04;
    }
    if c.zero_checksum {
        b |= 0x08;
    }
    b
}

fn capabilities_from_byte(b: u8) -> HandoverCapabilities {
    HandoverCapabilities {
        partial_reliability: b & 0x01 != 0,
        message_interleaving: b & 0x02 != 0,
        reconfig: b & 0x04 != 0,
        zero_checksum: b & 0x08 != 0,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cookie() -> StateCookie {
        StateCookie {
            created_at: 10_000,
            my_verification_tag: 0x01020304,
            peer_verification_tag: 0x0a0b0c0d,
            my_initial_tsn: 1000,
            peer_initial_tsn: 2000,
            my_port: 5000,
            peer_port: 5000,
            peer_a_rwnd: 128 * 1024,
            capabilities: HandoverCapabilities {
                partial_reliability: true,
                message_interleaving: false,
                reconfig: true,
                zero_checksum: false,
            },
        }
    }

    #[test]
    fn test_cookie_round_trip() -> Result<()> {
        let secret = [1, 2, 3, 4, 5, 6, 7, 8];
        let raw = cookie().serialize(&secret);
        let parsed = StateCookie::deserialize(&raw, &secret, 10_500)?;
        assert_eq!(parsed, cookie());
        Ok(())
    }

    #[test]
    fn test_cookie_rejects_wrong_secret() {
        let raw = cookie().serialize(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(
            StateCookie::deserialize(&raw, &[8, 7, 6, 5, 4, 3, 2, 1], 10_500),
            Err(Error::ErrStateCookieInvalidMac)
        );
    }

    #[test]
    fn test_cookie_rejects_tampering() {
        let secret = [1, 2, 3, 4, 5, 6, 7, 8];
        let raw = cookie().serialize(&secret);
        let mut tampered = BytesMut::from(&raw[..]);
        tampered[16] ^= 0x01;
        assert_eq!(
            StateCookie::deserialize(&tampered.freeze(), &secret, 10_500),
            Err(Error::ErrStateCookieInvalidMac)
        );
    }

    #[test]
    fn test_cookie_rejects_staleness() {
        let secret = [1, 2, 3, 4, 5, 6, 7, 8];
        let raw = cookie().serialize(&secret);
        assert_eq!(
            StateCookie::deserialize(&raw, &secret, 10_000 + COOKIE_LIFETIME_MS + 1),
            Err(Error::ErrStateCookieStale)
        );
    }
}
