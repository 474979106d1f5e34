use bytes::Bytes;
use crc::{Crc, CRC_32_ISCSI};

pub(crate) const PADDING_MULTIPLE: usize = 4;

pub(crate) fn get_padding_size(len: usize) -> usize {
    (PADDING_MULTIPLE - (len % PADDING_MULTIPLE)) % PADDING_MULTIPLE
}

/// Allocated once; spliced in for the zeroed checksum field when digesting.
pub(crate) static FOUR_ZEROES: Bytes = Bytes::from_static(&[0, 0, 0, 0]);

pub(crate) const ISCSI_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// CRC32c over a whole packet with the checksum field treated as zero,
/// without copying the packet.
pub(crate) fn generate_packet_checksum(raw: &[u8]) -> u32 {
    let mut digest = ISCSI_CRC.digest();
    digest.update(&raw[0..8]);
    digest.update(&FOUR_ZEROES[..]);
    digest.update(&raw[12..]);
    digest.finalize()
}

/// Serial Number Arithmetic (RFC 1982)
#[inline]
pub(crate) fn sna32lt(i1: u32, i2: u32) -> bool {
    (i1 < i2 && i2 - i1 < 1 << 31) || (i1 > i2 && i1 - i2 > 1 << 31)
}

#[inline]
pub(crate) fn sna32lte(i1: u32, i2: u32) -> bool {
    i1 == i2 || sna32lt(i1, i2)
}

#[inline]
pub(crate) fn sna32gt(i1: u32, i2: u32) -> bool {
    (i1 < i2 && (i2 - i1) >= 1 << 31) || (i1 > i2 && (i1 - i2) <= 1 << 31)
}

#[inline]
pub(crate) fn sna32gte(i1: u32, i2: u32) -> bool {
    i1 == i2 || sna32gt(i1, i2)
}

#[inline]
pub(crate) fn sna16lt(i1: u16, i2: u16) -> bool {
    (i1 < i2 && (i2 - i1) < 1 << 15) || (i1 > i2 && (i1 - i2) > 1 << 15)
}

#[inline]
pub(crate) fn sna16lte(i1: u16, i2: u16) -> bool {
    i1 == i2 || sna16lt(i1, i2)
}

#[inline]
pub(crate) fn sna16gt(i1: u16, i2: u16) -> bool {
    (i1 < i2 && (i2 - i1) >= 1 << 15) || (i1 > i2 && (i1 - i2) <= 1 << 15)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_padding_size() {
        assert_eq!(get_padding_size(0), 0);
        assert_eq!(get_padding_size(1), 3);
        assert_eq!(get_padding_size(2), 2);
        assert_eq!(get_padding_size(3), 1);
        assert_eq!(get_padding_size(4), 0);
    }

    #[test]
    fn test_serial_number_arithmetic32bit() {
        assert!(sna32lt(0, 1));
        assert!(sna32lt(u32::MAX, 0), "wrap-around must compare as less");
        assert!(sna32gt(0, u32::MAX));
        assert!(sna32lt(0x7fff_ffff, 0x8000_0000));
        assert!(!sna32lt(1, 1));
        assert!(sna32lte(1, 1));
        assert!(sna32gte(1, 1));
        assert!(sna32gt(0x8000_0000, 0x7fff_ffff));
    }

    #[test]
    fn test_serial_number_arithmetic16bit() {
        assert!(sna16lt(0, 1));
        assert!(sna16lt(u16::MAX, 0), "wrap-around must compare as less");
        assert!(sna16gt(0, u16::MAX));
        assert!(sna16lte(7, 7));
        assert!(!sna16gt(7, 7));
    }
}
