use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900-01-01) and the UNIX epoch.
const NTP_UNIX_OFFSET_SECS: u64 = 2_208_988_800;

/// Converts a wall-clock instant into a 64-bit NTP timestamp
/// (seconds since 1900 in the high word, binary fraction in the low word).
pub(crate) fn ntp_time(now: SystemTime) -> u64 {
    let since_unix = now
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));

    let seconds = since_unix.as_secs() + NTP_UNIX_OFFSET_SECS;
    let fraction = ((since_unix.subsec_nanos() as u64) << 32) / 1_000_000_000;

    (seconds << 32) | (fraction & 0xFFFF_FFFF)
}

/// The middle 32 bits of a 64-bit NTP timestamp, as carried in the LSR
/// field of reception report blocks.
pub(crate) fn middle_32(ntp: u64) -> u32 {
    ((ntp >> 16) & 0xFFFF_FFFF) as u32
}

/// The delay since an event `elapsed_ms` ago, in 1/65536 second units
/// (the DLSR encoding).
pub(crate) fn delay_since(elapsed_ms: u64) -> u32 {
    ((elapsed_ms * 65536) / 1000) as u32
}

#[cfg(test)]
mod ntp_test {
    use super::*;

    #[test]
    fn test_ntp_time_epoch_offset() {
        let ntp = ntp_time(UNIX_EPOCH + Duration::from_secs(10));
        assert_eq!(ntp >> 32, NTP_UNIX_OFFSET_SECS + 10);
        assert_eq!(ntp & 0xFFFF_FFFF, 0);
    }

    #[test]
    fn test_middle_32() {
        let ntp = 0xda8b_d1fc_dddd_a05au64;
        assert_eq!(middle_32(ntp), 0xd1fc_dddd);
    }

    #[test]
    fn test_delay_since() {
        // one second is 65536 units
        assert_eq!(delay_since(1000), 65536);
        assert_eq!(delay_since(500), 32768);
        assert_eq!(delay_since(0), 0);
    }
}
