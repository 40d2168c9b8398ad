//! EPICS timestamps.
//!
//! Time envelopes count seconds since the EPICS epoch, 1990-01-01 00:00 UTC.

/// Seconds between the UNIX epoch and the EPICS epoch.
pub const EPICS_EPOCH_UNIX_OFFSET: u64 = 631_152_000;

/// A wire timestamp: seconds past the EPICS epoch plus nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeStamp {
    pub secs_past_epoch: u32,
    pub nanoseconds: u32,
}

impl TimeStamp {
    pub fn new(secs_past_epoch: u32, nanoseconds: u32) -> Self {
        TimeStamp {
            secs_past_epoch,
            nanoseconds,
        }
    }

    /// Build from UNIX seconds + nanoseconds. Times before the EPICS epoch
    /// saturate to it.
    pub fn from_unix(unix_secs: u64, nanoseconds: u32) -> Self {
        TimeStamp {
            secs_past_epoch: unix_secs.saturating_sub(EPICS_EPOCH_UNIX_OFFSET) as u32,
            nanoseconds,
        }
    }

    /// Whole UNIX seconds.
    pub fn unix_secs(&self) -> u64 {
        self.secs_past_epoch as u64 + EPICS_EPOCH_UNIX_OFFSET
    }

    /// Seconds since the UNIX epoch, fractional.
    pub fn as_unix_f64(&self) -> f64 {
        self.unix_secs() as f64 + self.nanoseconds as f64 * 1e-9
    }

    pub fn write_to(&self, buf: &mut impl bytes::BufMut) {
        buf.put_u32(self.secs_past_epoch);
        buf.put_u32(self.nanoseconds);
    }

    pub fn from_bytes(buf: &[u8; 8]) -> Self {
        TimeStamp {
            secs_past_epoch: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            nanoseconds: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_offset() {
        // 1990-01-01T00:00:00Z in UNIX seconds.
        let stamp = TimeStamp::from_unix(EPICS_EPOCH_UNIX_OFFSET, 0);
        assert_eq!(stamp.secs_past_epoch, 0);
        assert_eq!(stamp.unix_secs(), EPICS_EPOCH_UNIX_OFFSET);
    }

    #[test]
    fn pre_epoch_saturates() {
        let stamp = TimeStamp::from_unix(0, 0);
        assert_eq!(stamp.secs_past_epoch, 0);
    }

    #[test]
    fn unix_roundtrip() {
        let stamp = TimeStamp::from_unix(1_500_000_000, 123_456_789);
        assert_eq!(stamp.unix_secs(), 1_500_000_000);
        assert_eq!(stamp.nanoseconds, 123_456_789);
        let frac = stamp.as_unix_f64();
        assert!((frac - 1_500_000_000.123_456_789).abs() < 1e-6);
    }

    #[test]
    fn wire_roundtrip() {
        let stamp = TimeStamp::new(0x01020304, 0x05060708);
        let mut buf = bytes::BytesMut::new();
        stamp.write_to(&mut buf);
        assert_eq!(&buf[..], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(TimeStamp::from_bytes(&buf[..].try_into().unwrap()), stamp);
    }
}
