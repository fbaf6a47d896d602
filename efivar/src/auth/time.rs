//! `EFI_TIME` and conversion to Unix seconds

/// Encoded size of `EFI_TIME`.
pub const EFI_TIME_SIZE: usize = 16;

/// `EFI_TIME` as carried in an authentication envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EfiTime {
    pub year: u16,
    /// 1-12
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub pad1: u8,
    pub nanosecond: u32,
    pub timezone: i16,
    pub daylight: u8,
    pub pad2: u8,
}

impl EfiTime {
    pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            pad1: 0,
            nanosecond: 0,
            timezone: 0,
            daylight: 0,
            pad2: 0,
        }
    }

    pub const fn from_bytes(b: &[u8; EFI_TIME_SIZE]) -> Self {
        Self {
            year: u16::from_le_bytes([b[0], b[1]]),
            month: b[2],
            day: b[3],
            hour: b[4],
            minute: b[5],
            second: b[6],
            pad1: b[7],
            nanosecond: u32::from_le_bytes([b[8], b[9], b[10], b[11]]),
            timezone: i16::from_le_bytes([b[12], b[13]]),
            daylight: b[14],
            pad2: b[15],
        }
    }

    pub const fn to_bytes(&self) -> [u8; EFI_TIME_SIZE] {
        let y = self.year.to_le_bytes();
        let ns = self.nanosecond.to_le_bytes();
        let tz = self.timezone.to_le_bytes();
        [
            y[0],
            y[1],
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.pad1,
            ns[0],
            ns[1],
            ns[2],
            ns[3],
            tz[0],
            tz[1],
            self.daylight,
            self.pad2,
        ]
    }

    /// Authenticated variables carry a plain UTC time: padding, nanoseconds,
    /// timezone and daylight must all be zero.
    pub const fn is_canonical(&self) -> bool {
        self.pad1 == 0
            && self.nanosecond == 0
            && self.timezone == 0
            && self.daylight == 0
            && self.pad2 == 0
    }

    /// Seconds since 1970-01-01T00:00:00Z. Dates before the epoch clamp to 0.
    pub fn unix_seconds(&self) -> u64 {
        // March-based year so the leap day falls at the end.
        let mut month = self.month as i64 - 2;
        let mut year = self.year as i64;
        if month <= 0 {
            month += 12;
            year -= 1;
        }
        let days = year / 4 - year / 100 + year / 400 + 367 * month / 12 + self.day as i64
            + year * 365
            - 719_499;
        let secs = ((days * 24 + self.hour as i64) * 60 + self.minute as i64) * 60
            + self.second as i64;
        secs.max(0) as u64
    }
}
