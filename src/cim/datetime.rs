use std::fmt;
use std::str::FromStr;

use jiff::civil;
use jiff::tz::Offset;
use jiff::{SignedDuration, Timestamp};

use crate::err::{ValueError, ValueResult};

/// A CIM `datetime` value: either a point in time or a duration.
///
/// Both forms use the fixed 25-character DSP0004 layout:
/// `yyyymmddhhmmss.mmmmmmsutc` for timestamps (where `s` is `+` or `-` and
/// `utc` is the UTC offset in minutes) and `ddddddddhhmmss.mmmmmm:000` for
/// intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CimDateTime {
    Timestamp(CimTimestamp),
    Interval(CimInterval),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CimTimestamp {
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    microsecond: u32,
    /// Offset from UTC in minutes, -999..=999.
    utc_offset: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CimInterval {
    days: u32,
    hours: u8,
    minutes: u8,
    seconds: u8,
    microseconds: u32,
}

const FORMAT_LEN: usize = 25;

fn malformed(text: &str, reason: impl Into<String>) -> ValueError {
    ValueError::Malformed {
        text: text.to_owned(),
        cim_type: "datetime",
        reason: reason.into(),
    }
}

fn field(text: &str, range: std::ops::Range<usize>, what: &str) -> ValueResult<u32> {
    let digits = &text[range];
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed(text, format!("{what} field {digits:?} is not numeric")));
    }
    digits
        .parse::<u32>()
        .map_err(|e| malformed(text, format!("{what}: {e}")))
}

impl CimTimestamp {
    pub fn new(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        microsecond: u32,
        utc_offset: i16,
    ) -> ValueResult<Self> {
        // jiff validates the calendar part (month lengths, leap years).
        civil::Date::new(year as i16, month as i8, day as i8).map_err(|e| {
            malformed(
                &format!("{year:04}{month:02}{day:02}"),
                format!("invalid date: {e}"),
            )
        })?;
        if hour > 23 || minute > 59 || second > 59 {
            return Err(malformed(
                &format!("{hour:02}{minute:02}{second:02}"),
                "time of day out of range",
            ));
        }
        if microsecond > 999_999 {
            return Err(ValueError::OutOfRange {
                text: microsecond.to_string(),
                cim_type: "datetime",
            });
        }
        if !(-999..=999).contains(&utc_offset) {
            return Err(ValueError::OutOfRange {
                text: utc_offset.to_string(),
                cim_type: "datetime",
            });
        }
        Ok(CimTimestamp {
            year,
            month,
            day,
            hour,
            minute,
            second,
            microsecond,
            utc_offset,
        })
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn day(&self) -> u8 {
        self.day
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn second(&self) -> u8 {
        self.second
    }

    pub fn microsecond(&self) -> u32 {
        self.microsecond
    }

    /// Offset from UTC in minutes.
    pub fn utc_offset(&self) -> i16 {
        self.utc_offset
    }

    /// Resolve to an absolute instant.
    pub fn to_timestamp(&self) -> ValueResult<Timestamp> {
        let dt = civil::DateTime::new(
            self.year as i16,
            self.month as i8,
            self.day as i8,
            self.hour as i8,
            self.minute as i8,
            self.second as i8,
            (self.microsecond * 1_000) as i32,
        )
        .map_err(|e| malformed(&self.to_string(), e.to_string()))?;
        let offset = Offset::from_seconds(self.utc_offset as i32 * 60)
            .map_err(|e| malformed(&self.to_string(), e.to_string()))?;
        offset
            .to_timestamp(dt)
            .map_err(|e| malformed(&self.to_string(), e.to_string()))
    }

    /// Represent an absolute instant as a CIM timestamp with a zero UTC
    /// offset.
    pub fn from_timestamp(ts: Timestamp) -> Self {
        let dt = Offset::UTC.to_datetime(ts);
        CimTimestamp {
            year: dt.year() as u16,
            month: dt.month() as u8,
            day: dt.day() as u8,
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
            second: dt.second() as u8,
            microsecond: (dt.subsec_nanosecond() / 1_000) as u32,
            utc_offset: 0,
        }
    }
}

impl fmt::Display for CimTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.utc_offset < 0 { '-' } else { '+' };
        write!(
            f,
            "{:04}{:02}{:02}{:02}{:02}{:02}.{:06}{}{:03}",
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.microsecond,
            sign,
            self.utc_offset.unsigned_abs(),
        )
    }
}

impl CimInterval {
    pub fn new(days: u32, hours: u8, minutes: u8, seconds: u8, microseconds: u32) -> ValueResult<Self> {
        if days > 99_999_999 {
            return Err(ValueError::OutOfRange {
                text: days.to_string(),
                cim_type: "datetime",
            });
        }
        if hours > 23 || minutes > 59 || seconds > 59 {
            return Err(malformed(
                &format!("{hours:02}{minutes:02}{seconds:02}"),
                "time of day out of range",
            ));
        }
        if microseconds > 999_999 {
            return Err(ValueError::OutOfRange {
                text: microseconds.to_string(),
                cim_type: "datetime",
            });
        }
        Ok(CimInterval {
            days,
            hours,
            minutes,
            seconds,
            microseconds,
        })
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    pub fn hours(&self) -> u8 {
        self.hours
    }

    pub fn minutes(&self) -> u8 {
        self.minutes
    }

    pub fn seconds(&self) -> u8 {
        self.seconds
    }

    pub fn microseconds(&self) -> u32 {
        self.microseconds
    }

    pub fn to_duration(&self) -> SignedDuration {
        let secs = self.days as i64 * 86_400
            + self.hours as i64 * 3_600
            + self.minutes as i64 * 60
            + self.seconds as i64;
        SignedDuration::new(secs, (self.microseconds * 1_000) as i32)
    }
}

impl fmt::Display for CimInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08}{:02}{:02}{:02}.{:06}:000",
            self.days, self.hours, self.minutes, self.seconds, self.microseconds,
        )
    }
}

impl CimDateTime {
    pub fn is_interval(&self) -> bool {
        matches!(self, CimDateTime::Interval(_))
    }
}

impl fmt::Display for CimDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CimDateTime::Timestamp(ts) => ts.fmt(f),
            CimDateTime::Interval(iv) => iv.fmt(f),
        }
    }
}

impl FromStr for CimDateTime {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != FORMAT_LEN || !s.is_ascii() {
            return Err(malformed(s, format!("expected {FORMAT_LEN} ASCII characters")));
        }
        if s.as_bytes()[14] != b'.' {
            return Err(malformed(s, "expected '.' at position 14"));
        }
        let micros = field(s, 15..21, "microseconds")?;

        match s.as_bytes()[21] {
            b':' => {
                if &s[22..25] != "000" {
                    return Err(malformed(s, "interval must end in ':000'"));
                }
                let days = field(s, 0..8, "days")?;
                let hours = field(s, 8..10, "hours")?;
                let minutes = field(s, 10..12, "minutes")?;
                let seconds = field(s, 12..14, "seconds")?;
                Ok(CimDateTime::Interval(CimInterval::new(
                    days,
                    hours as u8,
                    minutes as u8,
                    seconds as u8,
                    micros,
                )?))
            }
            sign @ (b'+' | b'-') => {
                let year = field(s, 0..4, "year")?;
                let month = field(s, 4..6, "month")?;
                let day = field(s, 6..8, "day")?;
                let hour = field(s, 8..10, "hour")?;
                let minute = field(s, 10..12, "minute")?;
                let second = field(s, 12..14, "second")?;
                let offset = field(s, 22..25, "utc offset")? as i16;
                let offset = if sign == b'-' { -offset } else { offset };
                Ok(CimDateTime::Timestamp(CimTimestamp::new(
                    year as u16,
                    month as u8,
                    day as u8,
                    hour as u8,
                    minute as u8,
                    second as u8,
                    micros,
                    offset,
                )?))
            }
            other => Err(malformed(
                s,
                format!("expected '+', '-' or ':' at position 21, found {:?}", other as char),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn timestamp_round_trip() {
        let text = "20250806153000.123456+060";
        let dt: CimDateTime = text.parse().unwrap();
        match dt {
            CimDateTime::Timestamp(ts) => {
                assert_eq!(ts.year(), 2025);
                assert_eq!(ts.month(), 8);
                assert_eq!(ts.microsecond(), 123_456);
                assert_eq!(ts.utc_offset(), 60);
            }
            _ => panic!("expected timestamp"),
        }
        assert_eq!(dt.to_string(), text);
    }

    #[test]
    fn negative_offset_round_trip() {
        let text = "19991231235959.000000-300";
        let dt: CimDateTime = text.parse().unwrap();
        assert_eq!(dt.to_string(), text);
    }

    #[test]
    fn interval_round_trip() {
        let text = "00000012053000.000123:000";
        let dt: CimDateTime = text.parse().unwrap();
        match dt {
            CimDateTime::Interval(iv) => {
                assert_eq!(iv.days(), 12);
                assert_eq!(iv.hours(), 5);
                assert_eq!(iv.minutes(), 30);
                assert_eq!(iv.microseconds(), 123);
            }
            _ => panic!("expected interval"),
        }
        assert_eq!(dt.to_string(), text);
        assert!(dt.is_interval());
    }

    #[test]
    fn interval_converts_to_duration() {
        let dt: CimDateTime = "00000001000130.500000:000".parse().unwrap();
        let CimDateTime::Interval(iv) = dt else {
            panic!("expected interval")
        };
        assert_eq!(iv.to_duration(), SignedDuration::new(86_400 + 90, 500_000_000));
    }

    #[test]
    fn timestamp_resolves_against_offset() {
        let dt: CimDateTime = "20000101000000.000000+060".parse().unwrap();
        let CimDateTime::Timestamp(ts) = dt else {
            panic!("expected timestamp")
        };
        let instant = ts.to_timestamp().unwrap();
        // One hour east of UTC: the instant is 23:00 the previous day.
        let back = CimTimestamp::from_timestamp(instant);
        assert_eq!(back.to_string(), "19991231230000.000000+000");
    }

    #[test]
    fn rejects_malformed_text() {
        assert!("not a datetime".parse::<CimDateTime>().is_err());
        // Wrong separator position.
        assert!("20250806153000-123456+060".parse::<CimDateTime>().is_err());
        // Invalid calendar date.
        assert!("20250230000000.000000+000".parse::<CimDateTime>().is_err());
        // Interval suffix must be ':000'.
        assert!("00000012053000.000123:001".parse::<CimDateTime>().is_err());
        // Out-of-range time of day.
        assert!("20250806250000.000000+000".parse::<CimDateTime>().is_err());
    }
}
