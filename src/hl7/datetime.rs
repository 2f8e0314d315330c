//! HL7 v2 timestamps (DTM / TS component 1)
//!
//! Format: `YYYY[MM[DD[HH[MM[SS[.S[S[S[S]]]]]]]]][+/-ZZZZ]`.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use std::fmt;

/// Reason a timestamp is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampError {
    /// Fewer than four digits (no full year)
    TooShort,
    /// Non-digit characters or an incomplete component
    Format,
    /// Month outside 01-12
    Month,
    /// Day outside 01-31
    Day,
    /// Hour outside 00-23
    Hour,
    /// Minute outside 00-59
    Minute,
    /// Second outside 00-59
    Second,
    /// Malformed timezone offset
    Offset,
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::TooShort => "timestamp shorter than a 4-digit year",
            Self::Format => "timestamp is not in YYYY[MM[DD[HH[MM[SS]]]]] format",
            Self::Month => "month must be between 01 and 12",
            Self::Day => "day must be between 01 and 31",
            Self::Hour => "hour must be between 00 and 23",
            Self::Minute => "minute must be between 00 and 59",
            Self::Second => "second must be between 00 and 59",
            Self::Offset => "timezone offset must be +/-HHMM",
        };
        f.write_str(text)
    }
}

/// A parsed HL7 timestamp with its declared precision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hl7Timestamp {
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub hour: Option<u32>,
    pub minute: Option<u32>,
    pub second: Option<u32>,
    pub fraction: Option<String>,
    /// Offset from UTC in minutes
    pub offset_minutes: Option<i32>,
}

impl Hl7Timestamp {
    /// Parses the first component of a TS/DTM value
    pub fn parse(value: &str) -> Result<Self, TimestampError> {
        let value = value.trim();

        // Offset sign can only appear after the year
        let (main, offset) = match value
            .char_indices()
            .skip(4)
            .find(|(_, c)| *c == '+' || *c == '-')
        {
            Some((idx, _)) => (&value[..idx], Some(&value[idx..])),
            None => (value, None),
        };

        let (digits, fraction) = match main.split_once('.') {
            Some((d, f)) => (d, Some(f)),
            None => (main, None),
        };

        if digits.len() < 4 {
            if digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(TimestampError::TooShort);
            }
            return Err(TimestampError::Format);
        }
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(TimestampError::Format);
        }
        if !matches!(digits.len(), 4 | 6 | 8 | 10 | 12 | 14) {
            return Err(TimestampError::Format);
        }

        let num = |range: std::ops::Range<usize>| -> Option<u32> {
            digits.get(range).and_then(|s| s.parse::<u32>().ok())
        };

        let year = digits[0..4]
            .parse::<i32>()
            .map_err(|_| TimestampError::Format)?;
        let month = num(4..6);
        let day = num(6..8);
        let hour = num(8..10);
        let minute = num(10..12);
        let second = num(12..14);

        if let Some(m) = month {
            if !(1..=12).contains(&m) {
                return Err(TimestampError::Month);
            }
        }
        if let Some(d) = day {
            if !(1..=31).contains(&d) {
                return Err(TimestampError::Day);
            }
        }
        if let Some(h) = hour {
            if h > 23 {
                return Err(TimestampError::Hour);
            }
        }
        if let Some(m) = minute {
            if m > 59 {
                return Err(TimestampError::Minute);
            }
        }
        if let Some(s) = second {
            if s > 59 {
                return Err(TimestampError::Second);
            }
        }

        let fraction = match fraction {
            Some(f) => {
                if second.is_none()
                    || f.is_empty()
                    || f.len() > 4
                    || !f.chars().all(|c| c.is_ascii_digit())
                {
                    return Err(TimestampError::Format);
                }
                Some(f.to_string())
            }
            None => None,
        };

        let offset_minutes = match offset {
            Some(o) => Some(parse_offset(o)?),
            None => None,
        };

        Ok(Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            fraction,
            offset_minutes,
        })
    }

    /// Converts to a UTC instant, filling missing components with their
    /// lowest value. Returns `None` for impossible calendar dates.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        let date = NaiveDate::from_ymd_opt(
            self.year,
            self.month.unwrap_or(1),
            self.day.unwrap_or(1),
        )?;
        let naive = date.and_hms_opt(
            self.hour.unwrap_or(0),
            self.minute.unwrap_or(0),
            self.second.unwrap_or(0),
        )?;
        let offset = FixedOffset::east_opt(self.offset_minutes.unwrap_or(0) * 60)?;
        offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

fn parse_offset(offset: &str) -> Result<i32, TimestampError> {
    let sign = match offset.chars().next() {
        Some('+') => 1,
        Some('-') => -1,
        _ => return Err(TimestampError::Offset),
    };
    let digits = &offset[1..];
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(TimestampError::Offset);
    }
    let hours: i32 = digits[0..2].parse().map_err(|_| TimestampError::Offset)?;
    let minutes: i32 = digits[2..4].parse().map_err(|_| TimestampError::Offset)?;
    if hours > 23 || minutes > 59 {
        return Err(TimestampError::Offset);
    }
    Ok(sign * (hours * 60 + minutes))
}

/// Parses an HL7 timestamp straight to UTC, ignoring invalid values
pub fn parse_to_utc(value: &str) -> Option<DateTime<Utc>> {
    Hl7Timestamp::parse(value).ok().and_then(|ts| ts.to_utc())
}

/// Formats an instant as an HL7 second-precision timestamp
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.format("%Y%m%d%H%M%S").to_string()
}
