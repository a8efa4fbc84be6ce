use std::fmt;

use bstr::{BStr, BString, ByteSlice, ByteVec};
use chrono::{DateTime, FixedOffset, Local};

use crate::error::UtilError;
use crate::Result;

/// A point in time as recorded in commit and tag headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Time {
    /// Seconds since the Unix epoch.
    pub seconds: i64,
    /// Offset from UTC in minutes (e.g. -300 for UTC-05:00).
    pub offset_minutes: i32,
}

/// `-0530` (the decimal reading of the header field) to minutes.
fn hhmm_to_minutes(tz: i32) -> i32 {
    let sign = if tz < 0 { -1 } else { 1 };
    let abs = tz.abs();
    sign * ((abs / 100) * 60 + abs % 100)
}

fn minutes_to_hhmm(minutes: i32) -> i32 {
    let sign = if minutes < 0 { -1 } else { 1 };
    let abs = minutes.abs();
    sign * ((abs / 60) * 100 + abs % 60)
}

impl Time {
    pub fn new(seconds: i64, offset_minutes: i32) -> Self {
        Self {
            seconds,
            offset_minutes,
        }
    }

    /// The current time in the local timezone.
    pub fn now() -> Self {
        let now = Local::now();
        Self {
            seconds: now.timestamp(),
            offset_minutes: now.offset().local_minus_utc() / 60,
        }
    }

    /// Parse the header form `"<seconds> <+hhmm>"`.
    pub fn parse_raw(input: &str) -> Result<Self> {
        let mut parts = input.trim().splitn(2, ' ');
        let secs = parts.next().unwrap_or_default();
        let seconds: i64 = secs
            .parse()
            .map_err(|_| UtilError::DateParse(format!("invalid timestamp: '{secs}'")))?;

        let offset_minutes = match parts.next().map(str::trim) {
            Some(tz) => {
                let valid = tz.len() == 5
                    && matches!(tz.as_bytes()[0], b'+' | b'-')
                    && tz.as_bytes()[1..].iter().all(u8::is_ascii_digit);
                if !valid {
                    return Err(UtilError::DateParse(format!("invalid timezone: '{tz}'")));
                }
                let hhmm: i32 = tz
                    .parse()
                    .map_err(|_| UtilError::DateParse(format!("invalid timezone: '{tz}'")))?;
                hhmm_to_minutes(hhmm)
            }
            None => 0,
        };

        Ok(Self::new(seconds, offset_minutes))
    }

    /// Parse a user-supplied date: raw header form, `@<seconds>`, RFC 3339
    /// or RFC 2822.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if let Some(secs) = input.strip_prefix('@') {
            return Self::parse_raw(secs);
        }
        if let Ok(t) = Self::parse_raw(input) {
            return Ok(t);
        }
        let parsed = DateTime::parse_from_rfc3339(input)
            .or_else(|_| DateTime::parse_from_rfc2822(input))
            .map_err(|_| UtilError::DateParse(format!("unrecognised date: '{input}'")))?;
        Ok(Self::new(
            parsed.timestamp(),
            parsed.offset().local_minus_utc() / 60,
        ))
    }

    /// The header form, e.g. `1700000000 +0100`.
    pub fn to_raw(&self) -> String {
        format!("{} {:+05}", self.seconds, minutes_to_hhmm(self.offset_minutes))
    }

    pub fn to_datetime(&self) -> Option<DateTime<FixedOffset>> {
        let offset = FixedOffset::east_opt(self.offset_minutes * 60)?;
        DateTime::from_timestamp(self.seconds, 0).map(|dt| dt.with_timezone(&offset))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%a %b %e %H:%M:%S %Y %z")),
            None => f.write_str(&self.to_raw()),
        }
    }
}

/// Author, committer or tagger identity with timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: BString,
    pub email: BString,
    pub time: Time,
}

impl Signature {
    pub fn new(name: impl Into<BString>, email: impl Into<BString>, time: Time) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            time,
        }
    }

    /// Same identity, stamped with the current time.
    pub fn now(name: impl Into<BString>, email: impl Into<BString>) -> Self {
        Self::new(name, email, Time::now())
    }

    /// Parse `Name <email> seconds +hhmm`.
    pub fn parse(input: &BStr) -> Result<Self> {
        let input = input.as_bytes();

        let gt = input
            .iter()
            .rposition(|&b| b == b'>')
            .ok_or_else(|| UtilError::DateParse("missing '>' in signature".into()))?;
        let lt = input[..gt]
            .iter()
            .rposition(|&b| b == b'<')
            .ok_or_else(|| UtilError::DateParse("missing '<' in signature".into()))?;

        let name = input[..lt].trim();
        let email = &input[lt + 1..gt];
        let date = std::str::from_utf8(input[gt + 1..].trim())
            .map_err(|_| UtilError::DateParse("non-UTF-8 date in signature".into()))?;

        Ok(Self {
            name: BString::from(name),
            email: BString::from(email),
            time: Time::parse_raw(date)?,
        })
    }

    /// Canonical header form.
    pub fn to_bytes(&self) -> BString {
        let mut out = BString::new(Vec::with_capacity(self.name.len() + self.email.len() + 24));
        out.push_str(&self.name);
        out.push_str(b" <");
        out.push_str(&self.email);
        out.push_str(b"> ");
        out.push_str(self.time.to_raw().as_bytes());
        out
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}
