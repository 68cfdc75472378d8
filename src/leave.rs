//! Core leave value types and the application builder
use super::calendar::ChargeableDays;
use super::error::InputError;
use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Utc, Weekday};
use std::fmt;

/// A calendar date. Leave is always booked in whole days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Day(NaiveDate);

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

/// Inclusive date range, `start <= end` always holds.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Period {
    #[n(0)]
    start: Day,
    #[n(1)]
    end: Day,
}

/// How far ahead of (or behind) `today` a leave type may be filed.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilingRule {
    /// Must be filed at least `minimum_notice_days` before the start date.
    #[n(0)]
    Prospective {
        #[n(0)]
        minimum_notice_days: u32,
    },
    /// Must not start in the future. A non-zero window bounds how far back it may start.
    #[n(1)]
    Retroactive {
        #[n(0)]
        backdating_window_days: u32,
    },
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct LeaveType {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub max_days: u32, // annual allotment, seeds every new balance
    #[n(2)]
    pub rule: FilingRule,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaveStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Declined,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    #[n(0)]
    Approve,
    #[n(1)]
    Decline,
}

// Persisted row. Only `status` and `decided_by` change after creation.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct LeaveRequest {
    #[n(0)]
    pub id: u64,
    #[n(1)]
    pub subject: String,
    #[n(2)]
    pub leave_type: String,
    #[n(3)]
    pub period: Period,
    #[n(4)]
    pub status: LeaveStatus,
    #[n(5)]
    pub created: TimeStamp<Utc>,
    #[n(6)]
    pub chargeable: ChargeableDays, // computed once at submit, never recomputed
    #[n(7)]
    pub proof_note: Option<String>,
    #[n(8)]
    pub decided_by: Option<String>,
}

// Used for constructing a submission, every field is required except the proof note
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LeaveApplication {
    subject: Option<String>,
    leave_type: Option<String>,
    start: Option<Day>,
    end: Option<Day>,
    proof_note: Option<String>,
}

/// A complete application, ready for policy validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub subject: String,
    pub leave_type: String,
    pub start: Day,
    pub end: Day,
    pub proof_note: Option<String>,
}

impl Day {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }
    /// Parses the `YYYY-MM-DD` form date pickers submit.
    pub fn parse(value: &str) -> Result<Self, InputError> {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .map(Self)
            .map_err(|_| InputError::InvalidDate(value.to_string()))
    }
    pub fn today() -> Self {
        Self(Utc::now().date_naive())
    }
    pub fn date(&self) -> NaiveDate {
        self.0
    }
    pub fn weekday(&self) -> Weekday {
        self.0.weekday()
    }
    pub fn is_weekend(&self) -> bool {
        matches!(self.weekday(), Weekday::Sat | Weekday::Sun)
    }
    /// Signed number of days from `self` to `other`.
    pub fn days_until(&self, other: Day) -> i64 {
        (other.0 - self.0).num_days()
    }
    pub fn checked_sub_days(&self, days: u32) -> Option<Self> {
        self.0.checked_sub_days(Days::new(u64::from(days))).map(Self)
    }
    pub fn succ(&self) -> Option<Self> {
        self.0.succ_opt().map(Self)
    }
}

impl From<NaiveDate> for Day {
    fn from(value: NaiveDate) -> Self {
        Day(value)
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl Period {
    pub fn new(start: Day, end: Day) -> Result<Self, InputError> {
        if end < start {
            return Err(InputError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }
    pub fn single(day: Day) -> Self {
        Self {
            start: day,
            end: day,
        }
    }
    pub fn start(&self) -> Day {
        self.start
    }
    pub fn end(&self) -> Day {
        self.end
    }
    /// Calendar days in the period, inclusive of both ends.
    pub fn len_days(&self) -> u32 {
        u32::try_from(self.start.days_until(self.end) + 1).unwrap_or(u32::MAX)
    }
    pub fn contains(&self, day: Day) -> bool {
        self.start <= day && day <= self.end
    }
    pub fn overlaps(&self, other: &Period) -> bool {
        self.start <= other.end && other.start <= self.end
    }
    /// Every date in the period in ascending order.
    pub fn days(&self) -> impl Iterator<Item = Day> + use<> {
        let end = self.end;
        std::iter::successors(Some(self.start), Day::succ).take_while(move |d| *d <= end)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{} to {}", self.start, self.end)
        }
    }
}

impl LeaveType {
    pub fn prospective(name: &str, max_days: u32, minimum_notice_days: u32) -> Self {
        Self {
            name: name.to_string(),
            max_days,
            rule: FilingRule::Prospective {
                minimum_notice_days,
            },
        }
    }
    pub fn retroactive(name: &str, max_days: u32, backdating_window_days: u32) -> Self {
        Self {
            name: name.to_string(),
            max_days,
            rule: FilingRule::Retroactive {
                backdating_window_days,
            },
        }
    }
    pub fn minimum_notice_days(&self) -> u32 {
        match self.rule {
            FilingRule::Prospective {
                minimum_notice_days,
            } => minimum_notice_days,
            FilingRule::Retroactive { .. } => 0,
        }
    }
    pub fn backdating_window_days(&self) -> u32 {
        match self.rule {
            FilingRule::Prospective { .. } => 0,
            FilingRule::Retroactive {
                backdating_window_days,
            } => backdating_window_days,
        }
    }
}

impl LeaveStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LeaveStatus::Pending)
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveStatus::Pending => "pending",
            LeaveStatus::Approved => "approved",
            LeaveStatus::Declined => "declined",
        }
    }
}

impl fmt::Display for LeaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Decision {
    pub fn status(&self) -> LeaveStatus {
        match self {
            Decision::Approve => LeaveStatus::Approved,
            Decision::Decline => LeaveStatus::Declined,
        }
    }
}

impl LeaveRequest {
    pub fn days(&self) -> u32 {
        self.chargeable.count
    }
}

impl LeaveApplication {
    /// Construct a new builder object, this becomes the basis for a submission
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }
    pub fn set_leave_type(mut self, leave_type: &str) -> Self {
        self.leave_type = Some(leave_type.to_string());
        self
    }
    pub fn set_start(mut self, day: Day) -> Self {
        self.start = Some(day);
        self
    }
    pub fn set_end(mut self, day: Day) -> Self {
        self.end = Some(day);
        self
    }
    pub fn set_period(self, start: Day, end: Day) -> Self {
        self.set_start(start).set_end(end)
    }
    pub fn set_proof_note(mut self, note: &str) -> Self {
        self.proof_note = Some(note.to_string());
        self
    }
    // Checks every required field is present. Blank strings count as missing.
    pub fn finalise(&self) -> Result<Application, InputError> {
        let subject = non_blank(&self.subject).ok_or(InputError::MissingField("subject"))?;
        let leave_type =
            non_blank(&self.leave_type).ok_or(InputError::MissingField("reason for leave"))?;
        let start = self.start.ok_or(InputError::MissingField("start date"))?;
        let end = self.end.ok_or(InputError::MissingField("end date"))?;
        check_identifier("subject", &subject)?;
        check_identifier("reason for leave", &leave_type)?;

        Ok(Application {
            subject,
            leave_type,
            start,
            end,
            proof_note: non_blank(&self.proof_note),
        })
    }
}

/// Identifiers become parts of NUL separated storage keys.
pub fn check_identifier(field: &'static str, value: &str) -> Result<(), InputError> {
    if value.contains('\0') {
        return Err(InputError::InvalidIdentifier(field));
    }
    Ok(())
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl<C> minicbor::Encode<C> for Day {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.i32(self.0.num_days_from_ce())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Day {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let days = d.i32()?;

        NaiveDate::from_num_days_from_ce_opt(days)
            .map(Day)
            .ok_or(minicbor::decode::Error::message(
                "failed to convert day count to a calendar date",
            ))
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}
