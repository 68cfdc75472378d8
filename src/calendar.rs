//! Business day arithmetic. Pure, no I/O.
use super::error::InputError;
use super::leave::{Day, Period};

/// Working days in a range and the weekend dates that were left out.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ChargeableDays {
    #[n(0)]
    pub count: u32,
    #[n(1)]
    pub excluded: Vec<Day>, // ascending, no duplicates
}

impl ChargeableDays {
    /// Calendar days covered, chargeable or not.
    pub fn total(&self) -> u32 {
        self.count + self.excluded.len() as u32
    }
}

/// Count the chargeable days between `start` and `end` inclusive.
///
/// Saturdays and Sundays are excluded and returned in ascending order.
/// A weekend-only range yields a count of zero; rejecting such a request
/// is left to the caller.
pub fn chargeable_days(start: Day, end: Day) -> Result<ChargeableDays, InputError> {
    let period = Period::new(start, end)?;
    Ok(chargeable_days_in(&period))
}

pub fn chargeable_days_in(period: &Period) -> ChargeableDays {
    let mut excluded = Vec::new();
    let mut count = 0;
    for day in period.days() {
        if day.is_weekend() {
            excluded.push(day);
        } else {
            count += 1;
        }
    }

    ChargeableDays { count, excluded }
}
