use chrono::{Days, Months, NaiveDate};

use crate::models::RepeatInterval;

impl RepeatInterval {
    /// Next renewal date after `anchor` for this interval.
    ///
    /// Month- and year-based intervals clamp day-of-month overflow, so
    /// Jan 31 + 1 month lands on the last day of February rather than an
    /// out-of-range date. `Never` has no next date.
    pub fn next_renewal(&self, anchor: NaiveDate) -> Option<NaiveDate> {
        match self {
            RepeatInterval::Weekly => anchor.checked_add_days(Days::new(7)),
            RepeatInterval::Biweekly => anchor.checked_add_days(Days::new(14)),
            RepeatInterval::Semimonthly => anchor.checked_add_days(Days::new(15)),
            RepeatInterval::Monthly => anchor.checked_add_months(Months::new(1)),
            RepeatInterval::Bimonthly => anchor.checked_add_months(Months::new(2)),
            RepeatInterval::Quarterly => anchor.checked_add_months(Months::new(3)),
            RepeatInterval::Semiannually => anchor.checked_add_months(Months::new(6)),
            RepeatInterval::Yearly => anchor.checked_add_months(Months::new(12)),
            RepeatInterval::Never => None,
        }
    }

    /// True for intervals that produce a next date.
    pub fn is_recurring(&self) -> bool {
        !matches!(self, RepeatInterval::Never)
    }
}
