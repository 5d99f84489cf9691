use chrono::Local;

/// Calendar date without a time zone, serialized as `YYYY-MM-DD`.
pub type Date = chrono::NaiveDate;

/// The host's local calendar date at the time of the call.
pub fn today() -> Date {
    Local::now().date_naive()
}
