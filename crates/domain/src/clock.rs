//! IST-aware calendar boundaries for quota and snapshot period keys.

use chrono::{DateTime, Datelike, FixedOffset, TimeZone, Utc};

/// Fixed +05:30 offset. IST never observes daylight saving, so a fixed
/// offset is exact (unlike a tz-database lookup, which would be needed for
/// a timezone with DST transitions).
pub fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 30 * 60).expect("IST offset is in range")
}

pub fn now_ist() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&ist_offset())
}

pub fn to_ist(t: DateTime<Utc>) -> DateTime<FixedOffset> {
    t.with_timezone(&ist_offset())
}

/// `YYYY-MM-DD` in IST, used as a daily quota/snapshot period key.
pub fn ist_day_key(t: DateTime<Utc>) -> String {
    to_ist(t).format("%Y-%m-%d").to_string()
}

/// `YYYY-Www` ISO week key in IST, used as a weekly quota/snapshot period key.
pub fn ist_week_key(t: DateTime<Utc>) -> String {
    let ist = to_ist(t);
    let iso = ist.iso_week();
    format!("{:04}-W{:02}", iso.year(), iso.week())
}

/// `YYYY-MM` in IST, used as a monthly quota period key.
pub fn ist_month_key(t: DateTime<Utc>) -> String {
    to_ist(t).format("%Y-%m").to_string()
}

/// The instant a daily counter keyed at `t` resets: the start of the next
/// IST calendar day, expressed in UTC.
pub fn next_ist_midnight(t: DateTime<Utc>) -> DateTime<Utc> {
    let ist = to_ist(t);
    let next_day = ist.date_naive().succ_opt().expect("date does not overflow");
    let next_midnight_ist = ist_offset()
        .from_local_datetime(&next_day.and_hms_opt(0, 0, 0).expect("valid time"))
        .single()
        .expect("unambiguous local time for a fixed offset");
    next_midnight_ist.with_timezone(&Utc)
}

/// The instant a weekly counter keyed at `t` resets: the start of the next
/// IST Monday, expressed in UTC.
pub fn next_ist_week_start(t: DateTime<Utc>) -> DateTime<Utc> {
    let ist = to_ist(t);
    let today = ist.date_naive();
    let days_until_monday = (7 - today.weekday().num_days_from_monday()) % 7;
    let days_until_monday = if days_until_monday == 0 {
        7
    } else {
        days_until_monday
    };
    let next_monday = today + chrono::Duration::days(days_until_monday as i64);
    let next_midnight_ist = ist_offset()
        .from_local_datetime(&next_monday.and_hms_opt(0, 0, 0).expect("valid time"))
        .single()
        .expect("unambiguous local time for a fixed offset");
    next_midnight_ist.with_timezone(&Utc)
}

/// The instant a monthly counter keyed at `t` resets: the start of the next
/// IST calendar month, expressed in UTC.
pub fn next_ist_month_start(t: DateTime<Utc>) -> DateTime<Utc> {
    let ist = to_ist(t);
    let (year, month) = (ist.year(), ist.month());
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let next = chrono::NaiveDate::from_ymd_opt(next_year, next_month, 1).expect("valid date");
    let next_midnight_ist = ist_offset()
        .from_local_datetime(&next.and_hms_opt(0, 0, 0).expect("valid time"))
        .single()
        .expect("unambiguous local time for a fixed offset");
    next_midnight_ist.with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn day_key_crosses_utc_midnight_boundary() {
        // 2024-01-01 19:00 UTC == 2024-01-02 00:30 IST
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 19, 0, 0).unwrap();
        assert_eq!(ist_day_key(t), "2024-01-02");
    }

    #[test]
    fn next_midnight_is_in_the_future() {
        let t = Utc::now();
        assert!(next_ist_midnight(t) > t);
    }

    #[test]
    fn week_start_is_a_monday_in_ist() {
        let t = Utc::now();
        let next = next_ist_week_start(t);
        let ist = to_ist(next);
        assert_eq!(ist.weekday(), chrono::Weekday::Mon);
    }
}
