//! Recurrence rules for routine tasks.
//!
//! A rule answers one question: does this routine occur on a given date?
//! Weekday numbering follows the vault convention (0 = Sunday).

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceKind {
    Daily,
    Weekly,
    MonthlyNthWeekday,
    MonthlyDate,
}

/// Ordinal week of a month: 1..=5 or the last occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekOrdinal {
    Nth(u8),
    Last,
}

/// Day of month: 1..=31 or the final calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthDay {
    Day(u8),
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recurrence {
    pub kind: RecurrenceKind,
    pub weekdays: Vec<Weekday>,
    pub weeks: Vec<WeekOrdinal>,
    pub month_days: Vec<MonthDay>,
    /// Values <= 0 behave as 1
    pub interval: i64,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub enabled: bool,
}

impl Default for Recurrence {
    fn default() -> Self {
        Self {
            kind: RecurrenceKind::Daily,
            weekdays: Vec::new(),
            weeks: Vec::new(),
            month_days: Vec::new(),
            interval: 1,
            start: None,
            end: None,
            enabled: true,
        }
    }
}

impl Recurrence {
    pub fn daily() -> Self {
        Self::default()
    }

    pub fn weekly(weekdays: Vec<Weekday>) -> Self {
        Self {
            kind: RecurrenceKind::Weekly,
            weekdays,
            ..Self::default()
        }
    }

    pub fn monthly_nth_weekday(weeks: Vec<WeekOrdinal>, weekdays: Vec<Weekday>) -> Self {
        Self {
            kind: RecurrenceKind::MonthlyNthWeekday,
            weekdays,
            weeks,
            ..Self::default()
        }
    }

    pub fn monthly_date(month_days: Vec<MonthDay>) -> Self {
        Self {
            kind: RecurrenceKind::MonthlyDate,
            month_days,
            ..Self::default()
        }
    }

    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        occurs_on(self, date)
    }
}

/// Does `rule` produce an occurrence on `date`?
pub fn occurs_on(rule: &Recurrence, date: NaiveDate) -> bool {
    if !rule.enabled {
        return false;
    }
    if rule.start.is_some_and(|start| date < start) {
        return false;
    }
    if rule.end.is_some_and(|end| date > end) {
        return false;
    }

    let interval = rule.interval.max(1);
    match rule.kind {
        RecurrenceKind::Daily => {
            interval_matches(rule.start.map(|start| (date - start).num_days()), interval)
        }
        RecurrenceKind::Weekly => {
            rule.weekdays.contains(&date.weekday())
                && interval_matches(rule.start.map(|start| weeks_between(start, date)), interval)
        }
        RecurrenceKind::MonthlyNthWeekday => {
            rule.weekdays.contains(&date.weekday())
                && rule.weeks.iter().any(|week| week_matches(*week, date))
                && interval_matches(rule.start.map(|start| months_between(start, date)), interval)
        }
        RecurrenceKind::MonthlyDate => {
            rule.month_days.iter().any(|day| month_day_matches(*day, date))
                && interval_matches(rule.start.map(|start| months_between(start, date)), interval)
        }
    }
}

// Without a start date there is nothing to count from.
fn interval_matches(elapsed: Option<i64>, interval: i64) -> bool {
    match elapsed {
        Some(elapsed) => elapsed.rem_euclid(interval) == 0,
        None => true,
    }
}

fn week_matches(week: WeekOrdinal, date: NaiveDate) -> bool {
    match week {
        WeekOrdinal::Nth(n) => u32::from(n) == (date.day() - 1) / 7 + 1,
        WeekOrdinal::Last => date.day() + 7 > days_in_month(date.year(), date.month()),
    }
}

fn month_day_matches(day: MonthDay, date: NaiveDate) -> bool {
    match day {
        MonthDay::Day(n) => u32::from(n) == date.day(),
        MonthDay::Last => date.day() == days_in_month(date.year(), date.month()),
    }
}

/// Whole Sunday-anchored weeks between the weeks containing `from` and `to`.
fn weeks_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (week_start(to) - week_start(from)).num_days() / 7
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    let from_index = i64::from(from.year()) * 12 + i64::from(from.month0());
    let to_index = i64::from(to.year()) * 12 + i64::from(to.month0());
    to_index - from_index
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(31)
}

/// Weekday from the vault's 0 = Sunday numbering
pub fn weekday_from_index(index: i64) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn daily_honours_interval_from_start() {
        let mut rule = Recurrence::daily();
        rule.interval = 3;
        rule.start = Some(date("2024-01-01"));
        assert!(rule.occurs_on(date("2024-01-01")));
        assert!(!rule.occurs_on(date("2024-01-02")));
        assert!(rule.occurs_on(date("2024-01-04")));
        assert!(!rule.occurs_on(date("2023-12-29")));
    }

    #[test]
    fn non_positive_interval_behaves_as_one() {
        let mut rule = Recurrence::daily();
        rule.start = Some(date("2024-01-01"));
        rule.interval = 0;
        assert!(rule.occurs_on(date("2024-01-02")));
        rule.interval = -4;
        assert!(rule.occurs_on(date("2024-01-03")));
    }

    #[test]
    fn bounds_and_enabled_flag_apply_to_every_kind() {
        let mut rule = Recurrence::weekly(vec![Weekday::Mon]);
        rule.start = Some(date("2024-01-08"));
        rule.end = Some(date("2024-01-22"));
        assert!(!rule.occurs_on(date("2024-01-01")));
        assert!(rule.occurs_on(date("2024-01-15")));
        assert!(rule.occurs_on(date("2024-01-22")));
        assert!(!rule.occurs_on(date("2024-01-29")));

        rule.enabled = false;
        assert!(!rule.occurs_on(date("2024-01-15")));
    }

    #[test]
    fn weekly_interval_counts_weeks() {
        let mut rule = Recurrence::weekly(vec![Weekday::Wed, Weekday::Fri]);
        rule.interval = 2;
        // Monday; the week containing it is week zero.
        rule.start = Some(date("2024-01-01"));
        assert!(rule.occurs_on(date("2024-01-03")));
        assert!(rule.occurs_on(date("2024-01-05")));
        assert!(!rule.occurs_on(date("2024-01-10")));
        assert!(rule.occurs_on(date("2024-01-17")));
        assert!(!rule.occurs_on(date("2024-01-16")));
    }

    #[test]
    fn first_monday_of_month() {
        let rule = Recurrence::monthly_nth_weekday(vec![WeekOrdinal::Nth(1)], vec![Weekday::Mon]);
        assert!(rule.occurs_on(date("2024-01-01")));
        assert!(!rule.occurs_on(date("2024-01-08")));
        assert!(rule.occurs_on(date("2024-02-05")));
    }

    #[test]
    fn last_friday_and_fifth_week() {
        let last = Recurrence::monthly_nth_weekday(vec![WeekOrdinal::Last], vec![Weekday::Fri]);
        assert!(last.occurs_on(date("2024-01-26")));
        assert!(!last.occurs_on(date("2024-01-19")));
        assert!(last.occurs_on(date("2024-03-29")));

        let fifth = Recurrence::monthly_nth_weekday(vec![WeekOrdinal::Nth(5)], vec![Weekday::Wed]);
        assert!(fifth.occurs_on(date("2024-01-31")));
        assert!(!fifth.occurs_on(date("2024-01-24")));
    }

    #[test]
    fn monthly_last_day_tracks_month_length() {
        let rule = Recurrence::monthly_date(vec![MonthDay::Last]);
        assert!(rule.occurs_on(date("2024-02-29")));
        assert!(!rule.occurs_on(date("2024-02-28")));
        assert!(rule.occurs_on(date("2023-02-28")));
        assert!(rule.occurs_on(date("2024-04-30")));
        assert!(rule.occurs_on(date("2024-12-31")));
    }

    #[test]
    fn monthly_date_with_interval() {
        let mut rule = Recurrence::monthly_date(vec![MonthDay::Day(15)]);
        rule.interval = 3;
        rule.start = Some(date("2024-01-01"));
        assert!(rule.occurs_on(date("2024-01-15")));
        assert!(!rule.occurs_on(date("2024-02-15")));
        assert!(rule.occurs_on(date("2024-04-15")));
    }

    #[test]
    fn empty_selections_never_occur() {
        assert!(!Recurrence::weekly(Vec::new()).occurs_on(date("2024-01-01")));
        assert!(!Recurrence::monthly_date(Vec::new()).occurs_on(date("2024-01-01")));
    }

    #[test]
    fn days_in_month_handles_december_and_leap_years() {
        assert_eq!(days_in_month(2024, 12), 31);
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2100, 2), 28);
    }
}
