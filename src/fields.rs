//! Frontmatter field accessors.
//!
//! Task notes carry two generations of field names (for example
//! `scheduled_time` and the legacy `開始時刻`). Reads always prefer the
//! current name; writes target one generation and drop the other so a stale
//! value can never shadow the new one.

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde_json::Value;

use crate::frontmatter::Frontmatter;
use crate::recurrence::{weekday_from_index, MonthDay, Recurrence, RecurrenceKind, WeekOrdinal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Routine,
    ScheduledTime,
    RoutineType,
    RoutineInterval,
    RoutineStart,
    RoutineEnd,
    RoutineEnabled,
    Weekday,
    Weekdays,
    Week,
    Weeks,
    MonthDay,
    MonthDays,
    /// 0-based week of the oldest monthly schema
    LegacyMonthlyWeek,
    Project,
    ProjectPath,
}

/// Which generation of a field name a write should use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTarget {
    Current,
    Legacy,
}

impl Field {
    pub fn current_name(self) -> &'static str {
        match self {
            Field::Routine => "isRoutine",
            Field::ScheduledTime => "scheduled_time",
            Field::RoutineType => "routine_type",
            Field::RoutineInterval => "routine_interval",
            Field::RoutineStart => "routine_start",
            Field::RoutineEnd => "routine_end",
            Field::RoutineEnabled => "routine_enabled",
            Field::Weekday => "routine_weekday",
            Field::Weekdays => "routine_weekdays",
            Field::Week => "routine_week",
            Field::Weeks => "routine_weeks",
            Field::MonthDay => "routine_monthday",
            Field::MonthDays => "routine_monthdays",
            Field::LegacyMonthlyWeek => "monthly_week",
            Field::Project => "project",
            Field::ProjectPath => "project_path",
        }
    }

    pub fn legacy_names(self) -> &'static [&'static str] {
        match self {
            Field::Routine => &["routine"],
            Field::ScheduledTime => &["開始時刻"],
            Field::Weekday => &["weekday", "monthly_weekday"],
            Field::Weekdays => &["weekdays"],
            _ => &[],
        }
    }
}

/// Raw value of a field, current name first.
pub fn get(fm: &Frontmatter, field: Field) -> Option<&Value> {
    std::iter::once(field.current_name())
        .chain(field.legacy_names().iter().copied())
        .filter_map(|name| fm.get(name))
        .find(|value| !value.is_null())
}

/// Set a field under one generation's name, removing the other generation.
pub fn set(fm: &mut Frontmatter, field: Field, value: Value, target: FieldTarget) {
    let legacy = field.legacy_names();
    let name = match (target, legacy.first()) {
        (FieldTarget::Legacy, Some(name)) => *name,
        _ => field.current_name(),
    };
    remove(fm, field);
    fm.insert(name.to_string(), value);
}

pub fn remove(fm: &mut Frontmatter, field: Field) {
    fm.remove(field.current_name());
    for name in field.legacy_names() {
        fm.remove(*name);
    }
}

pub fn get_str(fm: &Frontmatter, field: Field) -> Option<&str> {
    get(fm, field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn get_bool(fm: &Frontmatter, field: Field) -> Option<bool> {
    match get(fm, field)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub fn get_int(fm: &Frontmatter, field: Field) -> Option<i64> {
    value_as_int(get(fm, field)?)
}

pub fn get_date(fm: &Frontmatter, field: Field) -> Option<NaiveDate> {
    parse_date(get_str(fm, field)?)
}

pub fn get_time(fm: &Frontmatter, field: Field) -> Option<NaiveTime> {
    parse_clock(get_str(fm, field)?)
}

fn value_as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Scalar or list field flattened to its elements.
fn values_of<'a>(fm: &'a Frontmatter, field: Field) -> Vec<&'a Value> {
    match get(fm, field) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(value) => vec![value],
        None => Vec::new(),
    }
}

fn is_last(value: &Value) -> bool {
    value
        .as_str()
        .is_some_and(|s| s.trim().eq_ignore_ascii_case("last"))
}

/// `YYYY-MM-DD`; anything else is treated as absent.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// `HH:mm` or `HH:mm:ss`; anything else is treated as absent.
pub fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

/// Project link as written in the note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRef {
    pub title: String,
    pub path: Option<String>,
}

/// Everything the reconciler reads from one task note.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskMetadata {
    pub is_routine: bool,
    pub scheduled_time: Option<NaiveTime>,
    pub recurrence: Option<Recurrence>,
    pub project: Option<ProjectRef>,
}

impl TaskMetadata {
    pub fn from_frontmatter(fm: &Frontmatter) -> Self {
        let is_routine = get_bool(fm, Field::Routine).unwrap_or(false);
        let recurrence = is_routine.then(|| recurrence_from(fm));
        Self {
            is_routine,
            scheduled_time: get_time(fm, Field::ScheduledTime),
            recurrence,
            project: project_from(fm),
        }
    }
}

/// Strip `[[...]]` (and any `|alias`) from a wikilink.
pub fn wikilink_title(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("[[")
        .and_then(|s| s.strip_suffix("]]"))
        .unwrap_or(trimmed);
    let title = inner.split('|').next().unwrap_or(inner).trim();
    let title = title.strip_suffix(".md").unwrap_or(title);
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

fn project_from(fm: &Frontmatter) -> Option<ProjectRef> {
    let path = get_str(fm, Field::ProjectPath).map(str::to_string);
    let title = get_str(fm, Field::Project).and_then(wikilink_title);
    match (title, path) {
        (Some(title), path) => Some(ProjectRef { title, path }),
        (None, Some(path)) => {
            let title = path
                .rsplit('/')
                .next()
                .map(|name| name.trim_end_matches(".md").to_string())
                .unwrap_or_else(|| path.clone());
            Some(ProjectRef {
                title,
                path: Some(path),
            })
        }
        (None, None) => None,
    }
}

fn recurrence_from(fm: &Frontmatter) -> Recurrence {
    let kind_raw = get_str(fm, Field::RoutineType)
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "daily".to_string());

    let mut weekdays = weekdays_from(fm);
    let kind = match kind_raw.as_str() {
        "weekly" => RecurrenceKind::Weekly,
        "weekdays" => {
            weekdays = vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri];
            RecurrenceKind::Weekly
        }
        "weekends" => {
            weekdays = vec![Weekday::Sat, Weekday::Sun];
            RecurrenceKind::Weekly
        }
        "monthly" => RecurrenceKind::MonthlyNthWeekday,
        "monthly_date" => RecurrenceKind::MonthlyDate,
        "daily" => RecurrenceKind::Daily,
        other => {
            tracing::warn!(routine_type = other, "unknown routine type, treating as daily");
            RecurrenceKind::Daily
        }
    };

    Recurrence {
        kind,
        weekdays,
        weeks: weeks_from(fm),
        month_days: month_days_from(fm),
        interval: get_int(fm, Field::RoutineInterval).unwrap_or(1).max(1),
        start: get_date(fm, Field::RoutineStart),
        end: get_date(fm, Field::RoutineEnd),
        enabled: get_bool(fm, Field::RoutineEnabled).unwrap_or(true),
    }
}

fn weekdays_from(fm: &Frontmatter) -> Vec<Weekday> {
    let mut values = values_of(fm, Field::Weekdays);
    if values.is_empty() {
        values = values_of(fm, Field::Weekday);
    }
    let mut out = Vec::new();
    for weekday in values
        .into_iter()
        .filter_map(value_as_int)
        .filter_map(weekday_from_index)
    {
        if !out.contains(&weekday) {
            out.push(weekday);
        }
    }
    out
}

fn weeks_from(fm: &Frontmatter) -> Vec<WeekOrdinal> {
    let mut values = values_of(fm, Field::Weeks);
    if values.is_empty() {
        values = values_of(fm, Field::Week);
    }
    let mut out: Vec<WeekOrdinal> = values
        .into_iter()
        .filter_map(|value| {
            if is_last(value) {
                return Some(WeekOrdinal::Last);
            }
            match value_as_int(value)? {
                n @ 1..=5 => Some(WeekOrdinal::Nth(n as u8)),
                _ => None,
            }
        })
        .collect();

    if out.is_empty() {
        out = values_of(fm, Field::LegacyMonthlyWeek)
            .into_iter()
            .filter_map(legacy_week)
            .collect();
    }
    out.dedup();
    out
}

/// Oldest schema: weeks counted from 0, `last` or -1 for the final week.
fn legacy_week(value: &Value) -> Option<WeekOrdinal> {
    if is_last(value) {
        return Some(WeekOrdinal::Last);
    }
    match value_as_int(value)? {
        -1 => Some(WeekOrdinal::Last),
        n @ 0..=4 => Some(WeekOrdinal::Nth(n as u8 + 1)),
        _ => None,
    }
}

fn month_days_from(fm: &Frontmatter) -> Vec<MonthDay> {
    let mut values = values_of(fm, Field::MonthDays);
    if values.is_empty() {
        values = values_of(fm, Field::MonthDay);
    }
    let mut out: Vec<MonthDay> = values
        .into_iter()
        .filter_map(|value| {
            if is_last(value) {
                return Some(MonthDay::Last);
            }
            match value_as_int(value)? {
                n @ 1..=31 => Some(MonthDay::Day(n as u8)),
                _ => None,
            }
        })
        .collect();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontmatter;

    fn fm(yaml: &str) -> Frontmatter {
        frontmatter::parse(&format!("---\n{yaml}\n---\n")).expect("frontmatter")
    }

    #[test]
    fn fractional_interval_falls_back_to_default() {
        assert_eq!(get_int(&fm("routine_interval: 2.9"), Field::RoutineInterval), None);
        assert_eq!(get_int(&fm("routine_interval: 3.0"), Field::RoutineInterval), Some(3));
        assert_eq!(get_int(&fm("routine_interval: \"4\""), Field::RoutineInterval), Some(4));
    }

    #[test]
    fn current_name_wins_over_legacy() {
        let fm = fm("scheduled_time: \"10:30\"\n開始時刻: \"08:00\"");
        assert_eq!(
            get_time(&fm, Field::ScheduledTime),
            NaiveTime::from_hms_opt(10, 30, 0)
        );
    }

    #[test]
    fn legacy_name_is_read_when_current_absent() {
        let fm = fm("開始時刻: \"08:15\"\nroutine: true");
        let meta = TaskMetadata::from_frontmatter(&fm);
        assert!(meta.is_routine);
        assert_eq!(meta.scheduled_time, NaiveTime::from_hms_opt(8, 15, 0));
        assert_eq!(meta.recurrence.unwrap().kind, RecurrenceKind::Daily);
    }

    #[test]
    fn set_replaces_other_generation() {
        let mut fm = fm("開始時刻: \"08:00\"");
        set(
            &mut fm,
            Field::ScheduledTime,
            Value::String("09:00".into()),
            FieldTarget::Current,
        );
        assert!(fm.get("開始時刻").is_none());
        assert_eq!(fm["scheduled_time"], Value::String("09:00".into()));

        set(
            &mut fm,
            Field::ScheduledTime,
            Value::String("07:00".into()),
            FieldTarget::Legacy,
        );
        assert!(fm.get("scheduled_time").is_none());
        assert_eq!(fm["開始時刻"], Value::String("07:00".into()));
    }

    #[test]
    fn weekly_rule_reads_current_and_legacy_weekdays() {
        let meta = TaskMetadata::from_frontmatter(&fm(
            "isRoutine: true\nroutine_type: weekly\nroutine_weekdays: [1, 3, 3]\nweekdays: [5]",
        ));
        let rule = meta.recurrence.unwrap();
        assert_eq!(rule.kind, RecurrenceKind::Weekly);
        assert_eq!(rule.weekdays, vec![Weekday::Mon, Weekday::Wed]);

        let legacy = TaskMetadata::from_frontmatter(&fm(
            "routine: true\nroutine_type: weekly\nweekday: 0",
        ));
        assert_eq!(legacy.recurrence.unwrap().weekdays, vec![Weekday::Sun]);
    }

    #[test]
    fn monthly_weeks_accept_last_and_legacy_zero_based() {
        let current = TaskMetadata::from_frontmatter(&fm(
            "isRoutine: true\nroutine_type: monthly\nroutine_weeks: [1, last]\nroutine_weekday: 2",
        ));
        let rule = current.recurrence.unwrap();
        assert_eq!(rule.kind, RecurrenceKind::MonthlyNthWeekday);
        assert_eq!(rule.weeks, vec![WeekOrdinal::Nth(1), WeekOrdinal::Last]);
        assert_eq!(rule.weekdays, vec![Weekday::Tue]);

        let legacy = TaskMetadata::from_frontmatter(&fm(
            "routine: true\nroutine_type: monthly\nmonthly_week: 4\nmonthly_weekday: 5",
        ));
        let rule = legacy.recurrence.unwrap();
        assert_eq!(rule.weeks, vec![WeekOrdinal::Nth(5)]);
        assert_eq!(rule.weekdays, vec![Weekday::Fri]);

        let legacy_first = TaskMetadata::from_frontmatter(&fm(
            "routine: true\nroutine_type: monthly\nmonthly_week: 0\nmonthly_weekday: 1",
        ));
        assert_eq!(legacy_first.recurrence.unwrap().weeks, vec![WeekOrdinal::Nth(1)]);
    }

    #[test]
    fn monthly_date_reads_days_and_last() {
        let meta = TaskMetadata::from_frontmatter(&fm(
            "isRoutine: true\nroutine_type: monthly_date\nroutine_monthdays: [1, \"15\", last, 40]",
        ));
        assert_eq!(
            meta.recurrence.unwrap().month_days,
            vec![MonthDay::Day(1), MonthDay::Day(15), MonthDay::Last]
        );
    }

    #[test]
    fn malformed_fields_degrade_to_defaults() {
        let meta = TaskMetadata::from_frontmatter(&fm(
            "isRoutine: true\nroutine_interval: soon\nroutine_start: yesterday\nscheduled_time: noonish",
        ));
        let rule = meta.recurrence.unwrap();
        assert_eq!(rule.interval, 1);
        assert_eq!(rule.start, None);
        assert_eq!(meta.scheduled_time, None);
    }

    #[test]
    fn weekdays_routine_type_expands() {
        let meta =
            TaskMetadata::from_frontmatter(&fm("isRoutine: true\nroutine_type: weekends"));
        let rule = meta.recurrence.unwrap();
        assert_eq!(rule.kind, RecurrenceKind::Weekly);
        assert_eq!(rule.weekdays, vec![Weekday::Sat, Weekday::Sun]);
    }

    #[test]
    fn project_link_parses_wikilink_and_path() {
        let meta = TaskMetadata::from_frontmatter(&fm("project: \"[[Garden|garden work]]\""));
        assert_eq!(
            meta.project,
            Some(ProjectRef {
                title: "Garden".to_string(),
                path: None
            })
        );

        let meta = TaskMetadata::from_frontmatter(&fm(
            "project: \"[[Garden]]\"\nproject_path: Projects/Garden.md",
        ));
        assert_eq!(meta.project.unwrap().path.as_deref(), Some("Projects/Garden.md"));
    }
}
