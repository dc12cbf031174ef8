//! Time handling shared by the routes, the reconciler and the assistant:
//! timestamp parsing in the caller's timezone, all-day normalization and
//! expansion of recurring events into occurrences.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;
use sqlx::SqlitePool;

use crate::db::models::{Event, EventOccurrence, RecurrencePattern};
use crate::db::repository::EventRepository;
use crate::error::{AppError, AppResult};

/// Hard cap on occurrences produced for a single series in one window.
const MAX_OCCURRENCES_PER_SERIES: usize = 1000;

/// A timestamp as written by a client or the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTime {
    /// Full instant (offset given, or wall-clock resolved in the caller's zone).
    Instant(DateTime<Utc>),
    /// Bare calendar date, only meaningful for all-day events.
    Date(NaiveDate),
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

pub fn parse_timezone(name: Option<&str>) -> AppResult<Tz> {
    match name.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(Tz::UTC),
        Some(name) => name
            .parse::<Tz>()
            .map_err(|_| AppError::Validation(format!("Unknown timezone: {}", name))),
    }
}

/// Resolve a wall-clock time in `tz`.
///
/// Ambiguous times (DST fall-back) take the earlier instant; times inside a
/// DST gap are moved forward by the gap.
pub fn local_to_utc(naive: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => match tz.from_local_datetime(&(naive + Duration::hours(1))) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
            LocalResult::None => Utc.from_utc_datetime(&naive),
        },
    }
}

pub fn parse_time(input: &str, tz: Tz) -> Option<ParsedTime> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(ParsedTime::Instant(dt.with_timezone(&Utc)));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Some(ParsedTime::Instant(local_to_utc(naive, tz)));
        }
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .map(ParsedTime::Date)
}

/// Calendar day of `instant` as seen in `tz`.
pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// First and last instant of a local calendar day.
pub fn day_bounds(date: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = local_to_utc(date.and_time(NaiveTime::MIN), tz);
    let end = local_to_utc(date.and_time(end_of_day()), tz);
    (start, end)
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

/// All-day span covering `start_day..=end_day` in `tz`: 00:00:00 of the first
/// day to 23:59:59 of the last. An end day before the start day collapses to
/// a single day.
pub fn normalize_all_day(start_day: NaiveDate, end_day: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let end_day = end_day.max(start_day);
    let start = local_to_utc(start_day.and_time(NaiveTime::MIN), tz);
    let end = local_to_utc(end_day.and_time(end_of_day()), tz);
    (start, end)
}

/// Same as [`normalize_all_day`] for instants; the days are taken in `tz`.
pub fn normalize_all_day_instants(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    tz: Tz,
) -> (DateTime<Utc>, DateTime<Utc>) {
    normalize_all_day(local_date(start, tz), local_date(end, tz), tz)
}

/// Turn a parsed start/end pair into the stored span.
pub fn resolve_span(
    start: ParsedTime,
    end: ParsedTime,
    all_day: bool,
    tz: Tz,
) -> Result<(DateTime<Utc>, DateTime<Utc>), String> {
    if all_day {
        let day = |t: ParsedTime| match t {
            ParsedTime::Date(d) => d,
            ParsedTime::Instant(i) => local_date(i, tz),
        };
        return Ok(normalize_all_day(day(start), day(end), tz));
    }

    match (start, end) {
        (ParsedTime::Instant(s), ParsedTime::Instant(e)) => {
            if e < s {
                Err("the end time is before the start time".to_string())
            } else {
                Ok((s, e))
            }
        }
        _ => Err("a timed event needs a time of day for both start and end".to_string()),
    }
}

pub fn validate_title(title: &str) -> AppResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Title must not be empty".to_string()));
    }
    Ok(title.to_string())
}

/// Local wall-clock start of the `n`-th occurrence. Month arithmetic clamps
/// to the last day of a short month; [`lands_on_series_day`] filters those out.
fn nth_local(first: NaiveDateTime, pattern: RecurrencePattern, n: u32) -> Option<NaiveDateTime> {
    match pattern {
        RecurrencePattern::Daily => first.checked_add_signed(Duration::days(i64::from(n))),
        RecurrencePattern::Weekly => first.checked_add_signed(Duration::weeks(i64::from(n))),
        RecurrencePattern::Monthly => first.checked_add_months(Months::new(n)),
        RecurrencePattern::Yearly => first.checked_add_months(Months::new(n.checked_mul(12)?)),
    }
}

/// Monthly and yearly rules skip months without the series' day (RFC 5545),
/// so Jan 31 has no February occurrence and Feb 29 only recurs in leap years.
fn lands_on_series_day(first: NaiveDateTime, candidate: NaiveDateTime, pattern: RecurrencePattern) -> bool {
    match pattern {
        RecurrencePattern::Daily | RecurrencePattern::Weekly => true,
        RecurrencePattern::Monthly | RecurrencePattern::Yearly => candidate.day() == first.day(),
    }
}

/// Index of the first occurrence that could still overlap a window starting at
/// `window_start`, so long-running series do not walk from their first day.
fn first_candidate(event: &Event, pattern: RecurrencePattern, window_start: DateTime<Utc>) -> u32 {
    let lead = window_start - (event.end - event.start) - event.start;
    if lead <= Duration::zero() {
        return 0;
    }
    let approx = match pattern {
        RecurrencePattern::Daily => lead.num_days(),
        RecurrencePattern::Weekly => lead.num_weeks(),
        RecurrencePattern::Monthly => lead.num_days() / 31,
        RecurrencePattern::Yearly => lead.num_days() / 366,
    };
    // Step back one to absorb DST and month-length slack.
    u32::try_from((approx - 1).max(0)).unwrap_or(u32::MAX)
}

fn occurrence(event: &Event, start: DateTime<Utc>, end: DateTime<Utc>) -> EventOccurrence {
    EventOccurrence {
        event_id: event.id.clone(),
        title: event.title.clone(),
        start,
        end,
        all_day: event.all_day,
        color: event.color.clone(),
        recurring: event.is_recurring(),
    }
}

/// Occurrences of one event overlapping `[window_start, window_end]`, boundaries included.
pub fn expand_event(
    event: &Event,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    tz: Tz,
) -> Vec<EventOccurrence> {
    let Some(recurrence) = &event.recurrence else {
        return if event.overlaps(window_start, window_end) {
            vec![occurrence(event, event.start, event.end)]
        } else {
            Vec::new()
        };
    };

    let duration = event.end - event.start;
    let mut out = Vec::new();
    let mut n = first_candidate(event, recurrence.pattern, window_start);

    let first_local = event.start.with_timezone(&tz).naive_local();

    while out.len() < MAX_OCCURRENCES_PER_SERIES {
        let Some(local) = nth_local(first_local, recurrence.pattern, n) else {
            break;
        };
        let start = local_to_utc(local, tz);
        if start > window_end {
            break;
        }
        if recurrence.until.is_some_and(|until| start > until) {
            break;
        }
        let end = start + duration;
        if end >= window_start && lands_on_series_day(first_local, local, recurrence.pattern) {
            out.push(occurrence(event, start, end));
        }
        n = match n.checked_add(1) {
            Some(next) => next,
            None => break,
        };
    }

    out
}

/// Expand a set of events into occurrences sorted by start.
pub fn expand_in_window(
    events: &[Event],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    tz: Tz,
) -> Vec<EventOccurrence> {
    let mut all: Vec<EventOccurrence> = events
        .iter()
        .flat_map(|e| expand_event(e, window_start, window_end, tz))
        .collect();
    all.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.event_id.cmp(&b.event_id)));
    all
}

/// Stored events plus recurring series, expanded over the window.
pub async fn occurrences_in_window(
    db: &SqlitePool,
    owner_id: &str,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    tz: Tz,
) -> AppResult<Vec<EventOccurrence>> {
    let mut events = EventRepository::list_in_range(db, owner_id, window_start, window_end).await?;
    for series in EventRepository::list_recurring_in_range(db, owner_id, window_start, window_end).await? {
        if !events.iter().any(|e| e.id == series.id) {
            events.push(series);
        }
    }
    Ok(expand_in_window(&events, window_start, window_end, tz))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Recurrence;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn event(start: &str, end: &str, recurrence: Option<Recurrence>) -> Event {
        Event {
            id: "e1".to_string(),
            owner_id: "o1".to_string(),
            foreign_id: None,
            title: "Standup".to_string(),
            description: None,
            start: utc(start),
            end: utc(end),
            all_day: false,
            color: None,
            recurrence,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn naive_time_is_read_in_caller_zone() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let parsed = parse_time("2025-06-11T15:00:00", tz).unwrap();
        assert_eq!(parsed, ParsedTime::Instant(utc("2025-06-11T19:00:00Z")));
    }

    #[test]
    fn offset_wins_over_caller_zone() {
        let tz: Tz = "Europe/Berlin".parse().unwrap();
        let parsed = parse_time("2025-06-11T15:00:00-04:00", tz).unwrap();
        assert_eq!(parsed, ParsedTime::Instant(utc("2025-06-11T19:00:00Z")));
    }

    #[test]
    fn date_only_and_garbage() {
        assert_eq!(
            parse_time("2025-03-01", Tz::UTC),
            Some(ParsedTime::Date(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()))
        );
        assert_eq!(parse_time("tomorrow", Tz::UTC), None);
        assert_eq!(parse_time("  ", Tz::UTC), None);
    }

    #[test]
    fn all_day_covers_whole_days() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let (start, end) = normalize_all_day(day, day, Tz::UTC);
        assert_eq!(start, utc("2025-03-01T00:00:00Z"));
        assert_eq!(end, utc("2025-03-01T23:59:59Z"));
        assert!(end >= start);
    }

    #[test]
    fn all_day_reversed_collapses_to_start_day() {
        let start_day = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
        let end_day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let (start, end) = normalize_all_day(start_day, end_day, Tz::UTC);
        assert_eq!(start, utc("2025-03-05T00:00:00Z"));
        assert_eq!(end, utc("2025-03-05T23:59:59Z"));
    }

    #[test]
    fn all_day_uses_local_midnight() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let (start, end) =
            normalize_all_day_instants(utc("2025-06-11T19:00:00Z"), utc("2025-06-11T20:00:00Z"), tz);
        assert_eq!(start, utc("2025-06-11T04:00:00Z"));
        assert_eq!(end, utc("2025-06-12T03:59:59Z"));
    }

    #[test]
    fn timed_span_rejects_reversed_and_date_only() {
        let s = ParsedTime::Instant(utc("2025-06-11T15:00:00Z"));
        let e = ParsedTime::Instant(utc("2025-06-11T14:00:00Z"));
        assert!(resolve_span(s, e, false, Tz::UTC).is_err());

        let d = ParsedTime::Date(NaiveDate::from_ymd_opt(2025, 6, 11).unwrap());
        assert!(resolve_span(d, d, false, Tz::UTC).is_err());
        assert!(resolve_span(d, d, true, Tz::UTC).is_ok());
    }

    #[test]
    fn single_event_overlap_is_inclusive() {
        let e = event("2025-01-01T10:00:00Z", "2025-01-01T11:00:00Z", None);
        assert_eq!(
            expand_event(&e, utc("2025-01-01T11:00:00Z"), utc("2025-01-01T12:00:00Z"), Tz::UTC).len(),
            1
        );
        assert_eq!(
            expand_event(&e, utc("2025-01-01T09:00:00Z"), utc("2025-01-01T10:00:00Z"), Tz::UTC).len(),
            1
        );
        assert!(expand_event(&e, utc("2025-01-01T11:00:01Z"), utc("2025-01-02T00:00:00Z"), Tz::UTC)
            .is_empty());
    }

    #[test]
    fn weekly_series_stops_at_until() {
        let e = event(
            "2025-01-01T09:00:00Z",
            "2025-01-01T09:30:00Z",
            Some(Recurrence {
                pattern: RecurrencePattern::Weekly,
                until: Some(utc("2025-01-15T09:00:00Z")),
            }),
        );
        let occ = expand_event(&e, utc("2024-12-01T00:00:00Z"), utc("2025-03-01T00:00:00Z"), Tz::UTC);
        let starts: Vec<_> = occ.iter().map(|o| o.start).collect();
        assert_eq!(
            starts,
            vec![
                utc("2025-01-01T09:00:00Z"),
                utc("2025-01-08T09:00:00Z"),
                utc("2025-01-15T09:00:00Z"),
            ]
        );
        assert!(occ.iter().all(|o| o.recurring));
    }

    #[test]
    fn daily_series_far_in_the_past_skips_ahead() {
        let e = event(
            "2020-01-01T09:00:00Z",
            "2020-01-01T10:00:00Z",
            Some(Recurrence {
                pattern: RecurrencePattern::Daily,
                until: None,
            }),
        );
        let occ = expand_event(&e, utc("2025-06-10T00:00:00Z"), utc("2025-06-12T23:59:59Z"), Tz::UTC);
        assert_eq!(occ.len(), 3);
        assert_eq!(occ[0].start, utc("2025-06-10T09:00:00Z"));
    }

    #[test]
    fn weekly_series_keeps_wall_clock_across_dst() {
        let tz: Tz = "America/New_York".parse().unwrap();
        // 09:00 EST on 2025-03-03, DST starts 2025-03-09.
        let e = event(
            "2025-03-03T14:00:00Z",
            "2025-03-03T15:00:00Z",
            Some(Recurrence {
                pattern: RecurrencePattern::Weekly,
                until: None,
            }),
        );
        let occ = expand_event(&e, utc("2025-03-09T00:00:00Z"), utc("2025-03-11T00:00:00Z"), tz);
        assert_eq!(occ.len(), 1);
        assert_eq!(occ[0].start, utc("2025-03-10T13:00:00Z"));
    }

    #[test]
    fn monthly_series_skips_months_without_the_day() {
        let e = event(
            "2025-01-31T12:00:00Z",
            "2025-01-31T13:00:00Z",
            Some(Recurrence {
                pattern: RecurrencePattern::Monthly,
                until: None,
            }),
        );
        let occ = expand_event(&e, utc("2025-02-01T00:00:00Z"), utc("2025-05-31T23:59:59Z"), Tz::UTC);
        let starts: Vec<_> = occ.iter().map(|o| o.start).collect();
        assert_eq!(
            starts,
            vec![utc("2025-03-31T12:00:00Z"), utc("2025-05-31T12:00:00Z")]
        );
    }

    #[test]
    fn yearly_leap_day_series_recurs_only_in_leap_years() {
        let e = event(
            "2024-02-29T09:00:00Z",
            "2024-02-29T10:00:00Z",
            Some(Recurrence {
                pattern: RecurrencePattern::Yearly,
                until: None,
            }),
        );
        let occ = expand_event(&e, utc("2024-03-01T00:00:00Z"), utc("2028-12-31T00:00:00Z"), Tz::UTC);
        let starts: Vec<_> = occ.iter().map(|o| o.start).collect();
        assert_eq!(starts, vec![utc("2028-02-29T09:00:00Z")]);
    }

    #[test]
    fn unknown_timezone_is_a_validation_error() {
        assert!(parse_timezone(Some("Mars/Olympus")).is_err());
        assert_eq!(parse_timezone(None).unwrap(), Tz::UTC);
    }
}
