//! RRULE expansion for recurring events.
//!
//! Expands a recurring master into concrete occurrences within a window.
//! Each occurrence gets a synthesized uid (`{base}_{startRFC3339}`) so it
//! stays individually addressable in the cache; the master itself is never
//! cached.

use chrono::{DateTime, Duration, Utc};
use rrule::RRuleSet;

use crate::config::MAX_OCCURRENCES;
use crate::error::{SyncError, SyncResult};
use crate::event::{occurrence_uid, EventData};

/// Assemble the iCalendar snippet the rrule crate parses: DTSTART plus
/// RRULE plus EXDATE lines, all in UTC.
fn build_rrule_input(start: DateTime<Utc>, rrule: &str, exdates: &[DateTime<Utc>]) -> String {
    let mut lines = Vec::with_capacity(2 + exdates.len());
    lines.push(format!("DTSTART:{}", start.format("%Y%m%dT%H%M%SZ")));
    lines.push(format!("RRULE:{}", rrule));
    for exdate in exdates {
        lines.push(format!("EXDATE:{}", exdate.format("%Y%m%dT%H%M%SZ")));
    }
    lines.join("\n")
}

/// Expand a recurring master into occurrences overlapping `[from, to]`,
/// capped at [`MAX_OCCURRENCES`]. The occurrences keep the master's fields
/// (including the opaque rule string) with shifted start/end and
/// synthesized uids.
pub fn expand_occurrences(
    master: &EventData,
    rrule: &str,
    exdates: &[DateTime<Utc>],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> SyncResult<Vec<EventData>> {
    let input = build_rrule_input(master.start, rrule, exdates);
    let rrule_set: RRuleSet = input.parse().map_err(|e| {
        SyncError::IcsParse(format!(
            "Failed to parse RRULE for event '{}': {}",
            master.uid, e
        ))
    })?;

    let duration = master.end - master.start;

    // Occurrences starting before the window can still overlap it; widen
    // the query by the event duration, then filter precisely. after/before
    // are exclusive, hence the extra second on each side.
    let after = (from - duration - Duration::seconds(1)).with_timezone(&rrule::Tz::UTC);
    let before = (to + Duration::seconds(1)).with_timezone(&rrule::Tz::UTC);
    let result = rrule_set.after(after).before(before).all(MAX_OCCURRENCES);

    let mut occurrences = Vec::new();
    for occ in &result.dates {
        let start = occ.with_timezone(&Utc);
        let end = start + duration;

        let mut data = master.clone();
        data.uid = occurrence_uid(&master.uid, start);
        data.start = start;
        data.end = end;
        if data.overlaps(from, to) {
            occurrences.push(data);
        }
    }
    Ok(occurrences)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn master(start: DateTime<Utc>) -> EventData {
        EventData::new(
            "cal",
            "daily@example.com",
            "Daily",
            start,
            start + Duration::minutes(30),
        )
    }

    #[test]
    fn expands_daily_rule_within_window() {
        let start = Utc.with_ymd_and_hms(2025, 2, 3, 9, 0, 0).unwrap();
        let occurrences = expand_occurrences(
            &master(start),
            "FREQ=DAILY;COUNT=10",
            &[],
            start,
            start + Duration::days(4),
        )
        .unwrap();

        assert_eq!(occurrences.len(), 5);
        assert_eq!(occurrences[0].start, start);
        assert_eq!(occurrences[0].end, start + Duration::minutes(30));
        // Every occurrence carries a distinct synthesized uid.
        let mut uids: Vec<&str> = occurrences.iter().map(|o| o.uid.as_str()).collect();
        uids.dedup();
        assert_eq!(uids.len(), 5);
    }

    #[test]
    fn exdates_remove_occurrences() {
        let start = Utc.with_ymd_and_hms(2025, 2, 3, 9, 0, 0).unwrap();
        let skipped = start + Duration::days(1);
        let occurrences = expand_occurrences(
            &master(start),
            "FREQ=DAILY;COUNT=3",
            &[skipped],
            start,
            start + Duration::days(10),
        )
        .unwrap();

        assert_eq!(occurrences.len(), 2);
        assert!(occurrences.iter().all(|o| o.start != skipped));
    }

    #[test]
    fn invalid_rule_is_a_parse_error() {
        let start = Utc.with_ymd_and_hms(2025, 2, 3, 9, 0, 0).unwrap();
        let err = expand_occurrences(
            &master(start),
            "FREQ=SOMETIMES",
            &[],
            start,
            start + Duration::days(1),
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::IcsParse(_)));
    }
}
