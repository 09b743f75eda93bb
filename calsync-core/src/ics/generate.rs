//! ICS generation for CalDAV writes.

use icalendar::{Calendar, Component, EventLike, Property, ValueType};

use crate::error::SyncResult;
use crate::event::EventData;

/// Generate a single-VEVENT .ics document for an event.
///
/// All-day events serialize as date-only (`VALUE=DATE`); timed events as UTC
/// datetimes with a `Z` suffix.
pub fn generate_event_ics(data: &EventData) -> SyncResult<String> {
    let mut cal = Calendar::new();

    let mut ics_event = icalendar::Event::new();
    ics_event.uid(&data.uid);
    ics_event.summary(&data.title);

    add_datetime_property(&mut ics_event, "DTSTART", data);
    add_end_property(&mut ics_event, data);

    if let Some(ref desc) = data.description {
        ics_event.description(desc);
    }
    if let Some(ref loc) = data.location {
        ics_event.location(loc);
    }
    if let Some(ref rrule) = data.recurrence {
        ics_event.add_property("RRULE", rrule);
    }
    if let Some(ref url) = data.url {
        ics_event.add_property("URL", url);
    }

    if let Some(ref org) = data.organizer {
        let mut prop = Property::new("ORGANIZER", format!("mailto:{}", org.email));
        if let Some(ref name) = org.name {
            prop.add_parameter("CN", name);
        }
        ics_event.append_property(prop);
    }

    for attendee in &data.attendees {
        let mut prop = Property::new("ATTENDEE", format!("mailto:{}", attendee.email));
        if let Some(ref name) = attendee.name {
            prop.add_parameter("CN", name);
        }
        if let Some(partstat) = attendee.response_status {
            prop.add_parameter("PARTSTAT", partstat.as_ics_str());
        }
        ics_event.append_multi_property(prop);
    }

    let ics_event = ics_event.done();
    cal.push(ics_event);
    let cal = cal.done();

    Ok(strip_ics_bloat(&cal.to_string()))
}

/// Clean up the icalendar crate's output: stable PRODID, drop the default
/// CALSCALE line.
fn strip_ics_bloat(ics: &str) -> String {
    let mut result = String::with_capacity(ics.len());
    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            result.push_str("PRODID:CALSYNC\r\n");
            continue;
        }
        if line == "CALSCALE:GREGORIAN" {
            continue;
        }
        result.push_str(line);
        result.push_str("\r\n");
    }
    result
}

fn add_datetime_property(ics_event: &mut icalendar::Event, name: &str, data: &EventData) {
    if data.all_day {
        let mut prop = Property::new(name, data.start.format("%Y%m%d").to_string());
        prop.append_parameter(ValueType::Date);
        ics_event.append_property(prop);
    } else {
        ics_event.add_property(name, data.start.format("%Y%m%dT%H%M%SZ").to_string());
    }
}

fn add_end_property(ics_event: &mut icalendar::Event, data: &EventData) {
    if data.all_day {
        let mut prop = Property::new("DTEND", data.end.format("%Y%m%d").to_string());
        prop.append_parameter(ValueType::Date);
        ics_event.append_property(prop);
    } else {
        ics_event.add_property("DTEND", data.end.format("%Y%m%dT%H%M%SZ").to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Attendee, ResponseStatus};
    use chrono::{Duration, TimeZone, Utc};

    fn make_event() -> EventData {
        let start = Utc.with_ymd_and_hms(2025, 3, 20, 15, 0, 0).unwrap();
        EventData::new(
            "cal",
            "test-event-123@calsync",
            "Test Event",
            start,
            start + Duration::hours(1),
        )
    }

    #[test]
    fn timed_event_uses_utc_z_datetimes() {
        let ics = generate_event_ics(&make_event()).unwrap();
        assert!(ics.contains("DTSTART:20250320T150000Z"), "ICS:\n{}", ics);
        assert!(ics.contains("DTEND:20250320T160000Z"), "ICS:\n{}", ics);
        assert!(ics.contains("UID:test-event-123@calsync"));
        assert!(ics.contains("PRODID:CALSYNC"));
        assert!(!ics.contains("CALSCALE"));
    }

    #[test]
    fn all_day_event_has_value_date() {
        let mut event = make_event();
        event.all_day = true;
        event.end = event.start + Duration::days(1);

        let ics = generate_event_ics(&event).unwrap();
        assert!(
            ics.contains("DTSTART;VALUE=DATE:20250320"),
            "DTSTART should have VALUE=DATE. ICS:\n{}",
            ics
        );
        assert!(
            ics.contains("DTEND;VALUE=DATE:20250321"),
            "DTEND should have VALUE=DATE. ICS:\n{}",
            ics
        );
    }

    #[test]
    fn attendees_become_multi_properties_with_partstat() {
        let mut event = make_event();
        event.attendees = vec![
            Attendee {
                name: Some("Alice".to_string()),
                email: "alice@example.com".to_string(),
                response_status: Some(ResponseStatus::Accepted),
            },
            Attendee {
                name: None,
                email: "bob@example.com".to_string(),
                response_status: None,
            },
        ];

        let ics = generate_event_ics(&event).unwrap();
        let attendee_count = ics.lines().filter(|l| l.starts_with("ATTENDEE")).count();
        assert_eq!(attendee_count, 2, "ICS:\n{}", ics);
        assert!(ics.contains("PARTSTAT=ACCEPTED"));
        assert!(ics.contains("mailto:bob@example.com"));
    }

    #[test]
    fn round_trips_through_the_parser() {
        let mut event = make_event();
        event.description = Some("Bring the numbers".to_string());
        event.location = Some("Room 9".to_string());

        let ics = generate_event_ics(&event).unwrap();
        let parsed = crate::ics::parse_feed(
            &ics,
            "cal",
            event.start - Duration::days(1),
            event.start + Duration::days(1),
            None,
        )
        .unwrap();

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].uid, event.uid);
        assert_eq!(parsed[0].title, event.title);
        assert_eq!(parsed[0].start, event.start);
        assert_eq!(parsed[0].description, event.description);
    }
}
