//! ICS feed parsing using the icalendar crate's parser.

use chrono::{DateTime, Duration, TimeZone, Utc};
use icalendar::{
    parser::{read_calendar, unfold, Component, Property},
    DatePerhapsTime,
};

use crate::error::{SyncError, SyncResult};
use crate::event::{Attendee, EventData, ResponseStatus};
use crate::recurrence::expand_occurrences;

/// Parse a whole ICS feed into normalized events.
///
/// Recurring masters are expanded into occurrences within `[from, to]`
/// (synthesized uids, capped); non-recurring events are kept when they
/// overlap the window. `owner_email` resolves the owning user's RSVP status
/// from ATTENDEE PARTSTAT parameters.
pub fn parse_feed(
    content: &str,
    calendar_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    owner_email: Option<&str>,
) -> SyncResult<Vec<EventData>> {
    let unfolded = unfold(content);
    let calendar =
        read_calendar(&unfolded).map_err(|e| SyncError::IcsParse(e.to_string()))?;

    let mut events = Vec::new();
    for component in &calendar.components {
        if component.name != "VEVENT" {
            continue;
        }
        let Some((data, exdates, rrule)) = parse_vevent(component, calendar_id, owner_email)
        else {
            continue;
        };

        match rrule {
            Some(rrule) => {
                events.extend(expand_occurrences(&data, &rrule, &exdates, from, to)?);
            }
            None => {
                if data.overlaps(from, to) {
                    events.push(data);
                }
            }
        }
    }
    Ok(events)
}

/// Parse one VEVENT. Returns the normalized event plus its EXDATEs and
/// RRULE when it is a recurring master. Events without a UID or DTSTART are
/// skipped.
fn parse_vevent(
    vevent: &Component,
    calendar_id: &str,
    owner_email: Option<&str>,
) -> Option<(EventData, Vec<DateTime<Utc>>, Option<String>)> {
    let uid = vevent.find_prop("UID")?.val.to_string();
    let title = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .unwrap_or_else(|| "(No title)".to_string());

    let (start, all_day) =
        to_utc(DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?);
    let end = match vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
    {
        Some(dpt) => to_utc(dpt).0,
        // DTEND is optional; all-day events default to one day, timed
        // events to a zero-length instant.
        None if all_day => start + Duration::days(1),
        None => start,
    };

    let description = vevent.find_prop("DESCRIPTION").map(|p| p.val.to_string());
    let location = vevent.find_prop("LOCATION").map(|p| p.val.to_string());
    let url = vevent.find_prop("URL").map(|p| p.val.to_string());

    let organizer = vevent.find_prop("ORGANIZER").map(parse_attendee);
    let attendees: Vec<Attendee> = vevent
        .properties
        .iter()
        .filter(|p| p.name == "ATTENDEE")
        .map(parse_attendee)
        .collect();

    let response_status = owner_email.and_then(|email| {
        attendees
            .iter()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .and_then(|a| a.response_status)
    });

    let rrule = vevent.find_prop("RRULE").map(|p| p.val.to_string());
    let exdates: Vec<DateTime<Utc>> = vevent
        .properties
        .iter()
        .filter(|p| p.name == "EXDATE")
        .flat_map(parse_exdate_property)
        .collect();

    let data = EventData {
        calendar_id: calendar_id.to_string(),
        uid,
        title,
        description,
        location,
        start,
        end,
        all_day,
        recurrence: rrule.clone(),
        organizer,
        attendees,
        response_status,
        url,
        etag: None,
        raw: None,
    };
    Some((data, exdates, rrule))
}

/// Normalize icalendar's DatePerhapsTime to a UTC instant plus all-day flag.
fn to_utc(dpt: DatePerhapsTime) -> (DateTime<Utc>, bool) {
    match dpt {
        DatePerhapsTime::Date(d) => (
            d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
            true,
        ),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            icalendar::CalendarDateTime::Utc(dt) => (dt, false),
            // Floating times are interpreted as UTC.
            icalendar::CalendarDateTime::Floating(naive) => (naive.and_utc(), false),
            icalendar::CalendarDateTime::WithTimezone { date_time, tzid } => {
                let dt = tzid
                    .parse::<chrono_tz::Tz>()
                    .ok()
                    .and_then(|tz| tz.from_local_datetime(&date_time).single())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|| date_time.and_utc());
                (dt, false)
            }
        },
    }
}

/// Parse an EXDATE property into UTC instants.
///
/// Handles TZID parameters, VALUE=DATE, UTC and floating forms, and
/// comma-separated value lists.
fn parse_exdate_property(prop: &Property) -> Vec<DateTime<Utc>> {
    let tzid = prop
        .params
        .iter()
        .find(|p| p.key == "TZID")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()));

    let is_date = prop
        .params
        .iter()
        .any(|p| p.key == "VALUE" && p.val.as_ref().map(|v| v.as_ref()) == Some("DATE"));

    let val_str = prop.val.as_ref();
    val_str
        .split(',')
        .filter_map(|s| {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if is_date {
                chrono::NaiveDate::parse_from_str(s, "%Y%m%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|dt| dt.and_utc())
            } else if let Some(ref tz) = tzid {
                let naive = chrono::NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S").ok()?;
                tz.parse::<chrono_tz::Tz>()
                    .ok()
                    .and_then(|tz| tz.from_local_datetime(&naive).single())
                    .map(|dt| dt.with_timezone(&Utc))
            } else {
                let s = s.trim_end_matches('Z');
                chrono::NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| dt.and_utc())
            }
        })
        .collect()
}

/// Parse ATTENDEE/ORGANIZER property.
fn parse_attendee(prop: &Property) -> Attendee {
    let email = prop
        .val
        .as_ref()
        .strip_prefix("mailto:")
        .unwrap_or(prop.val.as_ref())
        .to_string();

    let name = prop
        .params
        .iter()
        .find(|p| p.key == "CN")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()));

    let response_status = prop
        .params
        .iter()
        .find(|p| p.key == "PARTSTAT")
        .and_then(|p| p.val.as_ref())
        .and_then(|v| ResponseStatus::from_ics_str(v.as_ref()));

    Attendee {
        name,
        email,
        response_status,
    }
}
