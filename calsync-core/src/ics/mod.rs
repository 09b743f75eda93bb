//! ICS parsing and generation.
//!
//! The codec boundary: raw iCalendar text in, normalized [`EventData`](crate::event::EventData)
//! out (and back again for CalDAV writes). Recurring masters are expanded
//! into addressable occurrences by [`crate::recurrence`].

mod generate;
mod parse;

pub use generate::generate_event_ics;
pub use parse::parse_feed;
