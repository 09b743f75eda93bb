//! The reminder engine.
//!
//! Each pass scans a user's cached events starting within the next 24
//! hours, fires reminders whose instant has arrived (within a 5-minute
//! grace window), and reports how long until the next one so the
//! scheduling loop can sleep precisely. The fired-set is process-local
//! and records successful deliveries only, so both a restart and a failed
//! delivery can re-deliver, bounded by the grace window.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use calsync_core::config::{REMINDER_GRACE_SECONDS, REMINDER_SCAN_HOURS};
use calsync_core::repo::Repos;
use calsync_core::store::{NotificationSink, UserProfile, UserProfiles};
use calsync_core::{CachedEvent, ReminderSettings, SyncResult};

pub struct ReminderEngine {
    repos: Repos,
    sink: Arc<dyn NotificationSink>,
    profiles: Option<Arc<dyn UserProfiles>>,
    fired: Mutex<HashSet<(String, DateTime<Utc>)>>,
}

/// Whether a reminder instant is due at `now`: arrived, but not longer ago
/// than the grace window.
pub fn is_due(reminder_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    reminder_at <= now && reminder_at > now - Duration::seconds(REMINDER_GRACE_SECONDS)
}

/// The leading label and name connector, by the profile's language tag.
fn reminder_label(locale: Option<&str>) -> (&'static str, &'static str) {
    let lang = locale
        .map(|l| l.split(['-', '_']).next().unwrap_or(l))
        .unwrap_or("en");
    match lang {
        "de" => ("Erinnerung", "für"),
        "fr" => ("Rappel", "pour"),
        "es" => ("Recordatorio", "para"),
        _ => ("Reminder", "for"),
    }
}

/// Compose the notification text for one event.
fn compose_notification(
    event: &CachedEvent,
    settings: &ReminderSettings,
    profile: Option<&UserProfile>,
) -> String {
    let data = &event.data;
    let mut lines = Vec::new();

    let (label, connector) = reminder_label(profile.and_then(|p| p.locale.as_deref()));
    let greeting = profile
        .and_then(|p| p.display_name.as_deref())
        .map(|name| format!(" {} {}", connector, name))
        .unwrap_or_default();
    lines.push(format!("{}{}: {}", label, greeting, data.title));

    if data.all_day {
        lines.push(format!("All day on {}", data.start.format("%Y-%m-%d")));
    } else {
        lines.push(format!(
            "From {} to {} (UTC)",
            data.start.format("%Y-%m-%d %H:%M"),
            data.end.format("%H:%M")
        ));
    }
    if let Some(ref location) = data.location {
        lines.push(format!("Where: {}", location));
    }
    if let Some(ref description) = data.description {
        lines.push(format!("Details: {}", description));
    }
    if !data.attendees.is_empty() {
        let attendees: Vec<&str> = data.attendees.iter().map(|a| a.email.as_str()).collect();
        lines.push(format!("With: {}", attendees.join(", ")));
    }
    if !settings.reminder_instruction.is_empty() {
        lines.push(settings.reminder_instruction.clone());
    }
    lines.join("\n")
}

impl ReminderEngine {
    pub fn new(repos: Repos, sink: Arc<dyn NotificationSink>) -> Self {
        ReminderEngine {
            repos,
            sink,
            profiles: None,
            fired: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_profiles(mut self, profiles: Arc<dyn UserProfiles>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    /// One reminder pass for a user at `now`. Returns the time until the
    /// earliest reminder that is still in the future, if any. Cancellation
    /// is checked between events, never mid-delivery.
    pub async fn run_pass(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> SyncResult<Option<Duration>> {
        let settings = self.repos.settings.get(user_id).await?;
        let lead = Duration::minutes(settings.reminder_minutes);

        // Scan window: events starting between now and now+24h, across all
        // of the user's accounts.
        let horizon = now + Duration::hours(REMINDER_SCAN_HOURS);
        let mut events = Vec::new();
        for account in self.repos.accounts.list_for_user(user_id).await? {
            let mut batch = self
                .repos
                .events
                .list(Some(&account.id), Some(now), Some(horizon), None, 0)
                .await?;
            batch.retain(|event| event.data.start >= now && event.data.start < horizon);
            events.append(&mut batch);
        }

        // Profile lookup failures degrade to an unpersonalized reminder.
        let profile = match self.profiles {
            Some(ref profiles) => profiles.lookup(user_id).await.unwrap_or_default(),
            None => None,
        };

        let mut next_delta: Option<Duration> = None;
        for event in &events {
            if cancel.is_cancelled() {
                break;
            }
            let reminder_at = event.data.start - lead;
            if reminder_at > now {
                let delta = reminder_at - now;
                next_delta = Some(match next_delta {
                    Some(current) if current <= delta => current,
                    _ => delta,
                });
                continue;
            }
            if !is_due(reminder_at, now) {
                continue;
            }

            let key = (event.data.uid.clone(), event.data.start);
            if self.fired.lock().await.contains(&key) {
                continue;
            }

            // The key is recorded only after successful delivery: a failed
            // delivery stays eligible for the next pass while its instant
            // is still within the grace window.
            let text = compose_notification(event, &settings, profile.as_ref());
            match self.sink.deliver(user_id, &text).await {
                Ok(()) => {
                    self.fired.lock().await.insert(key);
                    tracing::info!(user = %user_id, event = %event.data.uid, "reminder delivered");
                }
                Err(e) => {
                    tracing::warn!(user = %user_id, event = %event.data.uid, error = %e, "reminder delivery failed");
                }
            }
        }
        Ok(next_delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calsync_core::EventData;
    use chrono::TimeZone;

    #[test]
    fn due_window_is_half_open() {
        let now = Utc.with_ymd_and_hms(2025, 3, 20, 12, 0, 0).unwrap();
        assert!(is_due(now, now));
        assert!(is_due(now - Duration::seconds(299), now));
        assert!(!is_due(now - Duration::seconds(300), now));
        assert!(!is_due(now + Duration::seconds(1), now));
    }

    #[test]
    fn notification_includes_instruction_and_personalization() {
        let start = Utc.with_ymd_and_hms(2025, 3, 20, 15, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 20, 16, 0, 0).unwrap();
        let mut data = EventData::new("cal", "uid-1", "Design review", start, end);
        data.location = Some("Room 2".into());
        let event = CachedEvent {
            id: "row".into(),
            account_id: "acct".into(),
            created_at: start,
            updated_at: start,
            data,
        };
        let settings = ReminderSettings {
            reminder_minutes: 10,
            reminder_instruction: "Ask about the roadmap.".into(),
            accounts_note: String::new(),
        };
        let profile = UserProfile {
            display_name: Some("Alice".into()),
            locale: None,
        };

        let text = compose_notification(&event, &settings, Some(&profile));
        assert!(text.starts_with("Reminder for Alice: Design review"));
        assert!(text.contains("Where: Room 2"));
        assert!(text.contains("Ask about the roadmap."));
    }

    #[test]
    fn locale_selects_the_notification_language() {
        assert_eq!(reminder_label(Some("de-DE")), ("Erinnerung", "für"));
        assert_eq!(reminder_label(Some("fr")), ("Rappel", "pour"));
        assert_eq!(reminder_label(Some("pt-BR")), ("Reminder", "for"));
        assert_eq!(reminder_label(None), ("Reminder", "for"));

        let start = Utc.with_ymd_and_hms(2025, 3, 20, 15, 0, 0).unwrap();
        let data = EventData::new("cal", "uid-3", "Planung", start, start + Duration::hours(1));
        let event = CachedEvent {
            id: "row".into(),
            account_id: "acct".into(),
            created_at: start,
            updated_at: start,
            data,
        };
        let profile = UserProfile {
            display_name: Some("Jonas".into()),
            locale: Some("de-DE".into()),
        };
        let text = compose_notification(&event, &ReminderSettings::default(), Some(&profile));
        assert!(text.starts_with("Erinnerung für Jonas: Planung"));
    }

    #[test]
    fn all_day_events_render_without_times() {
        let start = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
        let mut data = EventData::new("cal", "uid-2", "Offsite", start, start + Duration::days(1));
        data.all_day = true;
        let event = CachedEvent {
            id: "row".into(),
            account_id: "acct".into(),
            created_at: start,
            updated_at: start,
            data,
        };

        let text = compose_notification(&event, &ReminderSettings::default(), None);
        assert!(text.contains("All day on 2025-04-01"));
        assert!(!text.contains("From"));
    }
}
