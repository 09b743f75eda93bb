//! Per-user reminder settings.

use serde::{Deserialize, Serialize};

pub const DEFAULT_REMINDER_MINUTES: i64 = 10;

/// Per-user singleton controlling reminder behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderSettings {
    /// Lead time before the event start at which the reminder fires.
    pub reminder_minutes: i64,
    /// Free-text instruction appended to every reminder notification.
    #[serde(default)]
    pub reminder_instruction: String,
    /// Free-text note appended to account listings.
    #[serde(default)]
    pub accounts_note: String,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        ReminderSettings {
            reminder_minutes: DEFAULT_REMINDER_MINUTES,
            reminder_instruction: String::new(),
            accounts_note: String::new(),
        }
    }
}
