//! Scheduled command model.
//!
//! Commands are shell instructions the CMS schedules for a point in time.
//! The tick loop fires each command once when its due time enters the
//! upcoming dispatch window.

use chrono::{DateTime, Duration, Utc};

/// A CMS-scheduled command.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleCommand {
    /// When the command should run (UTC).
    pub due_at: DateTime<Utc>,
    /// Opaque command code forwarded to the shell runner.
    pub code: String,
    /// Owning schedule event id.
    pub schedule_id: i64,
    /// Whether the command has already been dispatched. Flips exactly once.
    pub has_run: bool,
}

impl ScheduleCommand {
    /// Create a pending command.
    pub fn new(due_at: DateTime<Utc>, code: impl Into<String>, schedule_id: i64) -> Self {
        Self {
            due_at,
            code: code.into(),
            schedule_id,
            has_run: false,
        }
    }

    /// Whether the command is due inside `[now, now + window]` and has not
    /// run yet.
    pub fn is_due(&self, now: DateTime<Utc>, window: Duration) -> bool {
        !self.has_run && self.due_at >= now && self.due_at <= now + window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_due_inside_window() {
        let cmd = ScheduleCommand::new(now() + Duration::seconds(5), "reboot", 1);
        assert!(cmd.is_due(now(), Duration::seconds(10)));
    }

    #[test]
    fn test_not_due_outside_window() {
        let early = ScheduleCommand::new(now() - Duration::seconds(1), "reboot", 1);
        let late = ScheduleCommand::new(now() + Duration::seconds(11), "reboot", 1);

        assert!(!early.is_due(now(), Duration::seconds(10)));
        assert!(!late.is_due(now(), Duration::seconds(10)));
    }

    #[test]
    fn test_window_bounds_inclusive() {
        let at_now = ScheduleCommand::new(now(), "a", 1);
        let at_edge = ScheduleCommand::new(now() + Duration::seconds(10), "b", 1);

        assert!(at_now.is_due(now(), Duration::seconds(10)));
        assert!(at_edge.is_due(now(), Duration::seconds(10)));
    }

    #[test]
    fn test_ran_commands_never_due_again() {
        let mut cmd = ScheduleCommand::new(now() + Duration::seconds(5), "reboot", 1);
        assert!(cmd.is_due(now(), Duration::seconds(10)));

        cmd.has_run = true;
        assert!(!cmd.is_due(now(), Duration::seconds(10)));
    }
}
