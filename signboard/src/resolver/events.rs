//! Renderer notification slots.
//!
//! Observers register closures at construction; the tick loop fires them
//! after state mutation, so a handler reading the current schedules always
//! sees the values the event describes. Events carry no payload.

use std::sync::Arc;

type EventHandler = Arc<dyn Fn() + Send + Sync>;

/// Named callback slots for schedule lifecycle events.
#[derive(Clone, Default)]
pub struct ScheduleEvents {
    on_new_schedule_available: Option<EventHandler>,
    on_refresh_schedule: Option<EventHandler>,
    on_check_complete: Option<EventHandler>,
}

impl ScheduleEvents {
    /// Create an event set with no observers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler fired when the resolved schedule changed.
    pub fn with_on_new_schedule_available(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_new_schedule_available = Some(Arc::new(handler));
        self
    }

    /// Register the handler fired when a tick resolved to the same schedule.
    pub fn with_on_refresh_schedule(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_refresh_schedule = Some(Arc::new(handler));
        self
    }

    /// Register the handler fired at the end of every tick.
    pub fn with_on_check_complete(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_check_complete = Some(Arc::new(handler));
        self
    }

    pub(crate) fn notify_new_schedule_available(&self) {
        if let Some(handler) = &self.on_new_schedule_available {
            handler();
        }
    }

    pub(crate) fn notify_refresh_schedule(&self) {
        if let Some(handler) = &self.on_refresh_schedule {
            handler();
        }
    }

    pub(crate) fn notify_check_complete(&self) {
        if let Some(handler) = &self.on_check_complete {
            handler();
        }
    }
}

impl std::fmt::Debug for ScheduleEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleEvents")
            .field("on_new_schedule_available", &self.on_new_schedule_available.is_some())
            .field("on_refresh_schedule", &self.on_refresh_schedule.is_some())
            .field("on_check_complete", &self.on_check_complete.is_some())
            .finish()
    }
}
