//! The schedule tick loop.
//!
//! One dedicated worker thread wakes every tick (or immediately on an
//! external signal), runs a resolution pass under the state lock, detects
//! whether the resolved schedules changed, updates the published state, and
//! fires the renderer events. Commands and screenshots are carried out after
//! the lock is released so their I/O can never stall state readers.
//!
//! The daemon never dies of a bad tick: a panicking pass is caught, logged,
//! recorded in the diagnostic status, and the loop sleeps to the next tick.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::LayoutCache;
use crate::config::SchedulerSettings;
use crate::exchange::AdExchange;
use crate::schedule::ScheduleItem;
use crate::screenshot::ScreenshotUploader;

use super::dispatch::{collect_due_commands, dispatch_commands, CommandRunner};
use super::events::ScheduleEvents;
use super::state::SharedScheduleState;
use super::{resolve, ResolveEnv};

/// Manual-reset wake signal for the tick loop.
///
/// `set` wakes the waiting loop immediately; the flag stays raised until the
/// next wait consumes it, so a signal sent while the loop is mid-tick is not
/// lost.
#[derive(Debug, Default)]
pub struct TickSignal {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl TickSignal {
    /// Create an unsignalled instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal, waking a waiting loop.
    pub fn set(&self) {
        let mut flag = self.flag.lock().unwrap_or_else(|p| p.into_inner());
        *flag = true;
        self.cond.notify_all();
    }

    /// Wait until the signal is raised or the timeout elapses, consuming the
    /// signal. Returns true when woken by a signal.
    pub fn wait_timeout(&self, timeout: StdDuration) -> bool {
        let flag = self.flag.lock().unwrap_or_else(|p| p.into_inner());
        let (mut flag, _result) = self
            .cond
            .wait_timeout_while(flag, timeout, |signalled| !*signalled)
            .unwrap_or_else(|p| p.into_inner());
        let signalled = *flag;
        *flag = false;
        signalled
    }
}

/// Everything the tick loop needs, moved into the worker thread.
pub struct DaemonContext {
    /// Shared resolver state.
    pub state: SharedScheduleState,
    /// Scheduler configuration.
    pub settings: SchedulerSettings,
    /// Cache manager.
    pub cache: Arc<dyn LayoutCache>,
    /// Ad-exchange client, when ad serving is wired up.
    pub exchange: Option<Arc<dyn AdExchange>>,
    /// Shell runner for scheduled commands.
    pub runner: Arc<dyn CommandRunner>,
    /// Screenshot collaborator, when configured.
    pub screenshots: Option<Arc<dyn ScreenshotUploader>>,
    /// Renderer notification slots.
    pub events: ScheduleEvents,
}

/// The schedule resolution daemon.
///
/// Owns the worker thread; dropping the daemon stops and joins it. A
/// [`CancellationToken`] is exposed for auxiliary tasks (the geo watcher)
/// that must stop when the daemon does.
pub struct ScheduleDaemon {
    handle: Option<JoinHandle<()>>,
    signal: Arc<TickSignal>,
    stop: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl ScheduleDaemon {
    /// Start the tick loop on a dedicated worker thread.
    pub fn start(ctx: DaemonContext) -> Self {
        let signal = Arc::new(TickSignal::new());
        let stop = Arc::new(AtomicBool::new(false));
        let shutdown = CancellationToken::new();

        let loop_signal = Arc::clone(&signal);
        let loop_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("schedule-tick".to_string())
            .spawn(move || run_loop(ctx, loop_signal, loop_stop))
            .expect("failed to spawn schedule tick thread");

        info!("schedule daemon started");

        Self {
            handle: Some(handle),
            signal,
            stop,
            shutdown,
        }
    }

    /// Wake the loop immediately without resetting the base interval.
    pub fn refresh_now(&self) {
        debug!("schedule refresh requested");
        self.signal.set();
    }

    /// The wake signal, for collaborators that short-circuit the tick wait.
    pub fn tick_signal(&self) -> Arc<TickSignal> {
        Arc::clone(&self.signal)
    }

    /// Token cancelled when the daemon stops; auxiliary tasks watch it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Signal the loop to stop and detach auxiliary tasks. Non-blocking;
    /// call [`join`](Self::join) to wait for the worker.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.shutdown.cancel();
        self.signal.set();
    }

    /// Wait for the worker thread to finish.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.join() {
                warn!("schedule tick thread panicked: {:?}", e);
            }
        }
    }

    /// Whether the worker thread is still alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }
}

impl Drop for ScheduleDaemon {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

/// The worker loop: tick, then wait for the interval or a wake signal.
fn run_loop(ctx: DaemonContext, signal: Arc<TickSignal>, stop: Arc<AtomicBool>) {
    let interval = ctx.settings.tick_interval;
    info!(interval_secs = interval.as_secs(), "schedule tick loop running");

    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_tick(&ctx)));
        match outcome {
            Ok(status) => ctx.state.lock().last_tick_status = status,
            Err(cause) => {
                let message = panic_message(&cause);
                error!(%message, "schedule tick panicked");
                ctx.state.lock().last_tick_status = format!("tick failed: {message}");
            }
        }

        ctx.events.notify_check_complete();

        if stop.load(Ordering::Relaxed) {
            break;
        }
        signal.wait_timeout(interval);
    }

    info!("schedule tick loop stopped");
}

/// Run one tick. Returns the diagnostic status line for the pass.
fn run_tick(ctx: &DaemonContext) -> String {
    let now = Utc::now();

    // Resolution and state publication happen under one lock acquisition so
    // observers see the tick as atomic.
    let (changed, due_commands, screenshot_due, status) = {
        let mut state = ctx.state.lock();
        state.refresh_requested = false;

        let env = ResolveEnv {
            now,
            cache: ctx.cache.as_ref(),
            exchange: ctx.exchange.as_deref(),
            adspace_enabled: ctx.settings.adspace_enabled,
            expire_modified_layouts: ctx.settings.expire_modified_layouts,
        };
        let resolution = resolve(&mut state, &env);

        let changed = schedule_changed(
            &state.current_schedule,
            &resolution.schedule,
            &state.current_overlay_schedule,
            &resolution.overlays,
        );

        let status = format!(
            "{} layouts, {} overlays, {} actions, {} invalid",
            resolution.schedule.len(),
            resolution.overlays.len(),
            resolution.actions.len(),
            resolution.invalid_ids.len()
        );

        state.current_schedule = resolution.schedule;
        state.current_overlay_schedule = resolution.overlays;
        state.current_actions_schedule = resolution.actions;
        state.current_default_layout = resolution.default_layout;
        state.invalid_schedule = resolution.invalid_ids;

        let screenshot_due = screenshot_is_due(
            ctx.settings.screenshot_interval,
            state.last_screenshot_at,
            now,
        );
        if screenshot_due {
            state.last_screenshot_at = Some(now);
        }

        let due_commands = collect_due_commands(
            &mut state.commands,
            now,
            Duration::from_std(ctx.settings.command_window).unwrap_or(Duration::seconds(10)),
        );

        (changed, due_commands, screenshot_due, status)
    };

    // Events fire after the mutation, outside the lock, so handlers can read
    // the published state without deadlocking.
    if changed {
        info!("schedule changed, notifying renderer");
        ctx.events.notify_new_schedule_available();
    } else {
        ctx.events.notify_refresh_schedule();
    }

    if screenshot_due {
        if let Some(uploader) = &ctx.screenshots {
            if let Err(e) = uploader.capture_and_send() {
                warn!(error = %e, "screenshot failed");
            }
        }
    }

    if !due_commands.is_empty() {
        dispatch_commands(due_commands, Arc::clone(&ctx.runner));
    }

    status
}

/// Change detection over the resolved layout and overlay sets.
///
/// A change is forced when nothing was published yet, when a published item
/// is gone from the new schedule, or when the overlay set differs in size or
/// membership. Item equality is by identity tuple.
pub fn schedule_changed(
    current: &[ScheduleItem],
    new: &[ScheduleItem],
    current_overlays: &[ScheduleItem],
    new_overlays: &[ScheduleItem],
) -> bool {
    if current.is_empty() {
        return true;
    }
    if current
        .iter()
        .any(|c| !new.iter().any(|n| n.identity() == c.identity()))
    {
        return true;
    }
    if current_overlays.len() != new_overlays.len() {
        return true;
    }
    current_overlays
        .iter()
        .any(|c| !new_overlays.iter().any(|n| n.identity() == c.identity()))
}

fn screenshot_is_due(
    interval: StdDuration,
    last: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    if interval.is_zero() {
        return false;
    }
    let interval = Duration::from_std(interval).unwrap_or(Duration::zero());
    match last {
        None => true,
        Some(last) => now > last + interval,
    }
}

fn panic_message(cause: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = cause.downcast_ref::<&str>() {
        message
    } else if let Some(message) = cause.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
