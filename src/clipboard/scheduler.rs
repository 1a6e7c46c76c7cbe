//! Decides when the change detector runs.
//!
//! Every trigger (fixed polling, host focus/blur, copy/cut/paste
//! keystrokes, a slow emergency poll) funnels into one rate-limited
//! dispatcher. Requests that arrive within `min_check_interval_ms` of the
//! last dispatched check, or while a check is running, are dropped rather
//! than queued.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::detector::ChangeDetector;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerSet {
    pub polling: bool,
    pub focus: bool,
    pub keystrokes: bool,
    pub emergency: bool,
}

impl Default for TriggerSet {
    fn default() -> Self {
        Self {
            polling: true,
            focus: true,
            keystrokes: true,
            emergency: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_ms: u64,
    pub emergency_interval_ms: u64,
    pub min_check_interval_ms: u64,
    pub focus_delay_ms: u64,
    pub copy_delay_ms: u64,
    pub paste_delay_ms: u64,
    /// Follow-up checks after a cut; some applications fill the clipboard
    /// well after the key event.
    pub cut_delays_ms: Vec<u64>,
    pub triggers: TriggerSet,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            emergency_interval_ms: 10_000,
            min_check_interval_ms: 50,
            focus_delay_ms: 100,
            copy_delay_ms: 100,
            paste_delay_ms: 50,
            cut_delays_ms: vec![100, 300, 600, 1000],
            triggers: TriggerSet::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Poll,
    Emergency,
    Focus,
    Blur,
    Copy,
    Cut,
    Paste,
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trigger::Poll => "poll",
            Trigger::Emergency => "emergency",
            Trigger::Focus => "focus",
            Trigger::Blur => "blur",
            Trigger::Copy => "copy",
            Trigger::Cut => "cut",
            Trigger::Paste => "paste",
            Trigger::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// A key press as reported by the host window before it reaches the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyStroke {
    pub key: String,
    pub control: bool,
    pub meta: bool,
    pub shift: bool,
    pub alt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardShortcut {
    Copy,
    Cut,
    Paste,
}

impl KeyStroke {
    /// Recognise Ctrl/Cmd+C/X/V and the Insert/Delete variants.
    pub fn clipboard_shortcut(&self) -> Option<ClipboardShortcut> {
        let key = self.key.to_ascii_lowercase();

        if (self.control || self.meta) && !self.alt {
            match key.as_str() {
                "c" => return Some(ClipboardShortcut::Copy),
                "x" => return Some(ClipboardShortcut::Cut),
                "v" => return Some(ClipboardShortcut::Paste),
                "insert" if !self.shift => return Some(ClipboardShortcut::Copy),
                _ => {}
            }
        }

        if self.shift && !self.control && !self.meta && !self.alt {
            match key.as_str() {
                "insert" => return Some(ClipboardShortcut::Paste),
                "delete" => return Some(ClipboardShortcut::Cut),
                _ => {}
            }
        }

        None
    }
}

/// Signals forwarded by the host window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HostEvent {
    Focus,
    Blur,
    Key(KeyStroke),
}

struct SchedulerInner {
    detector: Arc<ChangeDetector>,
    config: SchedulerConfig,
    running: AtomicBool,
    // bumped on every start so delayed checks from an earlier run stay silent
    session: AtomicU64,
    last_check: Mutex<Option<Instant>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SchedulerInner {
    fn request_check(&self, trigger: Trigger) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }

        if self.detector.is_check_in_progress() {
            debug!("Dropping {} check: another check is running", trigger);
            return false;
        }

        let now = Instant::now();
        {
            let mut last = self.last_check.lock().unwrap_or_else(PoisonError::into_inner);
            let min_interval = Duration::from_millis(self.config.min_check_interval_ms);
            if let Some(previous) = *last {
                if now.duration_since(previous) < min_interval {
                    debug!("Dropping {} check: debounced", trigger);
                    return false;
                }
            }
            *last = Some(now);
        }

        let detector = Arc::clone(&self.detector);
        tokio::spawn(async move {
            let outcome = detector.check().await;
            debug!("Check ({}) finished: {:?}", trigger, outcome);
        });
        true
    }

    fn schedule_after(self: &Arc<Self>, delay: Duration, trigger: Trigger) {
        let weak = Arc::downgrade(self);
        let session = self.session.load(Ordering::SeqCst);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                if inner.session.load(Ordering::SeqCst) == session {
                    inner.request_check(trigger);
                }
            }
        });
    }

    fn abort_tasks(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

fn spawn_ticker(
    weak: Weak<SchedulerInner>,
    mut timer: tokio::time::Interval,
    trigger: Trigger,
) -> JoinHandle<()> {
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tokio::spawn(async move {
        loop {
            timer.tick().await;
            match weak.upgrade() {
                Some(inner) => {
                    inner.request_check(trigger);
                }
                None => break,
            }
        }
    })
}

/// Owns the monitoring triggers. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MonitorScheduler {
    inner: Arc<SchedulerInner>,
}

impl MonitorScheduler {
    pub fn new(detector: Arc<ChangeDetector>, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                detector,
                config,
                running: AtomicBool::new(false),
                session: AtomicU64::new(0),
                last_check: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Arm all enabled timers. Must run inside a tokio runtime. Calling it
    /// while already running does nothing.
    pub fn start_monitoring(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.session.fetch_add(1, Ordering::SeqCst);

        let config = &self.inner.config;
        let mut tasks = Vec::new();

        if config.triggers.polling {
            let period = Duration::from_millis(config.poll_interval_ms.max(1));
            // first tick fires immediately and captures what is already on the clipboard
            tasks.push(spawn_ticker(
                Arc::downgrade(&self.inner),
                interval(period),
                Trigger::Poll,
            ));
        }

        if config.triggers.emergency {
            let period = Duration::from_millis(config.emergency_interval_ms.max(1));
            tasks.push(spawn_ticker(
                Arc::downgrade(&self.inner),
                interval_at(Instant::now() + period, period),
                Trigger::Emergency,
            ));
        }

        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(tasks);

        info!(
            "Clipboard monitoring started (poll interval: {}ms, triggers: {:?})",
            config.poll_interval_ms, config.triggers
        );
    }

    /// Cancel every timer. A check already running is allowed to finish.
    pub fn stop_monitoring(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.abort_tasks();
        info!("Clipboard monitoring stopped");
    }

    /// Ask for a check now. Returns whether one was dispatched.
    pub fn request_check(&self, trigger: Trigger) -> bool {
        self.inner.request_check(trigger)
    }

    pub fn schedule_check(&self, trigger: Trigger, delay: Duration) {
        if self.is_monitoring() {
            self.inner.schedule_after(delay, trigger);
        }
    }

    pub fn handle_host_event(&self, event: &HostEvent) {
        if !self.is_monitoring() {
            return;
        }
        let config = &self.inner.config;

        match event {
            HostEvent::Focus if config.triggers.focus => {
                self.schedule_check(Trigger::Focus, Duration::from_millis(config.focus_delay_ms));
            }
            HostEvent::Blur if config.triggers.focus => {
                self.request_check(Trigger::Blur);
            }
            HostEvent::Key(stroke) if config.triggers.keystrokes => {
                match stroke.clipboard_shortcut() {
                    Some(ClipboardShortcut::Copy) => self.schedule_check(
                        Trigger::Copy,
                        Duration::from_millis(config.copy_delay_ms),
                    ),
                    Some(ClipboardShortcut::Paste) => self.schedule_check(
                        Trigger::Paste,
                        Duration::from_millis(config.paste_delay_ms),
                    ),
                    Some(ClipboardShortcut::Cut) => {
                        for delay in &config.cut_delays_ms {
                            self.schedule_check(Trigger::Cut, Duration::from_millis(*delay));
                        }
                    }
                    None => {}
                }
            }
            _ => {}
        }
    }
}
