use log::{debug, info};

use crate::config::Settings;

/// Pacemaker flavor selection.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacemakerKind {
    #[default]
    Baseline,
    Adaptive,
}

/// Per-replica view timer. One timer is armed at a time; `start_timer`
/// returns the absolute deadline the engine schedules against.
pub enum Pacemaker {
    Baseline(BaselinePacemaker),
    Adaptive(AdaptivePacemaker),
}

impl Pacemaker {
    pub fn from_settings(settings: &Settings) -> Self {
        match settings.pacemaker_type {
            PacemakerKind::Baseline => {
                Pacemaker::Baseline(BaselinePacemaker::new(settings.base_timeout_ms))
            }
            PacemakerKind::Adaptive => Pacemaker::Adaptive(AdaptivePacemaker::new(
                settings.base_timeout_ms,
                settings.adaptive_alpha,
                settings.adaptive_min_timeout_ms,
                settings.adaptive_max_timeout_ms,
            )),
        }
    }

    pub fn start_timer(&mut self, view: u64, now: u64) -> u64 {
        match self {
            Pacemaker::Baseline(pm) => pm.start_timer(view, now),
            Pacemaker::Adaptive(pm) => pm.start_timer(view, now),
        }
    }

    pub fn stop_timer(&mut self) {
        match self {
            Pacemaker::Baseline(pm) => pm.stop_timer(),
            Pacemaker::Adaptive(pm) => pm.stop_timer(),
        }
    }

    /// Handle an expired timer; returns the view to move to (always v + 1).
    pub fn on_timeout(&mut self, now: u64) -> u64 {
        match self {
            Pacemaker::Baseline(pm) => pm.on_timeout(now),
            Pacemaker::Adaptive(pm) => pm.on_timeout(now),
        }
    }

    pub fn on_view_success(&mut self, view: u64, duration_ms: u64) {
        match self {
            Pacemaker::Baseline(pm) => pm.on_view_success(view, duration_ms),
            Pacemaker::Adaptive(pm) => pm.on_view_success(view, duration_ms),
        }
    }

    pub fn current_timeout(&self) -> u64 {
        match self {
            Pacemaker::Baseline(pm) => pm.current_timeout(),
            Pacemaker::Adaptive(pm) => pm.current_timeout(),
        }
    }

    /// Absolute expiry of the armed timer, if one is armed.
    pub fn deadline(&self) -> Option<u64> {
        match self {
            Pacemaker::Baseline(pm) => pm.deadline(),
            Pacemaker::Adaptive(pm) => pm.deadline(),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Pacemaker::Baseline(pm) => pm.reset(),
            Pacemaker::Adaptive(pm) => pm.reset(),
        }
    }
}

/// Fixed-timeout pacemaker. View successes do not change the timeout.
pub struct BaselinePacemaker {
    base_timeout_ms: u64,
    current_view: u64,
    deadline: Option<u64>,
}

impl BaselinePacemaker {
    pub fn new(base_timeout_ms: u64) -> Self {
        Self {
            base_timeout_ms,
            current_view: 0,
            deadline: None,
        }
    }

    pub fn start_timer(&mut self, view: u64, now: u64) -> u64 {
        self.current_view = view;
        let deadline = now + self.base_timeout_ms;
        self.deadline = Some(deadline);
        debug!("timer armed for view {}, expires at {}", view, deadline);
        deadline
    }

    pub fn stop_timer(&mut self) {
        self.deadline = None;
    }

    pub fn on_timeout(&mut self, _now: u64) -> u64 {
        let next_view = self.current_view + 1;
        info!(
            "timeout in view {}, advancing to view {}",
            self.current_view, next_view
        );
        self.deadline = None;
        next_view
    }

    pub fn on_view_success(&mut self, view: u64, duration_ms: u64) {
        debug!("view {} completed in {}ms", view, duration_ms);
    }

    pub fn current_timeout(&self) -> u64 {
        self.base_timeout_ms
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    pub fn reset(&mut self) {
        self.current_view = 0;
        self.deadline = None;
    }
}

/// Adaptive pacemaker: EMA of observed view durations with a 1.5x safety
/// margin on success, exponential backoff capped at 4x on timeout.
pub struct AdaptivePacemaker {
    base_timeout_ms: u64,
    current_timeout_ms: u64,
    alpha: f64,
    min_timeout_ms: u64,
    max_timeout_ms: u64,
    current_view: u64,
    deadline: Option<u64>,
    consecutive_timeouts: u32,
}

impl AdaptivePacemaker {
    pub fn new(base_timeout_ms: u64, alpha: f64, min_timeout_ms: u64, max_timeout_ms: u64) -> Self {
        Self {
            base_timeout_ms,
            current_timeout_ms: base_timeout_ms,
            alpha,
            min_timeout_ms,
            max_timeout_ms,
            current_view: 0,
            deadline: None,
            consecutive_timeouts: 0,
        }
    }

    pub fn start_timer(&mut self, view: u64, now: u64) -> u64 {
        self.current_view = view;
        let deadline = now + self.current_timeout_ms;
        self.deadline = Some(deadline);
        debug!(
            "timer armed for view {}, timeout={}ms, expires at {}",
            view, self.current_timeout_ms, deadline
        );
        deadline
    }

    pub fn stop_timer(&mut self) {
        self.deadline = None;
    }

    pub fn on_timeout(&mut self, _now: u64) -> u64 {
        self.consecutive_timeouts += 1;

        let backoff = 2u64
            .saturating_pow(self.consecutive_timeouts)
            .min(4);
        let old_timeout = self.current_timeout_ms;
        self.current_timeout_ms = self
            .current_timeout_ms
            .saturating_mul(backoff)
            .min(self.max_timeout_ms);

        let next_view = self.current_view + 1;
        info!(
            "timeout #{} in view {}, timeout {}ms -> {}ms, advancing to view {}",
            self.consecutive_timeouts, self.current_view, old_timeout, self.current_timeout_ms,
            next_view
        );
        self.deadline = None;
        next_view
    }

    pub fn on_view_success(&mut self, view: u64, duration_ms: u64) {
        self.consecutive_timeouts = 0;

        let old_timeout = self.current_timeout_ms;
        let ema = self.alpha * duration_ms as f64 + (1.0 - self.alpha) * self.current_timeout_ms as f64;
        let target = (1.5 * ema).round() as u64;
        self.current_timeout_ms = target.clamp(self.min_timeout_ms, self.max_timeout_ms);

        debug!(
            "view {} success in {}ms, timeout {}ms -> {}ms",
            view, duration_ms, old_timeout, self.current_timeout_ms
        );
    }

    pub fn current_timeout(&self) -> u64 {
        self.current_timeout_ms
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }

    pub fn reset(&mut self) {
        self.current_timeout_ms = self.base_timeout_ms;
        self.current_view = 0;
        self.deadline = None;
        self.consecutive_timeouts = 0;
    }
}
