//! Staleness watchdog.
//!
//! A liveness check, not a correctness check: it trips when the owning
//! loop has gone longer than a threshold without a successful activity
//! (a file sent, a file downloaded). It cannot tell "idle because there is
//! nothing to do" from "stuck"; the threshold magnitude is the policy.

use std::time::Duration;

use chrono::NaiveDateTime;

use crate::checkpoint::{load_lenient, ActivityRecord, CheckpointStore};
use crate::timefmt;

/// Decide whether a component should be restarted.
///
/// No recorded activity never trips: a process that has not done anything
/// yet is not penalised. Otherwise trips once `now - last_activity` reaches
/// `threshold`. A last-activity time in the future counts as zero elapsed.
pub fn should_restart(
    last_activity: Option<NaiveDateTime>,
    threshold: Duration,
    now: NaiveDateTime,
) -> bool {
    match last_activity {
        None => false,
        Some(last) => elapsed(last, now) >= threshold,
    }
}

fn elapsed(since: NaiveDateTime, now: NaiveDateTime) -> Duration {
    now.signed_duration_since(since)
        .to_std()
        .unwrap_or_default()
}

/// Emitted when the watchdog decides the owning loop is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogTripped {
    /// Time since the effective last activity.
    pub idle: Duration,
    pub threshold: Duration,
}

impl WatchdogTripped {
    pub fn idle_hours(&self) -> f64 {
        self.idle.as_secs_f64() / 3600.0
    }
}

/// Watchdog bound to one component instance.
///
/// The component's start time acts as a floor on the recorded activity:
/// a freshly (re)started component gets one full threshold of grace even
/// when the persisted activity time is already old.
#[derive(Debug, Clone)]
pub struct Watchdog {
    label: &'static str,
    threshold: Duration,
    started_at: NaiveDateTime,
}

impl Watchdog {
    pub fn new(label: &'static str, threshold: Duration) -> Self {
        Self::started_at(label, threshold, timefmt::now())
    }

    pub fn started_at(label: &'static str, threshold: Duration, started_at: NaiveDateTime) -> Self {
        Self {
            label,
            threshold,
            started_at,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Evaluate against an explicit last-activity time.
    pub fn evaluate(
        &self,
        last_activity: Option<NaiveDateTime>,
        now: NaiveDateTime,
    ) -> Option<WatchdogTripped> {
        let effective = last_activity.map(|last| last.max(self.started_at));
        if !should_restart(effective, self.threshold, now) {
            return None;
        }
        let idle = effective.map(|last| elapsed(last, now)).unwrap_or_default();
        Some(WatchdogTripped {
            idle,
            threshold: self.threshold,
        })
    }

    /// Read the checkpoint and evaluate it at the current time.
    ///
    /// An unreadable checkpoint is logged and treated as "no activity yet".
    pub fn check<T, S>(&self, store: &S) -> Option<WatchdogTripped>
    where
        T: ActivityRecord,
        S: CheckpointStore<T> + ?Sized,
    {
        let last_activity = load_lenient(store).and_then(|record: T| record.last_activity());
        let tripped = self.evaluate(last_activity, timefmt::now())?;
        tracing::warn!(
            component = self.label,
            idle_hours = %format!("{:.2}", tripped.idle_hours()),
            threshold_hours = %format!("{:.2}", tripped.threshold.as_secs_f64() / 3600.0),
            "no activity within watchdog threshold, restart required",
        );
        Some(tripped)
    }
}
