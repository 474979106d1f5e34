#[cfg(test)]
mod timer_test;

pub(crate) mod rto;

use fxhash::FxHashMap;

use crate::callbacks::{DurationMs, Timeout, TimeoutId};

/// Identifies a timer within its manager.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct TimerId(u32);

/// How the duration changes when a timer is automatically restarted after
/// expiring.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum BackoffAlgorithm {
    /// The base duration is used for every restart.
    Fixed,
    /// Every consecutive expiry doubles the duration.
    Exponential,
}

#[derive(Debug, Clone)]
pub(crate) struct TimerOptions {
    /// The base duration; can be changed later with `set_duration`.
    pub(crate) duration: DurationMs,
    /// Maximum number of automatic restarts; `None` is unlimited, and
    /// `Some(0)` makes the timer one-shot.
    pub(crate) max_restarts: Option<u32>,
    pub(crate) backoff: BackoffAlgorithm,
}

impl TimerOptions {
    pub(crate) fn new(duration: DurationMs) -> Self {
        TimerOptions {
            duration,
            max_restarts: None,
            backoff: BackoffAlgorithm::Exponential,
        }
    }

    pub(crate) fn fixed(duration: DurationMs) -> Self {
        TimerOptions {
            duration,
            max_restarts: None,
            backoff: BackoffAlgorithm::Fixed,
        }
    }

    pub(crate) fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = Some(max_restarts);
        self
    }
}

struct TimerState {
    name: &'static str,
    timeout: Box<dyn Timeout>,
    options: TimerOptions,
    duration: DurationMs,
    /// Bumped on every start so that an expiry delivered for an earlier
    /// incarnation of the underlying timeout is recognized and dropped.
    generation: u32,
    is_running: bool,
    expiration_count: u32,
    /// Set between `handle_timeout` and `reschedule`. A start, stop or
    /// restart from inside the expiry handler clears it, which makes the
    /// later `reschedule` a no-op instead of double-arming the timeout.
    in_expiry: bool,
}

fn make_timeout_id(timer_id: TimerId, generation: u32) -> TimeoutId {
    (u64::from(timer_id.0) << 32) | u64::from(generation)
}

fn backoff_duration(
    algorithm: BackoffAlgorithm,
    base_duration: DurationMs,
    expiration_count: u32,
) -> DurationMs {
    match algorithm {
        BackoffAlgorithm::Fixed => base_duration,
        BackoffAlgorithm::Exponential => {
            if expiration_count < 31 {
                base_duration.saturating_mul(1 << expiration_count)
            } else {
                DurationMs::MAX
            }
        }
    }
}

/// Owns all high-level timers of a socket, multiplexing them onto the
/// host's one-shot timeout primitives.
///
/// The 64-bit timeout id given to the host packs the 32-bit timer id and a
/// 32-bit generation. Expiries whose generation does not match the timer's
/// current one are from a stop or restart that raced the delivery and are
/// silently discarded.
///
/// Expiring works in two steps: `handle_timeout` validates the expiry and
/// returns which timer fired; after the owner has run its handler it calls
/// `reschedule` (optionally installing a new base duration), which applies
/// backoff and restarts the underlying timeout unless the restart cap was
/// reached or the handler stopped the timer.
pub(crate) struct TimerManager {
    timers: FxHashMap<u32, TimerState>,
    next_id: u32,
}

impl TimerManager {
    pub(crate) fn new() -> Self {
        TimerManager {
            timers: FxHashMap::default(),
            next_id: 0,
        }
    }

    pub(crate) fn create_timer(
        &mut self,
        name: &'static str,
        timeout: Box<dyn Timeout>,
        options: TimerOptions,
    ) -> TimerId {
        self.next_id += 1;
        let id = self.next_id;
        let duration = options.duration;
        self.timers.insert(
            id,
            TimerState {
                name,
                timeout,
                options,
                duration,
                generation: 0,
                is_running: false,
                expiration_count: 0,
                in_expiry: false,
            },
        );
        TimerId(id)
    }

    /// Starts the timer if it is stopped. A running timer is left alone;
    /// it keeps its original expiration time.
    pub(crate) fn start(&mut self, id: TimerId) {
        if let Some(t) = self.timers.get_mut(&id.0) {
            if !t.is_running {
                t.is_running = true;
                t.expiration_count = 0;
                t.generation += 1;
                t.in_expiry = false;
                t.timeout.start(t.duration, make_timeout_id(id, t.generation));
            }
        }
    }

    pub(crate) fn stop(&mut self, id: TimerId) {
        if let Some(t) = self.timers.get_mut(&id.0) {
            if t.is_running {
                t.timeout.stop();
                t.expiration_count = 0;
                t.is_running = false;
            }
            t.in_expiry = false;
        }
    }

    /// Starts or restarts the timer from its base duration, resetting the
    /// expiration count.
    pub(crate) fn restart(&mut self, id: TimerId) {
        if let Some(t) = self.timers.get_mut(&id.0) {
            t.expiration_count = 0;
            t.generation += 1;
            t.in_expiry = false;
            let timeout_id = make_timeout_id(id, t.generation);
            if t.is_running {
                t.timeout.restart(t.duration, timeout_id);
            } else {
                t.is_running = true;
                t.timeout.start(t.duration, timeout_id);
            }
        }
    }

    pub(crate) fn set_duration(&mut self, id: TimerId, duration: DurationMs) {
        if let Some(t) = self.timers.get_mut(&id.0) {
            t.duration = duration;
        }
    }

    pub(crate) fn duration(&self, id: TimerId) -> DurationMs {
        self.timers.get(&id.0).map_or(0, |t| t.duration)
    }

    pub(crate) fn is_running(&self, id: TimerId) -> bool {
        self.timers.get(&id.0).map_or(false, |t| t.is_running)
    }

    /// The number of consecutive expiries since the timer was last
    /// (re)started.
    pub(crate) fn expiration_count(&self, id: TimerId) -> u32 {
        self.timers.get(&id.0).map_or(0, |t| t.expiration_count)
    }

    pub(crate) fn name(&self, id: TimerId) -> &'static str {
        self.timers.get(&id.0).map_or("?", |t| t.name)
    }

    /// Validates an expiry from the host. Returns the timer that fired, or
    /// `None` for stale generations and unknown ids.
    ///
    /// The restart cap is applied here: a timer that has exhausted
    /// `max_restarts` is stopped before its handler runs, so the handler
    /// can observe `is_running() == false` and give up.
    pub(crate) fn handle_timeout(&mut self, timeout_id: TimeoutId) -> Option<TimerId> {
        let timer_id = (timeout_id >> 32) as u32;
        let generation = timeout_id as u32;
        let t = self.timers.get_mut(&timer_id)?;
        if !t.is_running || generation != t.generation {
            log::trace!("discarding stale timeout for timer {}", t.name);
            return None;
        }

        t.expiration_count += 1;
        if let Some(max_restarts) = t.options.max_restarts {
            if t.expiration_count > max_restarts {
                t.is_running = false;
            }
        }
        t.in_expiry = true;
        Some(TimerId(timer_id))
    }

    /// Completes an expiry after the handler has run. Installs
    /// `new_duration` as base duration when given, and restarts the
    /// underlying timeout with the backed-off duration if the timer is
    /// still running.
    pub(crate) fn reschedule(&mut self, id: TimerId, new_duration: Option<DurationMs>) {
        if let Some(t) = self.timers.get_mut(&id.0) {
            if let Some(d) = new_duration {
                t.duration = d;
            }
            if !t.in_expiry {
                return;
            }
            t.in_expiry = false;
            if t.is_running {
                let duration = backoff_duration(t.options.backoff, t.duration, t.expiration_count);
                t.generation += 1;
                t.timeout.start(duration, make_timeout_id(id, t.generation));
            }
        }
    }
}
