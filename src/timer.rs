//! Wall-clock source and per-room timer registry
//!
//! Each room owns at most one single-shot deadline (question end, reveal
//! advance) and at most one periodic tick stream (1 Hz countdowns).
//! Setting a new deadline replaces the old one; cancellation is
//! generation-stamped. A firing task re-checks its generation before
//! invoking the callback, and engine callbacks additionally re-read the
//! room phase under the room lock, so a timer that lost a race with a
//! phase transition is always a no-op.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::code::RoomCode;

/// Millisecond wall-clock anchored to the tokio clock
///
/// Epoch milliseconds are captured once at construction and advanced with
/// `tokio::time::Instant`, so paused-time tests get exact, deterministic
/// timestamps while production reads real time.
#[derive(Debug, Clone)]
pub struct Clock {
    epoch_base_ms: u64,
    started: tokio::time::Instant,
}

impl Clock {
    /// Creates a clock anchored at the current wall-clock time
    pub fn new() -> Self {
        let epoch_base_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            epoch_base_ms,
            started: tokio::time::Instant::now(),
        }
    }

    /// Current time in epoch milliseconds
    pub fn now_ms(&self) -> u64 {
        self.epoch_base_ms + self.started.elapsed().as_millis() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-shot callback invoked when a deadline fires
pub type DeadlineFn = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send + 'static>;

/// Callback invoked with each remaining-count value of a tick stream
pub type TickFn = Box<dyn Fn(u32) -> BoxFuture<'static, ()> + Send + Sync + 'static>;

#[derive(Debug, Default)]
struct RoomTimers {
    deadline_generation: u64,
    tick_generation: u64,
}

/// Per-room deadlines and tick streams
///
/// Process-local; timer state for in-flight games does not survive a
/// restart. Firing tasks never hold locks across their callbacks; they
/// validate their generation against the registry and exit quietly when
/// they have been replaced or cancelled.
#[derive(Default)]
pub struct TimerRegistry {
    rooms: Arc<DashMap<String, RoomTimers>>,
}

impl TimerRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `on_fire` to run once after `after`, replacing any
    /// existing deadline for the room
    pub fn set_deadline(&self, code: &RoomCode, after: Duration, on_fire: DeadlineFn) {
        let generation = {
            let mut timers = self.rooms.entry(code.to_string()).or_default();
            timers.deadline_generation += 1;
            timers.deadline_generation
        };

        let rooms = Arc::clone(&self.rooms);
        let key = code.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let current = rooms.get(&key).map(|t| t.deadline_generation);
            if current == Some(generation) {
                on_fire().await;
            } else {
                tracing::trace!(code = %key, "stale deadline dropped");
            }
        });
    }

    /// Starts a 1 Hz tick stream emitting `count, count-1, … 0`, replacing
    /// any existing stream for the room
    ///
    /// The first value is emitted immediately; the stream auto-cancels
    /// after emitting zero.
    pub fn start_ticks(&self, code: &RoomCode, count: u32, on_tick: TickFn) {
        let generation = {
            let mut timers = self.rooms.entry(code.to_string()).or_default();
            timers.tick_generation += 1;
            timers.tick_generation
        };

        let rooms = Arc::clone(&self.rooms);
        let key = code.to_string();
        tokio::spawn(async move {
            for remaining in (0..=count).rev() {
                let current = rooms.get(&key).map(|t| t.tick_generation);
                if current != Some(generation) {
                    tracing::trace!(code = %key, "stale tick stream dropped");
                    return;
                }
                on_tick(remaining).await;
                if remaining > 0 {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        });
    }

    /// Cancels the room's deadline and tick stream
    pub fn cancel(&self, code: &RoomCode) {
        if let Some(mut timers) = self.rooms.get_mut(code.as_str()) {
            timers.deadline_generation += 1;
            timers.tick_generation += 1;
        }
    }

    /// Cancels everything for the room and forgets it
    pub fn teardown(&self, code: &RoomCode) {
        self.rooms.remove(code.as_str());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    };

    use super::*;

    fn code() -> RoomCode {
        "AB2C3D".parse().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn clock_follows_virtual_time() {
        let clock = Clock::new();
        let before = clock.now_ms();
        tokio::time::advance(Duration::from_millis(1_500)).await;
        assert_eq!(clock.now_ms() - before, 1_500);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fires_once_after_its_duration() {
        let registry = TimerRegistry::new();
        let fired = Arc::new(AtomicU32::new(0));
        let flag = Arc::clone(&fired);
        registry.set_deadline(
            &code(),
            Duration::from_secs(5),
            Box::new(move || {
                Box::pin(async move {
                    flag.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn new_deadline_replaces_the_old_one() {
        let registry = TimerRegistry::new();
        let fired = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&fired);
        registry.set_deadline(
            &code(),
            Duration::from_secs(2),
            Box::new(move || {
                Box::pin(async move {
                    first.lock().unwrap().push("first");
                })
            }),
        );
        let second = Arc::clone(&fired);
        registry.set_deadline(
            &code(),
            Duration::from_secs(4),
            Box::new(move || {
                Box::pin(async move {
                    second.lock().unwrap().push("second");
                })
            }),
        );

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(*fired.lock().unwrap(), vec!["second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_silences_pending_timers() {
        let registry = TimerRegistry::new();
        let fired = Arc::new(AtomicU32::new(0));
        let flag = Arc::clone(&fired);
        registry.set_deadline(
            &code(),
            Duration::from_secs(2),
            Box::new(move || {
                Box::pin(async move {
                    flag.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );
        registry.cancel(&code());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_count_down_to_zero_then_stop() {
        let registry = TimerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry.start_ticks(
            &code(),
            3,
            Box::new(move |remaining| {
                let sink = Arc::clone(&sink);
                Box::pin(async move {
                    sink.lock().unwrap().push(remaining);
                })
            }),
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(*seen.lock().unwrap(), vec![3, 2, 1, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_stops_a_running_stream() {
        let registry = TimerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry.start_ticks(
            &code(),
            10,
            Box::new(move |remaining| {
                let sink = Arc::clone(&sink);
                Box::pin(async move {
                    sink.lock().unwrap().push(remaining);
                })
            }),
        );

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        registry.teardown(&code());
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(*seen.lock().unwrap(), vec![10, 9, 8]);
    }

    #[tokio::test(start_paused = true)]
    async fn deadlines_and_ticks_are_independent() {
        let registry = TimerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        registry.start_ticks(
            &code(),
            2,
            Box::new(move |remaining| {
                let sink = Arc::clone(&sink);
                Box::pin(async move {
                    sink.lock().unwrap().push(format!("tick:{remaining}"));
                })
            }),
        );
        let sink = Arc::clone(&seen);
        registry.set_deadline(
            &code(),
            Duration::from_secs(1),
            Box::new(move || {
                Box::pin(async move {
                    sink.lock().unwrap().push("deadline".into());
                })
            }),
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        let seen = seen.lock().unwrap();
        assert!(seen.contains(&"deadline".to_string()));
        assert!(seen.contains(&"tick:0".to_string()));
    }
}
