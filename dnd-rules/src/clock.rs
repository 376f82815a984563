//! Alarm clocks used to expire timed features.
//!
//! Scheduling returns an [`AlarmHandle`] right away. When the alarm comes
//! due the clock sends exactly one [`AlarmFired`] down the handle's one-shot
//! channel, from whatever thread it runs on. The engine drains handles in
//! [`crate::RulesEngine::process_alarms`]; nothing is applied on the clock's
//! thread.

use crate::character::CharacterId;
use crate::time::SECONDS_PER_ROUND;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

/// Sent once when an alarm comes due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmFired {
    pub name: String,
    pub character: CharacterId,
    pub feature: String,
}

/// Receiving end of a scheduled alarm.
#[derive(Debug)]
pub struct AlarmHandle {
    name: String,
    receiver: oneshot::Receiver<AlarmFired>,
}

/// Result of polling an [`AlarmHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmStatus {
    Pending,
    Fired(AlarmFired),
    /// The clock went away without firing.
    Dropped,
}

impl AlarmHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check for a firing without blocking.
    pub fn poll(&mut self) -> AlarmStatus {
        match self.receiver.try_recv() {
            Ok(fired) => AlarmStatus::Fired(fired),
            Err(TryRecvError::Empty) => AlarmStatus::Pending,
            Err(TryRecvError::Closed) => AlarmStatus::Dropped,
        }
    }
}

/// Sending end of a scheduled alarm, held by the clock.
#[derive(Debug)]
pub struct AlarmTrigger {
    sender: oneshot::Sender<AlarmFired>,
    fired: AlarmFired,
}

impl AlarmTrigger {
    pub fn fire(self) {
        let name = self.fired.name.clone();
        if self.sender.send(self.fired).is_err() {
            tracing::trace!(alarm = %name, "alarm fired after its handle was dropped");
        }
    }
}

/// Create a connected handle and trigger.
pub fn alarm_pair(name: &str, character: CharacterId, feature: &str) -> (AlarmHandle, AlarmTrigger) {
    let (sender, receiver) = oneshot::channel();
    let handle = AlarmHandle {
        name: name.to_string(),
        receiver,
    };
    let trigger = AlarmTrigger {
        sender,
        fired: AlarmFired {
            name: name.to_string(),
            character,
            feature: feature.to_string(),
        },
    };
    (handle, trigger)
}

/// Something that can schedule alarms.
#[cfg_attr(test, mockall::automock)]
pub trait AlarmClock: Send + Sync {
    fn create_alarm(
        &self,
        duration: Duration,
        name: &str,
        character: CharacterId,
        feature: &str,
    ) -> AlarmHandle;
}

// ============================================================================
// In-game clock
// ============================================================================

struct PendingAlarm {
    due: Duration,
    sequence: u64,
    trigger: AlarmTrigger,
}

#[derive(Default)]
struct GameClockState {
    now: Duration,
    next_sequence: u64,
    pending: Vec<PendingAlarm>,
}

/// In-game time, advanced explicitly by the game loop.
#[derive(Default)]
pub struct GameClock {
    state: Mutex<GameClockState>,
}

impl GameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.lock().now
    }

    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Move time forward and fire every alarm now due, earliest first.
    /// Returns how many fired.
    pub fn advance(&self, by: Duration) -> usize {
        let mut due = {
            let mut state = self.lock();
            state.now += by;
            let now = state.now;
            let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
                .into_iter()
                .partition(|alarm| alarm.due <= now);
            state.pending = pending;
            due
        };

        due.sort_by_key(|alarm| (alarm.due, alarm.sequence));
        let fired = due.len();
        for alarm in due {
            tracing::debug!(alarm = %alarm.trigger.fired.name, "alarm due");
            alarm.trigger.fire();
        }
        fired
    }

    pub fn advance_rounds(&self, rounds: u32) -> usize {
        self.advance(Duration::from_secs(u64::from(rounds) * SECONDS_PER_ROUND))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GameClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AlarmClock for GameClock {
    fn create_alarm(
        &self,
        duration: Duration,
        name: &str,
        character: CharacterId,
        feature: &str,
    ) -> AlarmHandle {
        let (handle, trigger) = alarm_pair(name, character, feature);
        let mut state = self.lock();
        let due = state.now + duration;
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.pending.push(PendingAlarm {
            due,
            sequence,
            trigger,
        });
        handle
    }
}

impl std::fmt::Debug for GameClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("GameClock")
            .field("now", &state.now)
            .field("pending", &state.pending.len())
            .finish()
    }
}

// ============================================================================
// Wall clock
// ============================================================================

/// Wall-clock alarms on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioClock {
    handle: tokio::runtime::Handle,
}

impl TokioClock {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on, if any.
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl AlarmClock for TokioClock {
    fn create_alarm(
        &self,
        duration: Duration,
        name: &str,
        character: CharacterId,
        feature: &str,
    ) -> AlarmHandle {
        let (handle, trigger) = alarm_pair(name, character, feature);
        self.handle.spawn(async move {
            tokio::time::sleep(duration).await;
            trigger.fire();
        });
        handle
    }
}
