//! Single-shot timer owned by the active timed sub-state.

use embassy_time::{Duration, Instant};
use log::debug;

use crate::system::MachineConfig;

/// Timed sub-states that own the timer while active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedPhase {
    SelfCheck,
    Grinding,
    Brewing,
    MilkPrep,
}

impl TimedPhase {
    pub fn delay(&self, config: &MachineConfig) -> Duration {
        let ms = match self {
            TimedPhase::SelfCheck => config.self_check_delay_ms,
            TimedPhase::Grinding => config.grinding_delay_ms,
            TimedPhase::Brewing => config.brewing_delay_ms,
            TimedPhase::MilkPrep => config.milk_prep_delay_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Identifies one arming of the timer. Elapsed events carry it so an event
/// queued for an earlier arming is recognised as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken(u32);

#[derive(Debug, Clone, Copy)]
struct ArmedTimer {
    token: TimerToken,
    phase: TimedPhase,
    deadline: Instant,
    fired: bool,
}

#[derive(Debug, Default)]
pub struct PhaseTimer {
    armed: Option<ArmedTimer>,
    generation: u32,
}

impl PhaseTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh countdown, replacing whatever was armed.
    pub fn arm(&mut self, phase: TimedPhase, now: Instant, delay: Duration) -> TimerToken {
        self.generation = self.generation.wrapping_add(1);
        let token = TimerToken(self.generation);
        let deadline = now + delay;
        debug!("⏱️ Arming {:?} timer for {}ms", phase, delay.as_millis());
        self.armed = Some(ArmedTimer {
            token,
            phase,
            deadline,
            fired: false,
        });
        token
    }

    pub fn cancel(&mut self) -> Option<TimedPhase> {
        let cancelled = self.armed.take().map(|timer| timer.phase);
        if let Some(phase) = cancelled {
            debug!("⏱️ Cancelled {:?} timer", phase);
        }
        cancelled
    }

    /// True if `token` belongs to the current arming.
    pub fn accepts(&self, token: TimerToken) -> bool {
        self.armed.map_or(false, |timer| timer.token == token)
    }

    /// Deadline of an armed timer that has not fired yet.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.armed
            .filter(|timer| !timer.fired)
            .map(|timer| timer.deadline)
    }

    /// Fires the timer if its deadline is at or before `now`. Each arming
    /// fires at most once.
    pub fn fire_due(&mut self, now: Instant) -> Option<TimerToken> {
        let timer = self.armed.as_mut()?;
        if timer.fired || timer.deadline > now {
            return None;
        }
        timer.fired = true;
        debug!("⏱️ {:?} timer elapsed", timer.phase);
        Some(timer.token)
    }
}
