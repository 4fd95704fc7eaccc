//! Cooperative countdown over the exam's remaining seconds.
//!
//! The countdown owns no thread and no timer. Whoever drives the event loop
//! calls [`Countdown::tick`] once per second with the token returned by the
//! latest [`Countdown::arm`]; tests do the same with virtual time.

/// Proof that a tick comes from the most recent `arm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownState {
    Idle,
    Running { remaining: u32 },
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running, or the token belongs to a replaced run.
    Ignored,
    Ticked { remaining: u32 },
    /// Reached zero. Reported once per run.
    Expired,
}

#[derive(Debug, Clone)]
pub struct Countdown {
    state: CountdownState,
    generation: u64,
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Countdown {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: CountdownState::Idle,
            generation: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> CountdownState {
        self.state
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self.state, CountdownState::Running { .. })
    }

    #[must_use]
    pub fn remaining(&self) -> Option<u32> {
        match self.state {
            CountdownState::Running { remaining } => Some(remaining),
            CountdownState::Idle | CountdownState::Stopped => None,
        }
    }

    /// Start counting down from `remaining`, replacing any earlier run.
    pub fn arm(&mut self, remaining: u32) -> TickToken {
        self.disarm();
        self.generation = self.generation.wrapping_add(1);
        self.state = CountdownState::Running { remaining };
        TickToken(self.generation)
    }

    /// Stop counting. Safe to call in any state, any number of times.
    pub fn disarm(&mut self) {
        self.state = CountdownState::Stopped;
        // Outstanding tokens die with the run they were issued for.
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn tick(&mut self, token: TickToken) -> TickOutcome {
        if token.0 != self.generation {
            return TickOutcome::Ignored;
        }
        let CountdownState::Running { remaining } = self.state else {
            return TickOutcome::Ignored;
        };

        let remaining = remaining.saturating_sub(1);
        if remaining == 0 {
            self.state = CountdownState::Stopped;
            return TickOutcome::Expired;
        }
        self.state = CountdownState::Running { remaining };
        TickOutcome::Ticked { remaining }
    }
}
