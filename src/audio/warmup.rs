//! Warm-up state machine for the duplex sync engine
//!
//! Input and output streams start at different times and have independent
//! buffers. Before passing audio through, the engine walks these phases:
//!
//! 1. `Drain`: empty whatever the input buffered before output started.
//!    Only invocations that actually drained something count.
//! 2. `Cushion`: skip reading so the input refills slightly and reads are
//!    not racing the input's write pointer.
//! 3. `Discard`: read one period per invocation and throw it away until
//!    both sides sit at a stable relative fill level.
//! 4. `Steady`: pass audio through.

use crate::config::EngineConfig;

/// Current synchronization phase with its remaining budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmupPhase {
    Drain { remaining: u32 },
    Cushion { remaining: u32 },
    Discard { remaining: u32 },
    Steady,
}

impl WarmupPhase {
    pub fn name(&self) -> &'static str {
        match self {
            WarmupPhase::Drain { .. } => "drain",
            WarmupPhase::Cushion { .. } => "cushion",
            WarmupPhase::Discard { .. } => "discard",
            WarmupPhase::Steady => "steady",
        }
    }

    /// Position in the phase order, used to check forward-only movement
    pub fn ordinal(&self) -> u8 {
        match self {
            WarmupPhase::Drain { .. } => 0,
            WarmupPhase::Cushion { .. } => 1,
            WarmupPhase::Discard { .. } => 2,
            WarmupPhase::Steady => 3,
        }
    }

    pub fn is_steady(&self) -> bool {
        matches!(self, WarmupPhase::Steady)
    }
}

/// Per-phase budgets, in callback invocations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmupSchedule {
    pub drain: u32,
    pub cushion: u32,
    pub discard: u32,
}

impl Default for WarmupSchedule {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for WarmupSchedule {
    fn from(config: &EngineConfig) -> Self {
        Self {
            drain: config.drain_callbacks,
            cushion: config.cushion_callbacks,
            discard: config.discard_callbacks,
        }
    }
}

impl WarmupSchedule {
    /// Phase every session starts in
    pub fn first_phase(&self) -> WarmupPhase {
        self.enter_drain()
    }

    /// Move the state machine on by one invocation.
    ///
    /// `made_progress` only matters in `Drain`, where an invocation that
    /// drained nothing does not count against the budget. A phase whose
    /// budget hits zero hands over to the next non-empty phase, which then
    /// runs on the following invocation.
    pub fn advance(&self, phase: WarmupPhase, made_progress: bool) -> WarmupPhase {
        match phase {
            WarmupPhase::Drain { remaining } => {
                if !made_progress {
                    return phase;
                }
                match remaining.saturating_sub(1) {
                    0 => self.enter_cushion(),
                    remaining => WarmupPhase::Drain { remaining },
                }
            }
            WarmupPhase::Cushion { remaining } => match remaining.saturating_sub(1) {
                0 => self.enter_discard(),
                remaining => WarmupPhase::Cushion { remaining },
            },
            WarmupPhase::Discard { remaining } => match remaining.saturating_sub(1) {
                0 => WarmupPhase::Steady,
                remaining => WarmupPhase::Discard { remaining },
            },
            WarmupPhase::Steady => WarmupPhase::Steady,
        }
    }

    fn enter_drain(&self) -> WarmupPhase {
        match self.drain {
            0 => self.enter_cushion(),
            remaining => WarmupPhase::Drain { remaining },
        }
    }

    fn enter_cushion(&self) -> WarmupPhase {
        match self.cushion {
            0 => self.enter_discard(),
            remaining => WarmupPhase::Cushion { remaining },
        }
    }

    fn enter_discard(&self) -> WarmupPhase {
        match self.discard {
            0 => WarmupPhase::Steady,
            remaining => WarmupPhase::Discard { remaining },
        }
    }
}
