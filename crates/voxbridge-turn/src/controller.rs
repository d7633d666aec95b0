use crate::types::{SynthesisState, TurnAction, TurnEvent};

/// Turn-taking state machine: tracks whether synthesis is in flight and
/// decides when a barge-in cancellation is issued.
///
/// The caller always wins: speech detected mid-synthesis emits exactly one
/// `CancelSynthesis` and moves straight to `Idle`, without waiting for the
/// remote cancellation acknowledgment. Because the cancel itself leaves the
/// active period, a second cancellation within the same period is
/// structurally impossible.
pub struct TurnController {
    state: SynthesisState,

    synthesis_cycles: u64,

    cancellations: u64,
}

impl Default for TurnController {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnController {
    pub fn new() -> Self {
        Self {
            state: SynthesisState::Idle,
            synthesis_cycles: 0,
            cancellations: 0,
        }
    }

    pub fn process(&mut self, event: TurnEvent) -> Option<TurnAction> {
        match (self.state, event) {
            (SynthesisState::Idle, TurnEvent::SynthesisStarted) => {
                self.state = SynthesisState::Active;
                self.synthesis_cycles += 1;
                None
            }

            (SynthesisState::Active, TurnEvent::SynthesisCompleted)
            | (SynthesisState::Active, TurnEvent::SynthesisCancelled) => {
                self.state = SynthesisState::Idle;
                None
            }

            (SynthesisState::Active, TurnEvent::CallerSpeechStarted) => {
                self.state = SynthesisState::Idle;
                self.cancellations += 1;
                Some(TurnAction::CancelSynthesis)
            }

            // A cancelled synthesis may still be acknowledged after the
            // optimistic local transition; tolerate the late ack.
            (SynthesisState::Idle, TurnEvent::SynthesisCompleted)
            | (SynthesisState::Idle, TurnEvent::SynthesisCancelled) => None,

            (SynthesisState::Idle, TurnEvent::CallerSpeechStarted) => None,

            // Duplicate start while already active: stay active.
            (SynthesisState::Active, TurnEvent::SynthesisStarted) => None,

            (_, TurnEvent::CallerSpeechStopped) => None,
        }
    }

    pub fn state(&self) -> SynthesisState {
        self.state
    }

    pub fn synthesis_cycles(&self) -> u64 {
        self.synthesis_cycles
    }

    pub fn cancellations(&self) -> u64 {
        self.cancellations
    }

    pub fn reset(&mut self) {
        self.state = SynthesisState::Idle;
    }
}
