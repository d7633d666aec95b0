/// Whether the translation service is currently producing synthesized
/// speech for this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SynthesisState {
    #[default]
    Idle,
    Active,
}

/// Observations fed to the controller, in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEvent {
    SynthesisStarted,
    SynthesisCompleted,
    SynthesisCancelled,
    CallerSpeechStarted,
    CallerSpeechStopped,
}

/// Actions the controller asks the session to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnAction {
    /// Send one cancellation to the translation service.
    CancelSynthesis,
}
