//! Turn latency instrumentation.
//!
//! Passive observer of one session's event stream. Records monotonic marks
//! at caller-speech boundaries and synthesis boundaries, and derives the
//! intervals between them. An interval is only reported when both of its
//! endpoints were actually observed; a missing mark yields `None`, never a
//! fabricated zero.

use std::time::{Duration, Instant};

use voxbridge_foundation::clock::{real_clock, SharedClock};

/// Timing marks for the current caller turn, scoped to one session.
pub struct TurnLatency {
    clock: SharedClock,
    speech_start: Option<Instant>,
    speech_end: Option<Instant>,
    synthesis_start: Option<Instant>,
}

/// Derived intervals for one completed synthesis, computed at
/// synthesis-completed time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnReport {
    /// Caller speech start to caller speech stop.
    pub speech_duration: Option<Duration>,
    /// Caller speech stop to first synthesized audio chunk.
    pub response_latency: Option<Duration>,
    /// First synthesized audio chunk to synthesis completed.
    pub synthesis_duration: Option<Duration>,
    /// Caller speech start to synthesis completed.
    pub end_to_end: Option<Duration>,
}

/// Returned by [`TurnLatency::mark_synthesis_audio`] for the first audio
/// chunk of a synthesis; subsequent chunks return nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisStarted {
    pub response_latency: Option<Duration>,
}

impl Default for TurnLatency {
    fn default() -> Self {
        Self::new(real_clock())
    }
}

impl TurnLatency {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            speech_start: None,
            speech_end: None,
            synthesis_start: None,
        }
    }

    /// Caller started speaking: begin a new turn. All marks from the
    /// previous turn are cleared.
    pub fn mark_speech_start(&mut self) {
        self.speech_start = Some(self.clock.now());
        self.speech_end = None;
        self.synthesis_start = None;
    }

    /// Caller stopped speaking. Returns the speech duration when the start
    /// of this speech segment was observed.
    pub fn mark_speech_stop(&mut self) -> Option<Duration> {
        let now = self.clock.now();
        self.speech_end = Some(now);
        self.speech_start.map(|start| now - start)
    }

    /// One synthesized audio chunk arrived. The first chunk of a synthesis
    /// sets the synthesis-start mark and reports the speech-end to
    /// first-audio latency (when speech-end was observed).
    pub fn mark_synthesis_audio(&mut self) -> Option<SynthesisStarted> {
        if self.synthesis_start.is_some() {
            return None;
        }
        let now = self.clock.now();
        self.synthesis_start = Some(now);
        Some(SynthesisStarted {
            response_latency: self.speech_end.map(|end| now - end),
        })
    }

    /// Caller transcript arrived. Returns the speech-end to transcript
    /// latency when speech-end was observed. Does not store a mark.
    pub fn mark_transcript(&self) -> Option<Duration> {
        self.speech_end.map(|end| self.clock.now() - end)
    }

    /// Synthesis completed: derive the turn intervals and clear the
    /// synthesis mark so a follow-up synthesis starts fresh.
    pub fn finish_synthesis(&mut self) -> TurnReport {
        let now = self.clock.now();
        let report = TurnReport {
            speech_duration: match (self.speech_start, self.speech_end) {
                (Some(start), Some(end)) => Some(end - start),
                _ => None,
            },
            response_latency: match (self.speech_end, self.synthesis_start) {
                (Some(end), Some(synth)) => Some(synth - end),
                _ => None,
            },
            synthesis_duration: self.synthesis_start.map(|synth| now - synth),
            end_to_end: self.speech_start.map(|start| now - start),
        };
        self.synthesis_start = None;
        report
    }

    /// Synthesis was cancelled: the in-flight synthesis produces no report.
    pub fn cancel_synthesis(&mut self) {
        self.synthesis_start = None;
    }
}
