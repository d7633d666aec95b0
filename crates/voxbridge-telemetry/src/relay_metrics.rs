use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared metrics for cross-session relay monitoring.
///
/// These are the only objects shared between sessions; everything is a
/// monotone counter or last-value gauge, so no locking is involved.
#[derive(Clone)]
pub struct RelayMetrics {
    // Session lifecycle
    pub active_sessions: Arc<AtomicUsize>,
    pub sessions_started: Arc<AtomicU64>,
    pub sessions_completed: Arc<AtomicU64>,

    // Telephony leg
    pub telephony_frames_in: Arc<AtomicU64>,
    pub telephony_frames_out: Arc<AtomicU64>,
    pub telephony_in_fps: Arc<AtomicU64>, // frames per second * 10

    // Translation leg
    pub translation_events: Arc<AtomicU64>,
    pub audio_payloads_forwarded: Arc<AtomicU64>,
    pub audio_payloads_dropped: Arc<AtomicU64>, // dropped while no connector
    pub audio_chunks_relayed: Arc<AtomicU64>,

    // Turn taking
    pub synthesis_cycles: Arc<AtomicU64>,
    pub cancellations: Arc<AtomicU64>,
    pub is_speaking: Arc<AtomicBool>,
    pub last_speech_time: Arc<RwLock<Option<Instant>>>,

    // Error tracking
    pub decode_errors: Arc<AtomicU64>,
    pub remote_errors: Arc<AtomicU64>,

    // Last observed turn latencies, milliseconds
    pub last_response_latency_ms: Arc<AtomicU64>,
    pub last_end_to_end_ms: Arc<AtomicU64>,
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self {
            active_sessions: Arc::new(AtomicUsize::new(0)),
            sessions_started: Arc::new(AtomicU64::new(0)),
            sessions_completed: Arc::new(AtomicU64::new(0)),

            telephony_frames_in: Arc::new(AtomicU64::new(0)),
            telephony_frames_out: Arc::new(AtomicU64::new(0)),
            telephony_in_fps: Arc::new(AtomicU64::new(0)),

            translation_events: Arc::new(AtomicU64::new(0)),
            audio_payloads_forwarded: Arc::new(AtomicU64::new(0)),
            audio_payloads_dropped: Arc::new(AtomicU64::new(0)),
            audio_chunks_relayed: Arc::new(AtomicU64::new(0)),

            synthesis_cycles: Arc::new(AtomicU64::new(0)),
            cancellations: Arc::new(AtomicU64::new(0)),
            is_speaking: Arc::new(AtomicBool::new(false)),
            last_speech_time: Arc::new(RwLock::new(None)),

            decode_errors: Arc::new(AtomicU64::new(0)),
            remote_errors: Arc::new(AtomicU64::new(0)),

            last_response_latency_ms: Arc::new(AtomicU64::new(0)),
            last_end_to_end_ms: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl RelayMetrics {
    pub fn session_opened(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
        self.sessions_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_telephony_in(&self) {
        self.telephony_frames_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_telephony_out(&self) {
        self.telephony_frames_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_telephony_in_fps(&self, fps: f64) {
        self.telephony_in_fps
            .store((fps * 10.0) as u64, Ordering::Relaxed);
    }

    pub fn speech_started(&self) {
        self.is_speaking.store(true, Ordering::Relaxed);
        *self.last_speech_time.write() = Some(Instant::now());
    }

    pub fn speech_stopped(&self) {
        self.is_speaking.store(false, Ordering::Relaxed);
    }

    pub fn record_response_latency(&self, latency: Duration) {
        self.last_response_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_end_to_end(&self, latency: Duration) {
        self.last_end_to_end_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelaySnapshot {
        RelaySnapshot {
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            telephony_frames_in: self.telephony_frames_in.load(Ordering::Relaxed),
            telephony_frames_out: self.telephony_frames_out.load(Ordering::Relaxed),
            translation_events: self.translation_events.load(Ordering::Relaxed),
            audio_payloads_dropped: self.audio_payloads_dropped.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            remote_errors: self.remote_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters for periodic stats logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySnapshot {
    pub active_sessions: usize,
    pub sessions_started: u64,
    pub telephony_frames_in: u64,
    pub telephony_frames_out: u64,
    pub translation_events: u64,
    pub audio_payloads_dropped: u64,
    pub cancellations: u64,
    pub decode_errors: u64,
    pub remote_errors: u64,
}

#[derive(Debug)]
pub struct FpsTracker {
    last_update: Instant,
    frame_count: u64,
}

impl FpsTracker {
    pub fn new() -> Self {
        Self {
            last_update: Instant::now(),
            frame_count: 0,
        }
    }

    pub fn tick(&mut self) -> Option<f64> {
        self.frame_count += 1;
        let elapsed = self.last_update.elapsed();

        if elapsed >= Duration::from_secs(1) {
            let fps = self.frame_count as f64 / elapsed.as_secs_f64();
            self.last_update = Instant::now();
            self.frame_count = 0;
            Some(fps)
        } else {
            None
        }
    }
}

impl Default for FpsTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_counters_track_open_and_close() {
        let metrics = RelayMetrics::default();
        metrics.session_opened();
        metrics.session_opened();
        metrics.session_closed();

        let snap = metrics.snapshot();
        assert_eq!(snap.active_sessions, 1);
        assert_eq!(snap.sessions_started, 2);
    }

    #[test]
    fn latency_gauges_store_milliseconds() {
        let metrics = RelayMetrics::default();
        metrics.record_response_latency(Duration::from_millis(480));
        assert_eq!(
            metrics.last_response_latency_ms.load(Ordering::Relaxed),
            480
        );
    }
}
