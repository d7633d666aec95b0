pub mod latency;
pub mod relay_metrics;

pub use latency::{SynthesisStarted, TurnLatency, TurnReport};
pub use relay_metrics::{FpsTracker, RelayMetrics, RelaySnapshot};
