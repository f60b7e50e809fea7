//! Contraction diagnostics: per-pass merge counts and timings.
//!
//! Timing goes through the [`Clock`] trait so this crate never touches a
//! platform clock itself. Callers that do not care about durations pass
//! [`NoClock`].
//!
//! Durations are serialized as fractional seconds (`f64`) since
//! `std::time::Duration` does not implement serde traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Serde support for `std::time::Duration` as fractional seconds.
pub mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    ///
    /// # Errors
    ///
    /// Rejects negative, non-finite, or out-of-range values.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of timestamps for diagnostics.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// A [`Clock`] that reports every duration as zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClock;

impl Clock for NoClock {
    type Instant = ();

    fn now(&self) {}

    fn elapsed(&self, _since: &()) -> Duration {
        Duration::ZERO
    }
}

/// One contraction pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationDiagnostics {
    /// Number of `merge_nodes` calls performed in this pass.
    pub merges: usize,
    /// Live nodes after the pass.
    pub live_nodes: usize,
    /// Wall-clock duration of the pass (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

/// Diagnostics of one run of the contraction loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractionDiagnostics {
    /// Live nodes before the first pass.
    pub initial_nodes: usize,
    /// Edges before the first pass.
    pub initial_edges: usize,
    /// Every pass, in order. The last one reports zero merges when the
    /// fixpoint was reached.
    pub iterations: Vec<IterationDiagnostics>,
    /// Live nodes after the last pass.
    pub final_nodes: usize,
    /// Edges after the last pass.
    pub final_edges: usize,
    /// Whether the loop stopped at the fixpoint rather than the cap.
    pub converged: bool,
    /// Total wall-clock duration (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

impl ContractionDiagnostics {
    /// Total number of merges across all passes.
    #[must_use]
    pub fn total_merges(&self) -> usize {
        self.iterations.iter().map(|i| i.merges).sum()
    }

    /// Render a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Contraction Report\n{}", "=".repeat(48)));
        lines.push(format!(
            "Nodes: {} -> {}  |  Edges: {} -> {}",
            self.initial_nodes, self.final_nodes, self.initial_edges, self.final_edges,
        ));
        lines.push(format!(
            "Passes: {}  |  Merges: {}  |  {}",
            self.iterations.len(),
            self.total_merges(),
            if self.converged {
                "converged"
            } else {
                "stopped at iteration cap"
            },
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration)
        ));
        lines.push(String::new());

        lines.push(format!("{:>6} {:>10} {:>12} {:>12}", "Pass", "Merges", "Live", "Duration"));
        lines.push("-".repeat(48));
        for (i, pass) in self.iterations.iter().enumerate() {
            lines.push(format!(
                "{:>6} {:>10} {:>12} {:>10.3}ms",
                i + 1,
                pass.merges,
                pass.live_nodes,
                duration_ms(pass.duration),
            ));
        }

        lines.join("\n")
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> ContractionDiagnostics {
        ContractionDiagnostics {
            initial_nodes: 9,
            initial_edges: 12,
            iterations: vec![
                IterationDiagnostics {
                    merges: 4,
                    live_nodes: 5,
                    duration: Duration::from_millis(500),
                },
                IterationDiagnostics {
                    merges: 2,
                    live_nodes: 3,
                    duration: Duration::from_millis(250),
                },
                IterationDiagnostics {
                    merges: 0,
                    live_nodes: 3,
                    duration: Duration::from_millis(125),
                },
            ],
            final_nodes: 3,
            final_edges: 3,
            converged: true,
            total_duration: Duration::from_millis(875),
        }
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let ms = duration_ms(Duration::from_millis(1234));
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn no_clock_is_always_zero() {
        let clock = NoClock;
        let start = clock.now();
        assert_eq!(clock.elapsed(&start), Duration::ZERO);
    }

    #[test]
    fn total_merges_sums_passes() {
        assert_eq!(sample().total_merges(), 6);
    }

    #[test]
    fn report_mentions_counts() {
        let report = sample().report();
        assert!(report.contains("Nodes: 9 -> 3"));
        assert!(report.contains("converged"));
        assert_eq!(report.lines().filter(|l| l.contains("ms")).count(), 4);
    }

    #[test]
    fn serde_round_trip() {
        let diag = sample();
        let json = serde_json::to_string(&diag).unwrap();
        let back: ContractionDiagnostics = serde_json::from_str(&json).unwrap();
        assert_eq!(back, diag);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let json = r#"{"merges":1,"live_nodes":1,"duration":-1.0}"#;
        assert!(serde_json::from_str::<IterationDiagnostics>(json).is_err());
    }
}
