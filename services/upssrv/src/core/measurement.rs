//! Measurements and per-target poll outcomes

use crate::core::catalogue::MetricKind;

/// One sample: a metric kind, its value and the label values
///
/// Label values follow the order of the kind's descriptor labels; the
/// first is always the target address.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub kind: MetricKind,
    pub value: f64,
    pub labels: Vec<String>,
}

impl Measurement {
    pub fn new(kind: MetricKind, value: f64, labels: Vec<String>) -> Self {
        Self {
            kind,
            value,
            labels,
        }
    }

    /// Liveness sample for `target`
    pub fn up(target: &str, reachable: bool) -> Self {
        let value = if reachable { 1.0 } else { 0.0 };
        Self::new(MetricKind::Up, value, vec![target.to_string()])
    }

    pub fn target(&self) -> &str {
        self.labels.first().map(String::as_str).unwrap_or_default()
    }
}

/// Result of polling one target for one cycle
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// No usable session; only `up 0` is reported
    Unreachable { target: String, reason: String },
    /// Core read succeeded but a phase direction was cut short
    Partial(Vec<Measurement>),
    Complete(Vec<Measurement>),
}

impl PollOutcome {
    pub fn unreachable(target: impl Into<String>, reason: impl Into<String>) -> Self {
        PollOutcome::Unreachable {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn is_reachable(&self) -> bool {
        !matches!(self, PollOutcome::Unreachable { .. })
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, PollOutcome::Partial(_))
    }

    /// Flatten into the samples to publish
    ///
    /// Reachable outcomes already end with their `up 1` sample.
    pub fn into_measurements(self) -> Vec<Measurement> {
        match self {
            PollOutcome::Unreachable { target, .. } => vec![Measurement::up(&target, false)],
            PollOutcome::Partial(measurements) | PollOutcome::Complete(measurements) => {
                measurements
            },
        }
    }
}
