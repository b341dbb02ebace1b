//! In-process metrics for the pipeline.
//!
//! Every metric is a series identified by its name and label set, so the same
//! counter is tracked separately per stage, op or codec. Queries by name alone
//! aggregate over all of its series. Without the `telemetry` feature every
//! recording call compiles to nothing and snapshots are empty.

use std::collections::BTreeMap;
use std::fmt;

pub mod stage;
pub mod tags;

pub use stage::{DefaultStageTelemetry, StageTelemetry};

/// Name plus sorted label pairs of one metric series.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesKey {
    pub name: String,
    pub labels: Vec<(String, String)>,
}

impl SeriesKey {
    pub fn new(name: &str, labels: &[(&str, &str)]) -> Self {
        let mut labels = labels
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect::<Vec<_>>();
        labels.sort();
        labels.dedup_by(|a, b| a.0 == b.0);
        Self {
            name: name.to_owned(),
            labels,
        }
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// True when this series is `name` and carries every pair in `labels`.
    pub fn matches(&self, name: &str, labels: &[(&str, &str)]) -> bool {
        self.name == name
            && labels
                .iter()
                .all(|(key, value)| self.label(key) == Some(*value))
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.labels.is_empty() {
            return Ok(());
        }
        f.write_str("{")?;
        for (i, (key, value)) in self.labels.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("}")
    }
}

/// Histogram summary captured in telemetry snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub total: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
}

impl HistogramSnapshot {
    fn record(&mut self, value: u64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count = self.count.saturating_add(1);
        self.total = self.total.saturating_add(value);
        self.mean = self.total as f64 / self.count as f64;
    }

    fn merge(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.count = self.count.saturating_add(other.count);
        self.total = self.total.saturating_add(other.total);
        self.mean = self.total as f64 / self.count as f64;
    }
}

/// Point-in-time copy of every recorded series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub counters: BTreeMap<SeriesKey, u64>,
    pub gauges: BTreeMap<SeriesKey, u64>,
    pub histograms: BTreeMap<SeriesKey, HistogramSnapshot>,
}

impl TelemetrySnapshot {
    /// Sum of every series of counter `name`.
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counter_for(name, &[])
    }

    /// Sum of the series of counter `name` carrying all of `labels`.
    pub fn counter_for(&self, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
        sum_matching(&self.counters, name, labels)
    }

    pub fn gauge(&self, name: &str) -> Option<u64> {
        self.gauge_for(name, &[])
    }

    pub fn gauge_for(&self, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
        sum_matching(&self.gauges, name, labels)
    }

    pub fn histogram(&self, name: &str) -> Option<HistogramSnapshot> {
        self.histogram_for(name, &[])
    }

    /// Merges the matching histogram series into one summary.
    pub fn histogram_for(&self, name: &str, labels: &[(&str, &str)]) -> Option<HistogramSnapshot> {
        self.histograms
            .iter()
            .filter(|(key, _)| key.matches(name, labels))
            .fold(None, |merged: Option<HistogramSnapshot>, (_, hist)| {
                let mut merged = merged.unwrap_or_default();
                merged.merge(hist);
                Some(merged)
            })
    }
}

fn sum_matching(
    series: &BTreeMap<SeriesKey, u64>,
    name: &str,
    labels: &[(&str, &str)],
) -> Option<u64> {
    series
        .iter()
        .filter(|(key, _)| key.matches(name, labels))
        .fold(None, |sum: Option<u64>, (_, value)| {
            Some(sum.unwrap_or(0).saturating_add(*value))
        })
}

#[inline]
pub fn increment_counter(name: &'static str, value: u64, labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::update(name, labels, registry::Op::Add(value));

    let _ = (name, value, labels);
}

#[inline]
pub fn record_histogram(name: &'static str, value: u64, labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::update(name, labels, registry::Op::Sample(value));

    let _ = (name, value, labels);
}

#[inline]
pub fn set_gauge(name: &'static str, value: u64, labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::update(name, labels, registry::Op::Set(value));

    let _ = (name, value, labels);
}

#[inline]
pub fn add_gauge(name: &'static str, delta: u64, labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::update(name, labels, registry::Op::Raise(delta));

    let _ = (name, delta, labels);
}

/// Subtracts `delta` from a gauge series with floor at zero.
#[inline]
pub fn sub_gauge_saturating(name: &'static str, delta: u64, labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::update(name, labels, registry::Op::Lower(delta));

    let _ = (name, delta, labels);
}

pub fn snapshot() -> TelemetrySnapshot {
    #[cfg(feature = "telemetry")]
    {
        registry::snapshot()
    }

    #[cfg(not(feature = "telemetry"))]
    {
        TelemetrySnapshot::default()
    }
}

/// Clears every recorded series.
pub fn reset() {
    #[cfg(feature = "telemetry")]
    registry::reset();
}

#[cfg(feature = "telemetry")]
mod registry {
    use std::sync::{Mutex, MutexGuard};

    use super::{HistogramSnapshot, SeriesKey, TelemetrySnapshot};

    pub(super) enum Op {
        Add(u64),
        Sample(u64),
        Set(u64),
        Raise(u64),
        Lower(u64),
    }

    static SNAPSHOT: Mutex<TelemetrySnapshot> = Mutex::new(TelemetrySnapshot {
        counters: std::collections::BTreeMap::new(),
        gauges: std::collections::BTreeMap::new(),
        histograms: std::collections::BTreeMap::new(),
    });

    fn lock() -> MutexGuard<'static, TelemetrySnapshot> {
        match SNAPSHOT.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(super) fn update(name: &str, labels: &[(&str, &str)], op: Op) {
        let key = SeriesKey::new(name, labels);
        let mut series = lock();
        match op {
            Op::Add(value) => {
                let entry = series.counters.entry(key).or_insert(0);
                *entry = entry.saturating_add(value);
            }
            Op::Sample(value) => series.histograms.entry(key).or_default().record(value),
            Op::Set(value) => {
                series.gauges.insert(key, value);
            }
            Op::Raise(delta) => {
                let entry = series.gauges.entry(key).or_insert(0);
                *entry = entry.saturating_add(delta);
            }
            Op::Lower(delta) => {
                let entry = series.gauges.entry(key).or_insert(0);
                *entry = entry.saturating_sub(delta);
            }
        }
    }

    pub(super) fn snapshot() -> TelemetrySnapshot {
        lock().clone()
    }

    pub(super) fn reset() {
        *lock() = TelemetrySnapshot::default();
    }
}
