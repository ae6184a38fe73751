//! Channel alignment
//!
//! Resamples channels recorded at unrelated rates onto the timestamps of a
//! reference channel. Both time axes are sorted, so every secondary channel
//! is resolved with one forward sweep: O(n + m) per pair.
//!
//! A query that falls outside a secondary channel's covered range yields NaN
//! rather than an extrapolated value.

use crate::types::{Channel, InputLabel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a secondary channel is sampled between its own timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Value of the closest sample; ties go to the earlier sample
    #[default]
    Nearest,
    /// Straight line between the two neighbouring samples
    Linear,
}

/// One channel taking part in an alignment
#[derive(Debug, Clone, Copy)]
pub struct AlignInput<'a> {
    pub label: InputLabel,
    pub channel: &'a Channel,
    /// Time offset of the channel's recording relative to the base recording
    pub offset: f64,
}

impl<'a> AlignInput<'a> {
    pub fn new(label: InputLabel, channel: &'a Channel, offset: f64) -> Self {
        Self {
            label,
            channel,
            offset,
        }
    }
}

/// Equal-length value columns on the reference time axis
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlignedInputs {
    times: Vec<f64>,
    columns: BTreeMap<InputLabel, Vec<f64>>,
}

impl AlignedInputs {
    /// Build directly from columns. Columns of the wrong length are dropped.
    pub fn from_columns(times: Vec<f64>, columns: impl IntoIterator<Item = (InputLabel, Vec<f64>)>) -> Self {
        let len = times.len();
        let columns = columns
            .into_iter()
            .filter(|(label, column)| {
                if column.len() != len {
                    log::warn!("Dropping input {} with {} values (expected {})", label, column.len(), len);
                    return false;
                }
                true
            })
            .collect();
        Self { times, columns }
    }

    /// Reference timestamps (local time of the reference channel)
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn column(&self, label: InputLabel) -> Option<&[f64]> {
        self.columns.get(&label).map(Vec::as_slice)
    }

    pub fn labels(&self) -> impl Iterator<Item = InputLabel> + '_ {
        self.columns.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Resamples secondary channels onto a reference channel's time axis
#[derive(Debug, Clone, Copy, Default)]
pub struct Aligner {
    mode: Interpolation,
}

impl Aligner {
    pub fn new(mode: Interpolation) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> Interpolation {
        self.mode
    }

    /// Align `secondaries` onto `reference`'s timestamps
    ///
    /// Element i of a secondary column is that channel's value at local time
    /// `t_ref[i] - offset_secondary + offset_ref`. The reference column is the
    /// reference channel's own values, untouched.
    pub fn align(&self, reference: AlignInput<'_>, secondaries: &[AlignInput<'_>]) -> AlignedInputs {
        let times = reference.channel.times().to_vec();
        let mut columns = BTreeMap::new();
        columns.insert(reference.label, reference.channel.values().to_vec());

        for input in secondaries {
            if input.label == reference.label {
                continue;
            }
            let shift = reference.offset - input.offset;
            let query: Vec<f64> = times.iter().map(|t| t + shift).collect();
            let column = self.resample(input.channel.times(), input.channel.values(), &query);
            log::trace!(
                "Aligned {} ('{}', {} samples) onto {} reference timestamps",
                input.label,
                input.channel.name(),
                input.channel.len(),
                times.len()
            );
            columns.insert(input.label, column);
        }

        AlignedInputs { times, columns }
    }

    /// Sample (times, values) at each of the sorted `query` times
    pub fn resample(&self, times: &[f64], values: &[f64], query: &[f64]) -> Vec<f64> {
        let m = times.len().min(values.len());
        if m == 0 {
            return vec![f64::NAN; query.len()];
        }
        let (first, last) = (times[0], times[m - 1]);

        // k = first index with times[k] >= q; monotone because query is sorted
        let mut k = 0usize;
        query
            .iter()
            .map(|&q| {
                if q.is_nan() || q < first || q > last {
                    return f64::NAN;
                }
                while k < m && times[k] < q {
                    k += 1;
                }
                if times[k] == q {
                    return values[k];
                }
                // first < q < last, so both neighbours exist and times[k-1] < q < times[k]
                let (before, after) = (k - 1, k);
                match self.mode {
                    Interpolation::Nearest => {
                        if times[after] - q < q - times[before] {
                            values[after]
                        } else {
                            values[before]
                        }
                    }
                    Interpolation::Linear => {
                        let (t0, t1) = (times[before], times[after]);
                        let (v0, v1) = (values[before], values[after]);
                        v0 + (v1 - v0) * (q - t0) / (t1 - t0)
                    }
                }
            })
            .collect()
    }
}

/// Index of the sample nearest to `t`, clamped to the series ends
///
/// Ties resolve to the earlier sample.
pub(crate) fn nearest_index(times: &[f64], t: f64) -> Option<usize> {
    if times.is_empty() || t.is_nan() {
        return None;
    }
    let k = times.partition_point(|&x| x < t);
    if k == 0 {
        return Some(0);
    }
    if k == times.len() {
        return Some(times.len() - 1);
    }
    if times[k] == t || times[k] - t < t - times[k - 1] {
        Some(k)
    } else {
        Some(k - 1)
    }
}
