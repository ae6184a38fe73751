//! Filter evaluation and precedence stacking
//!
//! Evaluation runs in two phases:
//!
//! 1. For every active filter, evaluate its predicate in every recording,
//!    build buffered intervals in local time, shift them into base time and
//!    union them. A hit in any recording counts for all of them.
//! 2. For every recording, start each channel's mask from the default state
//!    and apply the filters bottom to top, each one forcing only the
//!    timestamps inside its own union. The top filter is applied last.
//!
//! Membership is always tested in base time. Shifting a union back into
//! local time is not exact in floating point and can drop the very sample
//! that produced a hit.

use super::definition::{FilterDefinition, FilterMode};
use super::interval::IntervalSet;
use super::stack::FilterStack;
use crate::align::{AlignInput, Aligner, Interpolation};
use crate::types::{InputLabel, Recording, RecordingId};
use std::collections::BTreeMap;

/// Final visibility per recording and channel
///
/// A channel without a mask is fully visible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Visibility {
    masks: BTreeMap<RecordingId, BTreeMap<String, Vec<bool>>>,
}

impl Visibility {
    /// No filtering at all
    pub fn all_visible() -> Self {
        Self::default()
    }

    pub fn mask(&self, recording: RecordingId, channel: &str) -> Option<&[bool]> {
        self.masks.get(&recording)?.get(channel).map(Vec::as_slice)
    }

    pub fn is_visible(&self, recording: RecordingId, channel: &str, index: usize) -> bool {
        self.mask(recording, channel)
            .map_or(true, |mask| mask.get(index).copied().unwrap_or(false))
    }

    /// Whether any filter took part
    pub fn is_filtered(&self) -> bool {
        !self.masks.is_empty()
    }

    fn insert(&mut self, recording: RecordingId, channel: &str, mask: Vec<bool>) {
        self.masks
            .entry(recording)
            .or_default()
            .insert(channel.to_string(), mask);
    }
}

/// Turns a filter stack into visibility masks
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterEngine {
    aligner: Aligner,
}

impl FilterEngine {
    pub fn new(mode: Interpolation) -> Self {
        Self {
            aligner: Aligner::new(mode),
        }
    }

    /// Buffered hit intervals of `filter` in `recording`'s local time
    ///
    /// `None` when the recording lacks the filter's reference channel.
    pub fn recording_intervals(&self, filter: &FilterDefinition, recording: &Recording) -> Option<IntervalSet> {
        let inputs = filter.inputs();
        let Some(reference) = recording.channel(inputs.reference()) else {
            log::debug!(
                "Filter '{}' skipped for recording '{}': no channel '{}'",
                filter.name(),
                recording.name(),
                inputs.reference()
            );
            return None;
        };

        let mut secondaries = Vec::new();
        for (label, name) in inputs.iter().filter(|(label, _)| *label != InputLabel::A) {
            match recording.channel(name) {
                Some(channel) => secondaries.push(AlignInput::new(label, channel, recording.offset())),
                None => log::warn!(
                    "Filter '{}': input {} ('{}') missing from recording '{}'",
                    filter.name(),
                    label,
                    name,
                    recording.name()
                ),
            }
        }

        let aligned = self.aligner.align(
            AlignInput::new(InputLabel::A, reference, recording.offset()),
            &secondaries,
        );
        let hits = filter.expression().evaluate(&aligned).into_mask();
        let intervals = IntervalSet::from_hits(aligned.times(), &hits, filter.buffer_secs());

        log::debug!(
            "Filter '{}' in recording '{}': {} hits, {} intervals",
            filter.name(),
            recording.name(),
            hits.iter().filter(|h| **h).count(),
            intervals.len()
        );
        Some(intervals)
    }

    /// Union of the filter's intervals over all recordings, in base time
    pub fn unified_intervals(&self, filter: &FilterDefinition, recordings: &[Recording]) -> IntervalSet {
        let shifted: Vec<IntervalSet> = recordings
            .iter()
            .filter_map(|rec| {
                self.recording_intervals(filter, rec)
                    .map(|set| set.shifted(rec.offset()))
            })
            .collect();
        let unified = IntervalSet::union(&shifted);

        log::info!(
            "Filter '{}': {} intervals across {} recordings",
            filter.name(),
            unified.len(),
            shifted.len()
        );
        unified
    }

    /// Visibility of every channel sample under the whole stack
    pub fn visibility(&self, stack: &FilterStack, recordings: &[Recording]) -> Visibility {
        let unified: Vec<(FilterMode, IntervalSet)> = stack
            .active()
            .map(|filter| (filter.mode(), self.unified_intervals(filter, recordings)))
            .collect();
        if unified.is_empty() {
            return Visibility::all_visible();
        }

        let initially_visible = !unified.iter().any(|(mode, _)| *mode == FilterMode::Show);
        let mut visibility = Visibility::default();

        for recording in recordings {
            for channel in recording.channels() {
                // Compare in base time, the frame the unions were built in
                let base_times: Vec<f64> = channel.times().iter().map(|&t| recording.to_base_time(t)).collect();
                let mut mask = vec![initially_visible; channel.len()];
                for (mode, set) in unified.iter().rev() {
                    let covered = set.mask(&base_times);
                    let forced = *mode == FilterMode::Show;
                    for (visible, _) in mask.iter_mut().zip(&covered).filter(|(_, c)| **c) {
                        *visible = forced;
                    }
                }
                visibility.insert(recording.id(), channel.name(), mask);
            }
        }

        visibility
    }
}
