//! Pipeline entry point
//!
//! A [`Session`] owns the loaded recordings, the math channel definitions and
//! the filter stack. [`Session::compute`] runs the whole pipeline from scratch
//! and returns an immutable [`Snapshot`]; nothing is patched incrementally, so
//! any edit is followed by a fresh `compute()`.
//!
//! ```text
//! recordings ─► align ─► math channels ─► filters ─► Snapshot ─► render/decimate
//! ```

use crate::align::{AlignInput, Aligner, Interpolation};
use crate::config::PipelineConfig;
use crate::decimate::{Decimator, Point, RenderPoint, TimeWindow};
use crate::expression::Expression;
use crate::filter::{FilterDefinition, FilterEngine, FilterStack, Visibility};
use crate::types::{
    Channel, ChannelData, ChannelStatistics, InputBindings, InputLabel, ModelError, Recording, RecordingId, Result,
    SourceKind,
};
use serde::Serialize;
use std::collections::HashSet;

/// A derived channel: a numeric expression over up to five bound inputs
#[derive(Debug, Clone, PartialEq)]
pub struct MathChannelDefinition {
    name: String,
    unit: String,
    expression: Expression,
    inputs: InputBindings,
    interpolation: Option<Interpolation>,
}

impl MathChannelDefinition {
    /// Validate and compile a math channel; the expression must be numeric
    pub fn new(name: &str, unit: &str, expression: &str, inputs: InputBindings) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ModelError::EmptyChannelName.into());
        }
        let expression = Expression::compile_numeric(expression, &inputs.labels())?;
        Ok(Self {
            name: name.to_string(),
            unit: unit.trim().to_string(),
            expression,
            inputs,
            interpolation: None,
        })
    }

    /// Builder method: override the session's math interpolation for this channel
    pub fn with_interpolation(mut self, mode: Interpolation) -> Self {
        self.interpolation = Some(mode);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn inputs(&self) -> &InputBindings {
        &self.inputs
    }

    pub fn interpolation(&self) -> Option<Interpolation> {
        self.interpolation
    }
}

/// Recordings, derived channel definitions and filters
#[derive(Debug, Clone, Default)]
pub struct Session {
    config: PipelineConfig,
    recordings: Vec<Recording>,
    next_id: u32,
    math_channels: Vec<MathChannelDefinition>,
    filters: FilterStack,
}

impl Session {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Add a recording; the first one becomes the base (offset fixed at 0)
    pub fn add_recording(&mut self, name: &str, channels: Vec<ChannelData>) -> Result<RecordingId> {
        let id = RecordingId(self.next_id);
        let mut seen = HashSet::new();
        let mut built = Vec::with_capacity(channels.len());
        for data in channels {
            if !seen.insert(data.name.clone()) {
                return Err(ModelError::DuplicateChannel(data.name).into());
            }
            built.push(Channel::new(id, SourceKind::Raw, data)?);
        }

        let is_base = self.recordings.is_empty();
        log::info!(
            "Added recording {} '{}' with {} channels{}",
            id,
            name,
            built.len(),
            if is_base { " (base)" } else { "" }
        );
        self.recordings.push(Recording::new(id, name.to_string(), is_base, built));
        self.next_id += 1;
        Ok(id)
    }

    pub fn recordings(&self) -> &[Recording] {
        &self.recordings
    }

    pub fn recording(&self, id: RecordingId) -> Option<&Recording> {
        self.recordings.iter().find(|r| r.id() == id)
    }

    pub fn base(&self) -> Option<&Recording> {
        self.recordings.iter().find(|r| r.is_base())
    }

    /// Set a non-base recording's offset (seconds added to local time)
    pub fn set_offset(&mut self, id: RecordingId, offset: f64) -> Result<()> {
        if !offset.is_finite() {
            return Err(ModelError::InvalidOffset(offset).into());
        }
        let recording = self
            .recordings
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or(ModelError::UnknownRecording(id))?;
        if recording.is_base() {
            return Err(ModelError::BaseOffsetImmutable.into());
        }
        log::debug!("Recording {} offset: {} → {}", id, recording.offset(), offset);
        recording.set_offset(offset);
        Ok(())
    }

    /// Remove a recording
    ///
    /// Removing the base promotes the next recording and rebases every offset
    /// so the new base sits at exactly 0.
    pub fn remove_recording(&mut self, id: RecordingId) -> Result<Recording> {
        let index = self
            .recordings
            .iter()
            .position(|r| r.id() == id)
            .ok_or(ModelError::UnknownRecording(id))?;
        let removed = self.recordings.remove(index);

        if removed.is_base() {
            if let Some(new_base) = self.recordings.first() {
                let shift = new_base.offset();
                log::info!("Recording {} is the new base (rebasing by {}s)", new_base.id(), shift);
                for rec in &mut self.recordings {
                    rec.set_offset(rec.offset() - shift);
                }
                self.recordings[0].mark_base();
            }
        }
        Ok(removed)
    }

    pub fn math_channels(&self) -> &[MathChannelDefinition] {
        &self.math_channels
    }

    /// Append a math channel; later channels may use earlier ones as inputs
    pub fn add_math_channel(&mut self, definition: MathChannelDefinition) -> Result<()> {
        if self.math_channels.iter().any(|m| m.name() == definition.name()) {
            return Err(ModelError::DuplicateChannel(definition.name).into());
        }
        self.math_channels.push(definition);
        Ok(())
    }

    /// Replace the math channel called `name`, keeping its evaluation order
    pub fn replace_math_channel(&mut self, name: &str, definition: MathChannelDefinition) -> Result<()> {
        let index = self.math_index(name)?;
        let clash = self
            .math_channels
            .iter()
            .enumerate()
            .any(|(i, m)| i != index && m.name() == definition.name());
        if clash {
            return Err(ModelError::DuplicateChannel(definition.name).into());
        }
        self.math_channels[index] = definition;
        Ok(())
    }

    pub fn remove_math_channel(&mut self, name: &str) -> Result<MathChannelDefinition> {
        let index = self.math_index(name)?;
        Ok(self.math_channels.remove(index))
    }

    fn math_index(&self, name: &str) -> Result<usize> {
        self.math_channels
            .iter()
            .position(|m| m.name() == name)
            .ok_or_else(|| ModelError::UnknownMathChannel(name.to_string()).into())
    }

    pub fn filters(&self) -> &FilterStack {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut FilterStack {
        &mut self.filters
    }

    /// Append a filter at the bottom of the stack (lowest precedence)
    pub fn add_filter(&mut self, filter: FilterDefinition) -> Result<()> {
        self.filters.push(filter)?;
        Ok(())
    }

    /// Run the full pipeline on the current state
    pub fn compute(&self) -> Snapshot {
        let mut recordings = self.recordings.clone();
        for recording in &mut recordings {
            for definition in &self.math_channels {
                self.apply_math_channel(definition, recording);
            }
        }

        let engine = FilterEngine::new(self.config.filter_interpolation);
        let visibility = engine.visibility(&self.filters, &recordings);

        Snapshot {
            recordings,
            visibility,
            point_budget: self.config.point_budget,
        }
    }

    fn apply_math_channel(&self, definition: &MathChannelDefinition, recording: &mut Recording) {
        if recording.channel(definition.name()).is_some() {
            log::warn!(
                "Math channel '{}' skipped in recording '{}': a channel with that name already exists",
                definition.name(),
                recording.name()
            );
            return;
        }

        let inputs = definition.inputs();
        let Some(reference) = recording.channel(inputs.reference()) else {
            log::warn!(
                "Math channel '{}' skipped in recording '{}': input A ('{}') not found",
                definition.name(),
                recording.name(),
                inputs.reference()
            );
            return;
        };

        let offset = recording.offset();
        let mut secondaries = Vec::new();
        for (label, name) in inputs.iter().filter(|(label, _)| *label != InputLabel::A) {
            match recording.channel(name) {
                Some(channel) => secondaries.push(AlignInput::new(label, channel, offset)),
                None => log::warn!(
                    "Math channel '{}': input {} ('{}') missing from recording '{}', using NaN",
                    definition.name(),
                    label,
                    name,
                    recording.name()
                ),
            }
        }

        let mode = definition.interpolation().unwrap_or(self.config.math_interpolation);
        let aligned = Aligner::new(mode).align(AlignInput::new(InputLabel::A, reference, offset), &secondaries);
        let values = definition.expression().evaluate(&aligned).into_numeric();
        let data = ChannelData::new(definition.name(), definition.unit(), aligned.times().to_vec(), values);

        match Channel::new(recording.id(), SourceKind::Derived, data) {
            Ok(channel) => {
                log::info!(
                    "Math channel '{}' applied to recording '{}' ({} samples)",
                    definition.name(),
                    recording.name(),
                    channel.len()
                );
                recording.push_channel(channel);
            }
            Err(e) => log::warn!("Math channel '{}' rejected: {}", definition.name(), e),
        }
    }
}

/// One channel ready for drawing; point times are in base time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedSeries {
    pub recording: RecordingId,
    pub name: String,
    pub unit: String,
    pub source: SourceKind,
    pub offset: f64,
    pub points: Vec<RenderPoint>,
}

/// Immutable result of [`Session::compute`]
#[derive(Debug, Clone)]
pub struct Snapshot {
    recordings: Vec<Recording>,
    visibility: Visibility,
    point_budget: usize,
}

impl Snapshot {
    /// Recordings including their derived channels
    pub fn recordings(&self) -> &[Recording] {
        &self.recordings
    }

    pub fn recording(&self, id: RecordingId) -> Option<&Recording> {
        self.recordings.iter().find(|r| r.id() == id)
    }

    pub fn visibility(&self) -> &Visibility {
        &self.visibility
    }

    fn lookup(&self, id: RecordingId, channel: &str) -> std::result::Result<(&Recording, &Channel), ModelError> {
        let recording = self.recording(id).ok_or(ModelError::UnknownRecording(id))?;
        let channel = recording.channel(channel).ok_or_else(|| ModelError::UnknownChannel {
            recording: id,
            channel: channel.to_string(),
        })?;
        Ok((recording, channel))
    }

    pub fn channel(&self, id: RecordingId, channel: &str) -> Result<&Channel> {
        Ok(self.lookup(id, channel)?.1)
    }

    /// Decimated points inside a base-time window (`None` = whole channel)
    pub fn render(&self, id: RecordingId, channel: &str, window: Option<TimeWindow>) -> Result<RenderedSeries> {
        self.render_with_budget(id, channel, window, self.point_budget)
    }

    pub fn render_with_budget(
        &self,
        id: RecordingId,
        channel: &str,
        window: Option<TimeWindow>,
        budget: usize,
    ) -> Result<RenderedSeries> {
        let (recording, ch) = self.lookup(id, channel)?;
        let offset = recording.offset();

        let local = match window {
            Some(w) => Some(w.shifted(-offset)),
            None => TimeWindow::covering(ch.times()),
        };
        let points = match local {
            Some(local) => Decimator::new(budget)
                .decimate_with_mask(ch.times(), ch.values(), self.visibility.mask(id, ch.name()), local)
                .into_iter()
                .map(|p| match p {
                    RenderPoint::Sample(s) => RenderPoint::Sample(Point::new(s.time + offset, s.value)),
                    RenderPoint::Gap => RenderPoint::Gap,
                })
                .collect(),
            None => Vec::new(),
        };

        Ok(RenderedSeries {
            recording: id,
            name: ch.name().to_string(),
            unit: ch.unit().to_string(),
            source: ch.source(),
            offset,
            points,
        })
    }

    /// Value of the sample nearest to `base_time`, for chart title readouts
    pub fn value_at(&self, id: RecordingId, channel: &str, base_time: f64) -> Result<Option<f64>> {
        let (recording, ch) = self.lookup(id, channel)?;
        Ok(ch.value_at(recording.to_local_time(base_time)))
    }

    /// Earliest and latest base time over every channel
    pub fn time_range(&self) -> Option<TimeWindow> {
        self.recordings
            .iter()
            .flat_map(|rec| {
                rec.channels()
                    .iter()
                    .filter_map(move |ch| ch.time_range().map(|(a, b)| (a + rec.offset(), b + rec.offset())))
            })
            .reduce(|(a0, b0), (a1, b1)| (a0.min(a1), b0.max(b1)))
            .map(|(start, end)| TimeWindow::new(start, end))
    }

    pub fn statistics(&self, id: RecordingId, channel: &str) -> Result<ChannelStatistics> {
        Ok(self.lookup(id, channel)?.1.statistics())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferLimits;
    use crate::filter::FilterMode;
    use crate::types::TransformError;

    fn data(name: &str, times: &[f64], values: &[f64]) -> ChannelData {
        ChannelData::new(name, "", times.to_vec(), values.to_vec())
    }

    fn two_recordings() -> (Session, RecordingId, RecordingId) {
        let mut session = Session::default();
        let a = session
            .add_recording("morning", vec![data("speed", &[0.0, 1.0, 2.0], &[10.0, 20.0, 30.0])])
            .unwrap();
        let b = session
            .add_recording("evening", vec![data("speed", &[0.0, 1.0], &[5.0, 6.0])])
            .unwrap();
        (session, a, b)
    }

    #[test]
    fn test_base_and_offsets() {
        let (mut session, a, b) = two_recordings();
        assert_eq!(session.base().map(Recording::id), Some(a));
        assert_eq!(
            session.set_offset(a, 5.0),
            Err(TransformError::Model(ModelError::BaseOffsetImmutable))
        );
        assert!(matches!(
            session.set_offset(b, f64::NAN),
            Err(TransformError::Model(ModelError::InvalidOffset(_)))
        ));
        assert_eq!(
            session.set_offset(RecordingId(99), 1.0),
            Err(TransformError::Model(ModelError::UnknownRecording(RecordingId(99))))
        );
        session.set_offset(b, 12.5).unwrap();
        assert_eq!(session.recording(b).unwrap().offset(), 12.5);
    }

    #[test]
    fn test_removing_base_rebases() {
        let mut session = Session::default();
        let a = session.add_recording("a", vec![]).unwrap();
        let b = session.add_recording("b", vec![]).unwrap();
        let c = session.add_recording("c", vec![]).unwrap();
        session.set_offset(b, 10.0).unwrap();
        session.set_offset(c, 25.0).unwrap();

        session.remove_recording(a).unwrap();
        let base = session.base().unwrap();
        assert_eq!(base.id(), b);
        assert_eq!(base.offset(), 0.0);
        assert_eq!(session.recording(c).unwrap().offset(), 15.0);
        assert!(session.remove_recording(a).is_err());
    }

    #[test]
    fn test_duplicate_raw_channel_rejected() {
        let mut session = Session::default();
        let err = session
            .add_recording("x", vec![data("rpm", &[0.0], &[1.0]), data("rpm", &[1.0], &[2.0])])
            .unwrap_err();
        assert_eq!(err, TransformError::Model(ModelError::DuplicateChannel("rpm".into())));
    }

    #[test]
    fn test_math_channels_chain_and_skip() {
        let mut session = Session::default();
        let a = session
            .add_recording(
                "trip",
                vec![
                    data("speed", &[0.0, 1.0, 2.0], &[10.0, 20.0, 30.0]),
                    data("rpm", &[0.0, 2.0], &[1000.0, 3000.0]),
                ],
            )
            .unwrap();
        let b = session.add_recording("other", vec![data("rpm", &[0.0], &[1.0])]).unwrap();

        let kph = MathChannelDefinition::new("speed_mps", "m/s", "A / 3.6", InputBindings::new("speed")).unwrap();
        let ratio = MathChannelDefinition::new(
            "ratio",
            "",
            "B / A",
            InputBindings::new("speed_mps").with(InputLabel::B, "rpm"),
        )
        .unwrap();
        session.add_math_channel(kph).unwrap();
        session.add_math_channel(ratio).unwrap();

        let snapshot = session.compute();
        let derived = snapshot.channel(a, "speed_mps").unwrap();
        assert_eq!(derived.source(), SourceKind::Derived);
        assert_eq!(derived.unit(), "m/s");
        assert_eq!(derived.times(), &[0.0, 1.0, 2.0]);

        // ratio uses the derived channel as its reference; rpm at t=1 ties → earlier sample
        let ratio = snapshot.channel(a, "ratio").unwrap();
        assert_eq!(ratio.values()[0], 1000.0 / (10.0 / 3.6));
        assert_eq!(ratio.values()[1], 1000.0 / (20.0 / 3.6));

        // Recording without input A gets nothing
        assert!(snapshot.channel(b, "speed_mps").is_err());
        // The session itself is untouched
        assert!(session.recording(a).unwrap().channel("speed_mps").is_none());
    }

    #[test]
    fn test_math_channel_registry() {
        let mut session = Session::default();
        let def = |name: &str| MathChannelDefinition::new(name, "", "A * 2", InputBindings::new("x")).unwrap();
        session.add_math_channel(def("one")).unwrap();
        session.add_math_channel(def("two")).unwrap();
        assert!(session.add_math_channel(def("one")).is_err());

        session.replace_math_channel("one", def("uno")).unwrap();
        assert_eq!(session.math_channels()[0].name(), "uno");
        assert!(session.replace_math_channel("uno", def("two")).is_err());
        assert!(session.remove_math_channel("one").is_err());
        assert_eq!(session.remove_math_channel("uno").unwrap().name(), "uno");

        assert_eq!(
            MathChannelDefinition::new(" ", "", "A", InputBindings::new("x")),
            Err(TransformError::Model(ModelError::EmptyChannelName))
        );
        assert!(MathChannelDefinition::new("m", "", "A > 1", InputBindings::new("x")).is_err());
    }

    #[test]
    fn test_render_uses_base_time_and_gaps() {
        let (mut session, _, b) = two_recordings();
        session.set_offset(b, 100.0).unwrap();
        let filter = FilterDefinition::new(
            "hide_slow",
            "A < 6",
            InputBindings::new("speed"),
            FilterMode::Hide,
            0.0,
            BufferLimits::default(),
        )
        .unwrap();
        session.add_filter(filter).unwrap();

        let snapshot = session.compute();
        let series = snapshot.render(b, "speed", None).unwrap();
        assert_eq!(series.offset, 100.0);
        assert_eq!(series.points, vec![RenderPoint::Sample(Point::new(101.0, 6.0))]);

        let window = TimeWindow::new(100.5, 200.0);
        let series = snapshot.render(b, "speed", Some(window)).unwrap();
        assert_eq!(series.points.len(), 1);

        assert_eq!(snapshot.value_at(b, "speed", 100.2).unwrap(), Some(5.0));
        assert!(snapshot.value_at(b, "nope", 0.0).is_err());
    }

    #[test]
    fn test_time_range_and_statistics() {
        let (mut session, a, b) = two_recordings();
        session.set_offset(b, -3.0).unwrap();
        let snapshot = session.compute();
        assert_eq!(snapshot.time_range(), Some(TimeWindow::new(-3.0, 2.0)));

        let stats = snapshot.statistics(a, "speed").unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.mean, 20.0);
        assert_eq!(stats.median, 20.0);
        assert!(Session::default().compute().time_range().is_none());
    }
}
