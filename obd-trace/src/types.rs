//! Core types for the trace transformation library
//!
//! This module defines the channel/recording model that every pipeline stage
//! consumes, plus all error types. Channels are immutable once built: derived
//! channels are recomputed wholesale, never patched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Result type for library operations
pub type Result<T> = std::result::Result<T, TransformError>;

/// Identity of a loaded recording (an "import")
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordingId(pub u32);

impl fmt::Display for RecordingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a channel's samples came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Loaded from a recording file
    Raw,
    /// Computed from a math channel expression
    Derived,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Raw => write!(f, "raw"),
            SourceKind::Derived => write!(f, "derived"),
        }
    }
}

/// Named expression input slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InputLabel {
    A,
    B,
    C,
    D,
    E,
}

impl InputLabel {
    /// All labels in binding order
    pub const ALL: [InputLabel; 5] = [
        InputLabel::A,
        InputLabel::B,
        InputLabel::C,
        InputLabel::D,
        InputLabel::E,
    ];

    /// Parse the identifier used inside expression text
    pub fn from_identifier(name: &str) -> Option<Self> {
        match name {
            "A" => Some(InputLabel::A),
            "B" => Some(InputLabel::B),
            "C" => Some(InputLabel::C),
            "D" => Some(InputLabel::D),
            "E" => Some(InputLabel::E),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InputLabel::A => "A",
            InputLabel::B => "B",
            InputLabel::C => "C",
            InputLabel::D => "D",
            InputLabel::E => "E",
        }
    }
}

impl fmt::Display for InputLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputLabel {
    type Err = ModelError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        InputLabel::from_identifier(s.trim()).ok_or_else(|| ModelError::UnknownInputLabel(s.to_string()))
    }
}

/// Mapping from expression inputs (A..E) to channel names
///
/// Input A is mandatory: its timestamps are the reference axis every other
/// input gets aligned onto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputBindings {
    bindings: BTreeMap<InputLabel, String>,
}

impl InputBindings {
    /// Create bindings with the reference channel bound to A
    pub fn new(reference: impl Into<String>) -> Self {
        let mut bindings = BTreeMap::new();
        bindings.insert(InputLabel::A, reference.into());
        Self { bindings }
    }

    /// Builder method: bind another input. Rebinding A replaces the reference.
    pub fn with(mut self, label: InputLabel, channel: impl Into<String>) -> Self {
        self.bindings.insert(label, channel.into());
        self
    }

    /// Build bindings from (label, channel) pairs; fails when A is absent
    pub fn from_pairs<I, S>(pairs: I) -> std::result::Result<Self, ModelError>
    where
        I: IntoIterator<Item = (InputLabel, S)>,
        S: Into<String>,
    {
        let bindings: BTreeMap<InputLabel, String> = pairs
            .into_iter()
            .map(|(label, channel)| (label, channel.into()))
            .filter(|(_, channel)| !channel.trim().is_empty())
            .collect();
        if !bindings.contains_key(&InputLabel::A) {
            return Err(ModelError::MissingReferenceInput);
        }
        Ok(Self { bindings })
    }

    /// Channel bound to the reference input A
    pub fn reference(&self) -> &str {
        self.bindings
            .get(&InputLabel::A)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn get(&self, label: InputLabel) -> Option<&str> {
        self.bindings.get(&label).map(String::as_str)
    }

    /// Labels that have a channel bound, in A..E order
    pub fn labels(&self) -> Vec<InputLabel> {
        self.bindings.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (InputLabel, &str)> {
        self.bindings.iter().map(|(label, name)| (*label, name.as_str()))
    }
}

/// Channel samples as handed over by the parsing layer
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelData {
    pub name: String,
    pub unit: String,
    pub times: Vec<f64>,
    pub values: Vec<f64>,
}

impl ChannelData {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, times: Vec<f64>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            times,
            values,
        }
    }

    /// Build from (time, value) pairs
    pub fn from_samples(name: impl Into<String>, unit: impl Into<String>, samples: &[(f64, f64)]) -> Self {
        let (times, values) = samples.iter().copied().unzip();
        Self::new(name, unit, times, values)
    }
}

/// A named, unit-tagged time series belonging to one recording
///
/// Samples are stored column-wise so every stage can work on whole arrays.
/// Times are in seconds, local to the owning recording, and non-decreasing.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    name: String,
    display_name: String,
    unit: String,
    times: Vec<f64>,
    values: Vec<f64>,
    recording: RecordingId,
    source: SourceKind,
}

impl Channel {
    /// Build a channel, validating the sample columns
    pub fn new(
        recording: RecordingId,
        source: SourceKind,
        data: ChannelData,
    ) -> std::result::Result<Self, ModelError> {
        let ChannelData {
            name,
            unit,
            times,
            values,
        } = data;

        if name.trim().is_empty() {
            return Err(ModelError::EmptyChannelName);
        }
        if times.len() != values.len() {
            return Err(ModelError::LengthMismatch {
                channel: name,
                times: times.len(),
                values: values.len(),
            });
        }
        if let Some(index) = first_non_monotonic(&times) {
            return Err(ModelError::NonMonotonicTime {
                channel: name,
                index,
            });
        }

        Ok(Self {
            display_name: display_name_for(&name),
            name,
            unit,
            times,
            values,
            recording,
            source,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-friendly name ("engine_rpm" → "Engine Rpm")
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn recording(&self) -> RecordingId {
        self.recording
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// (first, last) local timestamp
    pub fn time_range(&self) -> Option<(f64, f64)> {
        Some((*self.times.first()?, *self.times.last()?))
    }

    /// Value of the sample nearest to local time `t` (ties go to the earlier sample)
    pub fn value_at(&self, t: f64) -> Option<f64> {
        crate::align::nearest_index(&self.times, t).map(|i| self.values[i])
    }

    /// Summary statistics over finite values
    pub fn statistics(&self) -> ChannelStatistics {
        ChannelStatistics::from_samples(&self.times, &self.values)
    }
}

fn first_non_monotonic(times: &[f64]) -> Option<usize> {
    if let Some(i) = times.iter().position(|t| t.is_nan()) {
        return Some(i);
    }
    times.windows(2).position(|w| w[1] < w[0]).map(|i| i + 1)
}

fn display_name_for(name: &str) -> String {
    name.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Basic descriptive statistics for one channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelStatistics {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation (0 for fewer than two values)
    pub std: f64,
    pub median: f64,
    /// Time covered by finite samples, when there are at least two
    pub duration: Option<f64>,
    /// Finite samples per second over `duration`
    pub sample_rate: Option<f64>,
}

impl ChannelStatistics {
    fn from_samples(times: &[f64], values: &[f64]) -> Self {
        let finite: Vec<(f64, f64)> = times
            .iter()
            .zip(values)
            .filter(|(_, v)| v.is_finite())
            .map(|(t, v)| (*t, *v))
            .collect();

        let count = finite.len();
        if count == 0 {
            return Self {
                count,
                mean: f64::NAN,
                min: f64::NAN,
                max: f64::NAN,
                std: f64::NAN,
                median: f64::NAN,
                duration: None,
                sample_rate: None,
            };
        }

        let mut sorted: Vec<f64> = finite.iter().map(|(_, v)| *v).collect();
        sorted.sort_by(f64::total_cmp);
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let std = if count > 1 {
            let var = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            var.sqrt()
        } else {
            0.0
        };
        let median = if count % 2 == 1 {
            sorted[count / 2]
        } else {
            (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
        };

        let (duration, sample_rate) = if count > 1 {
            let span = finite[count - 1].0 - finite[0].0;
            let rate = if span > 0.0 { count as f64 / span } else { 0.0 };
            (Some(span), Some(rate))
        } else {
            (None, None)
        };

        Self {
            count,
            mean,
            min: sorted[0],
            max: sorted[count - 1],
            std,
            median,
            duration,
            sample_rate,
        }
    }
}

/// One loaded dataset with its time offset relative to the base recording
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    id: RecordingId,
    name: String,
    is_base: bool,
    offset: f64,
    channels: Vec<Channel>,
}

impl Recording {
    pub(crate) fn new(id: RecordingId, name: String, is_base: bool, channels: Vec<Channel>) -> Self {
        Self {
            id,
            name,
            is_base,
            offset: 0.0,
            channels,
        }
    }

    pub fn id(&self) -> RecordingId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_base(&self) -> bool {
        self.is_base
    }

    /// Seconds added to local time to reach base time (always 0 for the base)
    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name() == name)
    }

    pub fn to_base_time(&self, local: f64) -> f64 {
        local + self.offset
    }

    pub fn to_local_time(&self, base: f64) -> f64 {
        base - self.offset
    }

    pub(crate) fn set_offset(&mut self, offset: f64) {
        self.offset = offset;
    }

    pub(crate) fn mark_base(&mut self) {
        self.is_base = true;
        self.offset = 0.0;
    }

    pub(crate) fn push_channel(&mut self, channel: Channel) {
        self.channels.push(channel);
    }
}

/// Expression result kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Numeric,
    Boolean,
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultKind::Numeric => write!(f, "numeric"),
            ResultKind::Boolean => write!(f, "boolean"),
        }
    }
}

/// Errors raised while authoring an expression
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    #[error("Syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("Unknown identifier: {0}")]
    UnboundIdentifier(String),

    #[error("Expected a {expected} expression but found {found}")]
    WrongResultKind { expected: ResultKind, found: ResultKind },
}

impl ExpressionError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        ExpressionError::Syntax {
            position,
            message: message.into(),
        }
    }
}

/// Errors raised while editing the filter list
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    #[error("Filters must have a name")]
    EmptyName,

    #[error("A filter named '{0}' already exists")]
    DuplicateName(String),

    #[error("Filter not found: {0}")]
    NotFound(String),

    #[error("Buffer of {buffer}s is outside the allowed range [{min}s, {max}s]")]
    BufferOutOfRange { buffer: f64, min: f64, max: f64 },

    #[error("Invalid filter expression: {0}")]
    Expression(#[from] ExpressionError),
}

/// Errors raised while building or editing the channel/recording model
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("Channel names must not be empty")]
    EmptyChannelName,

    #[error("Channel '{channel}' has {times} timestamps but {values} values")]
    LengthMismatch {
        channel: String,
        times: usize,
        values: usize,
    },

    #[error("Channel '{channel}' has a decreasing or NaN timestamp at sample {index}")]
    NonMonotonicTime { channel: String, index: usize },

    #[error("Channel '{0}' already exists")]
    DuplicateChannel(String),

    #[error("Recording not found: {0}")]
    UnknownRecording(RecordingId),

    #[error("Channel '{channel}' not found in recording {recording}")]
    UnknownChannel {
        recording: RecordingId,
        channel: String,
    },

    #[error("Math channel not found: {0}")]
    UnknownMathChannel(String),

    #[error("The base recording's offset is fixed at 0")]
    BaseOffsetImmutable,

    #[error("Time offset must be finite, got {0}")]
    InvalidOffset(f64),

    #[error("Input A (the reference channel) is required")]
    MissingReferenceInput,

    #[error("Unknown input label: {0}")]
    UnknownInputLabel(String),
}

/// Umbrella error for the library API
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Model(#[from] ModelError),
}
