//! OBD Trace Library
//!
//! A stateless data-transformation core for multi-recording vehicle traces:
//! aligns channels sampled at unrelated rates, evaluates user expressions into
//! derived channels and visibility filters, and reduces long series to a
//! bounded, peak-preserving set of renderable points.
//!
//! # Architecture
//!
//! Pipeline stages, leaves first:
//! - [`align`]: resample channels onto a reference time axis, honoring offsets
//! - [`expression`]: compile and vectorized-evaluate numeric/boolean expressions
//! - [`filter`]: buffered hit intervals, cross-recording union, precedence stack
//! - [`decimate`]: min/max bucket decimation with embedded gaps
//!
//! [`Session`] owns the inputs and runs the stages end to end; every edit is
//! followed by a full recompute into an immutable [`Snapshot`].
//!
//! The library does NOT:
//! - Parse files or detect encodings
//! - Draw anything or handle user interaction
//! - Persist sessions
//!
//! All of that lives in the application layer (obd-trace-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use obd_trace::{
//!     BufferLimits, ChannelData, FilterDefinition, FilterMode, InputBindings, MathChannelDefinition,
//!     PipelineConfig, Session, TimeWindow,
//! };
//!
//! let mut session = Session::new(PipelineConfig::new().with_point_budget(1000));
//! let trip = session
//!     .add_recording(
//!         "trip.csv",
//!         vec![ChannelData::from_samples("vehicle_speed", "km/h", &[(0.0, 0.0), (1.0, 42.0)])],
//!     )
//!     .unwrap();
//!
//! // Derived channel
//! let mps = MathChannelDefinition::new("speed_mps", "m/s", "A / 3.6", InputBindings::new("vehicle_speed")).unwrap();
//! session.add_math_channel(mps).unwrap();
//!
//! // Hide standstill, with a one-second margin
//! let idle = FilterDefinition::new(
//!     "idle",
//!     "A < 1",
//!     InputBindings::new("vehicle_speed"),
//!     FilterMode::Hide,
//!     1.0,
//!     BufferLimits::default(),
//! )
//! .unwrap();
//! session.add_filter(idle).unwrap();
//!
//! let snapshot = session.compute();
//! let series = snapshot.render(trip, "speed_mps", Some(TimeWindow::new(0.0, 60.0))).unwrap();
//! println!("{} points", series.points.len());
//! ```

// Public modules
pub mod align;
pub mod config;
pub mod decimate;
pub mod expression;
pub mod filter;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use align::{AlignInput, AlignedInputs, Aligner, Interpolation};
pub use config::{BufferLimits, PipelineConfig, DEFAULT_POINT_BUDGET};
pub use decimate::{Decimator, Point, RenderPoint, TimeWindow};
pub use expression::{Evaluated, Expression};
pub use filter::{FilterDefinition, FilterEngine, FilterMode, FilterStack, Interval, IntervalSet, Visibility};
pub use session::{MathChannelDefinition, RenderedSeries, Session, Snapshot};
pub use types::{
    Channel, ChannelData, ChannelStatistics, ExpressionError, FilterError, InputBindings, InputLabel, ModelError,
    Recording, RecordingId, Result, ResultKind, SourceKind, TransformError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
