//! Peak-preserving decimation for rendering
//!
//! The visible window is cut into `budget / 2` equal-width time buckets and
//! each non-empty bucket keeps its minimum and maximum sample, in time order.
//! Spikes survive where a stride-based subsample would skip them, and empty
//! buckets emit nothing rather than a flat line.
//!
//! Hidden and non-finite samples are never emitted. Wherever one lies between
//! two emitted samples a [`RenderPoint::Gap`] separates them, so the renderer
//! breaks the line instead of drawing across the hole.

use serde::Serialize;

/// One renderable sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    #[serde(rename = "t")]
    pub time: f64,
    #[serde(rename = "v")]
    pub value: f64,
}

impl Point {
    pub fn new(time: f64, value: f64) -> Self {
        Self { time, value }
    }
}

/// A sample or a line break; gaps serialize as `null`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RenderPoint {
    Sample(Point),
    Gap,
}

impl RenderPoint {
    pub fn point(&self) -> Option<Point> {
        match self {
            RenderPoint::Sample(p) => Some(*p),
            RenderPoint::Gap => None,
        }
    }

    pub fn is_gap(&self) -> bool {
        matches!(self, RenderPoint::Gap)
    }
}

/// Closed time window `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Window spanning every given (sorted) timestamp
    pub fn covering(times: &[f64]) -> Option<Self> {
        Some(Self::new(*times.first()?, *times.last()?))
    }

    pub fn shifted(&self, delta: f64) -> Self {
        Self::new(self.start + delta, self.end + delta)
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    fn is_valid(&self) -> bool {
        self.start <= self.end
    }
}

/// Reduces series to a bounded number of points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimator {
    budget: usize,
}

impl Default for Decimator {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_POINT_BUDGET)
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    index: usize,
    min: usize,
    max: usize,
}

impl Decimator {
    /// A zero budget is raised to 1; a budget of 1 keeps only the largest-magnitude sample
    pub fn new(budget: usize) -> Self {
        Self { budget: budget.max(1) }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Decimate the samples inside `window`, dropping non-finite values
    pub fn decimate(&self, times: &[f64], values: &[f64], window: TimeWindow) -> Vec<Point> {
        self.decimate_with_mask(times, values, None, window)
            .into_iter()
            .filter_map(|p| p.point())
            .collect()
    }

    /// Decimate with an optional visibility mask, embedding gaps
    ///
    /// `times` must be sorted. A sample is drawable when it is visible under
    /// `mask` and its value is finite. At most `budget` samples are returned;
    /// gap markers do not count against the budget.
    pub fn decimate_with_mask(
        &self,
        times: &[f64],
        values: &[f64],
        mask: Option<&[bool]>,
        window: TimeWindow,
    ) -> Vec<RenderPoint> {
        let n = times.len().min(values.len());
        if n == 0 || !window.is_valid() {
            return Vec::new();
        }
        let lo = times[..n].partition_point(|&t| t < window.start);
        let hi = times[..n].partition_point(|&t| t <= window.end);
        if lo >= hi {
            return Vec::new();
        }

        let drawable = |i: usize| values[i].is_finite() && mask.map_or(true, |m| m.get(i).copied().unwrap_or(false));

        // invalid_before[k] = hidden/missing samples in lo..lo+k
        let mut invalid_before = Vec::with_capacity(hi - lo + 1);
        invalid_before.push(0usize);
        let mut valid_count = 0usize;
        for i in lo..hi {
            let ok = drawable(i);
            valid_count += ok as usize;
            let last = invalid_before[invalid_before.len() - 1];
            invalid_before.push(last + (!ok) as usize);
        }

        let selected: Vec<usize> = if valid_count <= self.budget {
            (lo..hi).filter(|&i| drawable(i)).collect()
        } else if self.budget == 1 {
            (lo..hi)
                .filter(|&i| drawable(i))
                .max_by(|&a, &b| values[a].abs().total_cmp(&values[b].abs()))
                .into_iter()
                .collect()
        } else {
            self.select_extrema(times, values, (lo..hi).filter(|&i| drawable(i)), window)
        };

        log::trace!(
            "Decimated {} samples ({} drawable) to {} points",
            hi - lo,
            valid_count,
            selected.len()
        );

        let mut out = Vec::with_capacity(selected.len() + 8);
        let mut previous: Option<usize> = None;
        for i in selected {
            if let Some(p) = previous {
                if invalid_before[i - lo] - invalid_before[p + 1 - lo] > 0 {
                    out.push(RenderPoint::Gap);
                }
            }
            out.push(RenderPoint::Sample(Point::new(times[i], values[i])));
            previous = Some(i);
        }
        out
    }

    /// Min and max sample of each equal-width bucket, in time order
    fn select_extrema(
        &self,
        times: &[f64],
        values: &[f64],
        drawable: impl Iterator<Item = usize>,
        window: TimeWindow,
    ) -> Vec<usize> {
        let buckets = self.budget / 2;
        let width = window.duration() / buckets as f64;
        let bucket_of = |t: f64| {
            if width > 0.0 {
                (((t - window.start) / width).floor() as usize).min(buckets - 1)
            } else {
                0
            }
        };

        let mut out = Vec::with_capacity(self.budget);
        let mut current: Option<Bucket> = None;
        for i in drawable {
            let index = bucket_of(times[i]);
            match current.as_mut() {
                Some(bucket) if bucket.index == index => {
                    if values[i] < values[bucket.min] {
                        bucket.min = i;
                    }
                    if values[i] > values[bucket.max] {
                        bucket.max = i;
                    }
                }
                _ => {
                    if let Some(done) = current {
                        emit(&mut out, done);
                    }
                    current = Some(Bucket { index, min: i, max: i });
                }
            }
        }
        if let Some(done) = current {
            emit(&mut out, done);
        }
        out
    }
}

fn emit(out: &mut Vec<usize>, bucket: Bucket) {
    let (first, second) = if bucket.min <= bucket.max {
        (bucket.min, bucket.max)
    } else {
        (bucket.max, bucket.min)
    };
    out.push(first);
    if second != first {
        out.push(second);
    }
}
